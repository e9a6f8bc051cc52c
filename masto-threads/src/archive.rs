use log::info;
use masto_feed::{Error, FeedSource, PostsFilter};
use masto_msg::Account;
use masto_ref::PostId;

use crate::{build_threads, flat_threads, resolve_orphans, Thread, Threads};

#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    pub filter: PostsFilter,
    /// Only roots with this visibility are archived. `None` keeps all.
    pub visibility: Option<String>,
    pub threaded: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            filter: PostsFilter::default(),
            visibility: Some("public".to_string()),
            threaded: true,
        }
    }
}

/// One archiving run: the owner's account and the threads built from a
/// single fetched batch.
#[derive(Debug)]
pub struct Archive {
    account: Account,
    threads: Threads,
    newest: Option<PostId>,
}

impl Archive {
    pub async fn fetch<F>(source: &F, handle: &str, options: &ArchiveOptions) -> Result<Self, Error>
    where
        F: FeedSource + ?Sized,
    {
        let account = source.lookup_account(handle).await?;
        let posts = source.list_posts(&account.id, &options.filter).await?;
        let newest = posts.first().map(|post| post.id.clone());

        let visibility = options.visibility.as_deref();
        let threads = if options.threaded {
            let mut threads = build_threads(posts, &account.id, visibility);
            resolve_orphans(&mut threads, source).await?;
            threads
        } else {
            flat_threads(posts, &account.id, visibility)
        };

        info!(
            "{} threads to archive for {}",
            threads.output().len(),
            account.acct
        );

        Ok(Self {
            account,
            threads,
            newest,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn threads(&self) -> &Threads {
        &self.threads
    }

    pub fn posts(&self) -> Vec<Thread<'_>> {
        self.threads.posts()
    }

    /// Id of the first post in the fetched batch, the one to bookmark.
    pub fn newest_id(&self) -> Option<&PostId> {
        self.newest.as_ref()
    }
}
