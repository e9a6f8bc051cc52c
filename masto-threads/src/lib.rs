use masto_msg::{MediaAttachment, Post, Tag};
use masto_ref::PostId;

mod archive;
mod build;
pub mod index;
mod resolve;

pub use archive::{Archive, ArchiveOptions};
pub use build::{build_threads, flat_threads, should_skip, Threads};
pub use index::{PostIndex, PostKey, ReplyIndex};
pub use resolve::resolve_orphans;

/// A root post together with its resolved descendant chain.
#[derive(Clone, Copy, Debug)]
pub struct Thread<'a> {
    index: &'a PostIndex,
    root: PostKey,
}

impl<'a> Thread<'a> {
    pub(crate) fn new(index: &'a PostIndex, root: PostKey) -> Self {
        Self { index, root }
    }

    pub fn id(&self) -> &'a PostId {
        &self.post().id
    }

    pub fn post(&self) -> &'a Post {
        self.index.post(self.root)
    }

    pub fn descendants(&self) -> Vec<&'a Post> {
        self.index
            .descendants(self.root)
            .iter()
            .map(|key| self.index.post(*key))
            .collect()
    }

    /// The root followed by its descendants.
    pub fn posts(&self) -> Vec<&'a Post> {
        let mut posts = vec![self.post()];
        posts.extend(self.descendants());
        posts
    }

    pub fn all_media(&self) -> Vec<&'a MediaAttachment> {
        self.posts()
            .into_iter()
            .flat_map(|post| post.media_attachments.iter())
            .collect()
    }

    pub fn all_tags(&self) -> Vec<&'a Tag> {
        self.posts()
            .into_iter()
            .flat_map(|post| post.tags.iter())
            .collect()
    }
}
