use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use masto_feed::{HttpFeed, HttpFeedConfig, PostsFilter};
use masto_pages::{should_write, write_thread, Config, MediaMode, PostTemplate};
use masto_ref::{PostId, ProfileUrl};
use masto_threads::{Archive, ArchiveOptions, Thread};
use progress_bar::*;
use std::{path::PathBuf, time::Duration};

mod bookmark;

/// Archive the posts of a Mastodon account as markdown files.
#[derive(Debug, Parser)]
#[command(name = "masto-archive", version)]
struct Cli {
    /// Profile url, like https://example.social/@me
    #[arg(long, env = "MASTO_ARCHIVE_USER")]
    user: String,

    /// Output directory
    #[arg(long, env = "MASTO_ARCHIVE_DIST", default_value = "./posts")]
    dist: PathBuf,

    #[arg(long)]
    exclude_replies: bool,

    #[arg(long)]
    exclude_reblogs: bool,

    /// Number of posts to fetch
    #[arg(long, default_value_t = 40)]
    limit: u32,

    #[arg(long)]
    since_id: Option<String>,

    #[arg(long)]
    max_id: Option<String>,

    #[arg(long)]
    min_id: Option<String>,

    /// Only posts with this hashtag
    #[arg(long)]
    tagged: Option<String>,

    #[arg(long)]
    only_media: bool,

    #[arg(long)]
    pinned: bool,

    /// Visibility a thread's first post needs to be archived
    #[arg(long, default_value = "public")]
    visibility: String,

    /// Archive threads whatever their visibility
    #[arg(long, conflicts_with = "visibility")]
    any_visibility: bool,

    /// Write every post on its own instead of grouping replies into threads
    #[arg(long)]
    no_threads: bool,

    /// Filename template, with {id}, {year}, {month} and {day}
    #[arg(long, default_value = "{id}")]
    filename: String,

    /// Download images: "bundle" for a directory per thread, or a directory
    #[arg(long, value_name = "bundle|DIR")]
    download_media: Option<String>,

    /// Handlebars template used instead of the built in markdown layout
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Also write each thread as JSON
    #[arg(long)]
    json: bool,

    /// Remember the newest fetched post for --resume
    #[arg(long)]
    persist: bool,

    /// Bookmark file, defaults to ~/.masto-archive/last-id
    #[arg(long)]
    bookmark: Option<PathBuf>,

    /// Fetch only posts newer than the bookmark, unless --since-id is given
    #[arg(long)]
    resume: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn filter(&self, since_id: Option<PostId>) -> PostsFilter {
        PostsFilter {
            exclude_replies: self.exclude_replies,
            exclude_reblogs: self.exclude_reblogs,
            limit: self.limit,
            since_id,
            max_id: self.max_id.clone().map(PostId::from),
            min_id: self.min_id.clone().map(PostId::from),
            tagged: self.tagged.clone(),
            only_media: self.only_media,
            pinned: self.pinned,
        }
    }

    fn visibility(&self) -> Option<&str> {
        if self.any_visibility {
            None
        } else {
            Some(self.visibility.as_str())
        }
    }

    fn archive_options(&self, since_id: Option<PostId>) -> ArchiveOptions {
        ArchiveOptions {
            filter: self.filter(since_id),
            visibility: self.visibility().map(str::to_string),
            threaded: !self.no_threads,
        }
    }

    fn pages_config(&self) -> Result<Config> {
        let template = match &self.template {
            Some(path) => Some(
                PostTemplate::from_file(path)
                    .with_context(|| format!("Invalid template {}", path.display()))?,
            ),
            None => None,
        };

        Ok(Config {
            base_dir: self.dist.clone(),
            filename_template: self.filename.clone(),
            media: self
                .download_media
                .as_deref()
                .map(MediaMode::from_arg)
                .unwrap_or_default(),
            json: self.json,
            template,
        })
    }

    fn bookmark_path(&self) -> Option<PathBuf> {
        self.bookmark.clone().or_else(bookmark::default_path)
    }
}

/// Holds log output below warnings back until dropped.
struct HeldLogs(LevelFilter);

impl HeldLogs {
    fn hold() -> Self {
        let level = log::max_level();
        log::set_max_level(level.min(LevelFilter::Warn));
        Self(level)
    }
}

impl Drop for HeldLogs {
    fn drop(&mut self) {
        log::set_max_level(self.0);
    }
}

/// Progress of the write loop. The bar is only drawn when not verbose, and
/// logging is held back while it is on screen.
struct WriteProgress {
    bar: Option<HeldLogs>,
}

impl WriteProgress {
    fn start(total: usize, verbose: bool) -> Self {
        if verbose || total == 0 {
            return Self { bar: None };
        }
        let held = HeldLogs::hold();
        init_progress_bar(total);
        set_progress_bar_action("Writing", Color::Blue, Style::Bold);
        Self { bar: Some(held) }
    }

    fn written(&self) {
        if self.bar.is_some() {
            inc_progress_bar();
        }
    }

    fn failed(&self, id: &PostId) {
        if self.bar.is_some() {
            print_progress_bar_info("Failed", id.as_str(), Color::Red, Style::Bold);
        }
    }
}

impl Drop for WriteProgress {
    fn drop(&mut self) {
        if self.bar.is_some() {
            finalize_progress_bar();
        }
    }
}

fn init_logger(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    run(&cli).await
}

async fn run(cli: &Cli) -> Result<()> {
    let profile = ProfileUrl::try_from(cli.user.clone())
        .with_context(|| format!("Invalid profile url {}", cli.user))?;
    let config = cli.pages_config()?;
    let feed_config = HttpFeedConfig {
        timeout: Duration::from_secs(cli.timeout),
        ..HttpFeedConfig::default()
    };
    let feed = HttpFeed::new(profile, &feed_config)?;

    let bookmark_path = cli.bookmark_path();
    let mut since_id = cli.since_id.clone().map(PostId::from);
    if cli.resume && since_id.is_none() {
        match &bookmark_path {
            Some(path) => since_id = bookmark::read(path).await?,
            None => warn!("No home directory, cannot resume without --bookmark"),
        }
    }

    let options = cli.archive_options(since_id);
    let archive = Archive::fetch(&feed, feed.profile().handle(), &options).await?;

    let posts: Vec<Thread<'_>> = archive
        .posts()
        .into_iter()
        .filter(|thread| should_write(thread, cli.visibility()))
        .collect();

    let progress = WriteProgress::start(posts.len(), cli.verbose);
    for thread in &posts {
        match write_thread(&config, feed.client(), thread).await {
            Ok(_) => progress.written(),
            Err(err) => {
                progress.failed(thread.id());
                return Err(err.into());
            }
        }
    }
    drop(progress);

    if cli.persist {
        match (&bookmark_path, archive.newest_id()) {
            (Some(path), Some(id)) => {
                bookmark::write(path, id).await?;
                info!("Bookmarked {} in {}", id, path.display());
            }
            (None, _) => warn!("No home directory, cannot persist without --bookmark"),
            (_, None) => info!("Nothing fetched, bookmark left as is"),
        }
    }

    info!(
        "Archived {} threads of {} to {}",
        posts.len(),
        archive.account().acct,
        config.base_dir.display()
    );
    Ok(())
}
