use log::{debug, info};
use masto_feed::{Error, FeedSource};

use crate::Threads;

/// Fetches the context of every orphan, in discovery order, and turns each
/// into a thread.
///
/// Stops at the first failed fetch; roots added before it stay in the
/// output.
pub async fn resolve_orphans<F>(threads: &mut Threads, source: &F) -> Result<(), Error>
where
    F: FeedSource + ?Sized,
{
    let orphans = threads.orphans().to_vec();
    if !orphans.is_empty() {
        info!("Resolving {} orphans", orphans.len());
    }

    for orphan in orphans {
        if threads.is_placed(&orphan) {
            debug!("{} is already part of a thread", orphan);
            continue;
        }

        let context = source.get_context(&orphan).await?;
        debug!(
            "{} has {} ancestors and {} descendants",
            orphan,
            context.ancestors.len(),
            context.descendants.len()
        );
        threads.adopt(&orphan, context);
    }

    Ok(())
}
