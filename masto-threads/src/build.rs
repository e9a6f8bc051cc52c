use log::{debug, trace};
use masto_msg::{Context, Post};
use masto_ref::{AccountId, PostId};
use std::collections::{HashMap, HashSet};

use crate::index::{PostIndex, PostKey, ReplyIndex};
use crate::Thread;

/// Whether a post with this visibility is kept out of the roots.
///
/// Without a filter every visibility is accepted.
pub fn should_skip(visibility: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(wanted) => visibility != wanted,
        None => false,
    }
}

/// Result of classifying one fetched batch, and later of resolving its
/// orphans.
#[derive(Clone, Debug, PartialEq)]
pub struct Threads {
    owner: AccountId,
    index: PostIndex,
    replies: ReplyIndex,
    output: Vec<PostId>,
    orphans: Vec<PostId>,
    // every id in output or in a chain, mapped to the root holding it
    placed: HashMap<PostId, PostKey>,
    visibility: Option<String>,
}

/// Rebuilds the conversation forest implied by a batch of posts.
///
/// Posts without a parent become roots when their visibility passes
/// `visibility`. Posts whose parent is in the batch are chained under the
/// root they lead back to. Posts whose parent is missing are recorded as
/// orphans for [`crate::resolve_orphans`].
pub fn build_threads(posts: Vec<Post>, owner: &AccountId, visibility: Option<&str>) -> Threads {
    let mut index = PostIndex::new();
    let keys = batch_keys(&mut index, posts);

    let mut replies = ReplyIndex::new();
    let mut roots: Vec<PostKey> = Vec::new();
    let mut orphans: Vec<PostId> = Vec::new();

    for key in keys {
        let post = index.post(key);
        match post.parent_id() {
            None => {
                if should_skip(&post.visibility, visibility) {
                    trace!("{} is not a root, visibility {}", post.id, post.visibility);
                } else {
                    roots.push(key);
                }
            }
            Some(parent) if index.contains(parent) => {
                trace!("{} replies to {}", post.id, parent);
                replies.record(parent, &post.id);
            }
            Some(parent) => {
                debug!("{} is an orphan, {} is not in the batch", post.id, parent);
                orphans.push(post.id.clone());
            }
        }
    }

    // Chains are only flushed once every reply in the batch is recorded.
    let mut walked: HashSet<PostId> = roots
        .iter()
        .map(|key| index.post(*key).id.clone())
        .collect();
    let mut placed = HashMap::new();
    let mut output = Vec::with_capacity(roots.len());

    for root in roots {
        let root_id = index.post(root).id.clone();
        for id in replies.walk(&root_id, &mut walked) {
            if let Some(key) = index.key(&id) {
                index.push_descendant(root, key);
                placed.insert(id, root);
            }
        }
        placed.insert(root_id.clone(), root);
        output.push(root_id);
    }

    Threads {
        owner: owner.clone(),
        index,
        replies,
        output,
        orphans,
        placed,
        visibility: visibility.map(str::to_string),
    }
}

/// Archives every eligible post on its own, without reply reconstruction.
pub fn flat_threads(posts: Vec<Post>, owner: &AccountId, visibility: Option<&str>) -> Threads {
    let mut index = PostIndex::new();
    let keys = batch_keys(&mut index, posts);

    let mut placed = HashMap::new();
    let mut output = Vec::new();

    for key in keys {
        let post = index.post(key);
        if !should_skip(&post.visibility, visibility) {
            placed.insert(post.id.clone(), key);
            output.push(post.id.clone());
        }
    }

    Threads {
        owner: owner.clone(),
        index,
        replies: ReplyIndex::new(),
        output,
        orphans: Vec::new(),
        placed,
        visibility: visibility.map(str::to_string),
    }
}

// Indexes the whole batch up front and returns its keys in batch order,
// without repeats.
fn batch_keys(index: &mut PostIndex, posts: Vec<Post>) -> Vec<PostKey> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .map(|post| index.insert(post))
        .filter(|key| seen.insert(*key))
        .collect()
}

impl Threads {
    pub fn index(&self) -> &PostIndex {
        &self.index
    }

    pub fn replies(&self) -> &ReplyIndex {
        &self.replies
    }

    /// Ids of the roots to render, in discovery order.
    pub fn output(&self) -> &[PostId] {
        &self.output
    }

    pub fn orphans(&self) -> &[PostId] {
        &self.orphans
    }

    pub fn is_placed(&self, id: &PostId) -> bool {
        self.placed.contains_key(id)
    }

    /// Id of the root whose thread holds `id`, if any.
    pub fn root_of(&self, id: &PostId) -> Option<&PostId> {
        self.placed
            .get(id)
            .map(|key| &self.index.post(*key).id)
    }

    pub fn thread(&self, id: &PostId) -> Option<Thread<'_>> {
        self.index
            .key(id)
            .map(|key| Thread::new(&self.index, key))
    }

    pub fn posts(&self) -> Vec<Thread<'_>> {
        self.output
            .iter()
            .filter_map(|id| self.thread(id))
            .collect()
    }

    /// Turns the fetched context of an orphan into a thread.
    ///
    /// The oldest ancestor becomes the root, followed by the owner's own
    /// ancestors, the orphan, and the owner's descendants. Without ancestors
    /// the orphan is its own root. Posts by other accounts are left out of
    /// the chain, and nothing already placed is placed again. A new root
    /// that fails the visibility filter leaves the orphan unplaced.
    pub(crate) fn adopt(&mut self, orphan_id: &PostId, context: Context) {
        let orphan = match self.index.key(orphan_id) {
            Some(key) => key,
            None => return,
        };
        let Context {
            ancestors,
            descendants,
        } = context;

        let mut ancestors = ancestors.into_iter();
        let (root, mut chain) = match ancestors.next() {
            Some(oldest) => {
                let root = self.index.insert(oldest);
                let mut chain = self.insert_owned(ancestors);
                chain.push(orphan);
                (root, chain)
            }
            None => (orphan, Vec::new()),
        };
        chain.extend(self.insert_owned(descendants.into_iter()));

        let root_id = self.index.post(root).id.clone();
        let existing = self.placed.get(&root_id).copied();
        let target = match existing {
            Some(existing) => {
                debug!("{} joins the thread of {}", orphan_id, root_id);
                existing
            }
            None => {
                let visibility = &self.index.post(root).visibility;
                if should_skip(visibility, self.visibility.as_deref()) {
                    debug!(
                        "{} is left out, its thread starts at {} with visibility {}",
                        orphan_id, root_id, visibility
                    );
                    return;
                }
                self.placed.insert(root_id.clone(), root);
                self.output.push(root_id);
                root
            }
        };

        for key in chain {
            let id = self.index.post(key).id.clone();
            if self.placed.contains_key(&id) {
                continue;
            }
            self.placed.insert(id, target);
            self.index.push_descendant(target, key);
        }
    }

    // Indexes every post, returns the keys of the owner's ones.
    fn insert_owned(&mut self, posts: impl Iterator<Item = Post>) -> Vec<PostKey> {
        let mut owned = Vec::new();
        for post in posts {
            let is_owned = post.is_authored_by(&self.owner);
            let key = self.index.insert(post);
            if is_owned {
                owned.push(key);
            }
        }
        owned
    }
}
