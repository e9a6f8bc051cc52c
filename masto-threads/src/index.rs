use masto_msg::Post;
use masto_ref::PostId;
use std::collections::{HashMap, HashSet};

/// Stable handle to a post stored in a [`PostIndex`].
///
/// Keys are only meaningful for the index that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostKey(usize);

#[derive(Clone, Debug, PartialEq)]
struct Slot {
    post: Post,
    descendants: Vec<PostKey>,
}

/// Arena of every post seen during a run.
///
/// Posts are only ever added. Descendant chains live next to the record
/// they belong to and are extended in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostIndex {
    slots: Vec<Slot>,
    keys: HashMap<PostId, PostKey>,
}

impl PostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a post, or returns the key of the already stored post with the
    /// same id (the stored record wins).
    pub fn insert(&mut self, post: Post) -> PostKey {
        if let Some(key) = self.keys.get(&post.id) {
            return *key;
        }

        let key = PostKey(self.slots.len());
        self.keys.insert(post.id.clone(), key);
        self.slots.push(Slot {
            post,
            descendants: Vec::new(),
        });
        key
    }

    pub fn key(&self, id: &PostId) -> Option<PostKey> {
        self.keys.get(id).copied()
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn post(&self, key: PostKey) -> &Post {
        &self.slots[key.0].post
    }

    pub fn descendants(&self, key: PostKey) -> &[PostKey] {
        &self.slots[key.0].descendants
    }

    pub(crate) fn push_descendant(&mut self, root: PostKey, descendant: PostKey) {
        self.slots[root.0].descendants.push(descendant);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Replies observed within a batch, keyed by the id they reply to.
///
/// Children keep the order in which they were recorded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplyIndex {
    children: HashMap<PostId, Vec<PostId>>,
}

impl ReplyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, parent: &PostId, child: &PostId) {
        let children = self.children.entry(parent.clone()).or_default();
        if !children.contains(child) {
            children.push(child.clone());
        }
    }

    pub fn replies(&self, parent: &PostId) -> &[PostId] {
        self.children
            .get(parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Flattens everything below `root` depth-first, pre-order, siblings in
    /// recorded order. Ids already in `placed` are skipped along with their
    /// subtrees; every id returned is added to `placed`.
    pub fn walk(&self, root: &PostId, placed: &mut HashSet<PostId>) -> Vec<PostId> {
        let mut chain = Vec::new();
        let mut stack: Vec<&PostId> = self.replies(root).iter().rev().collect();

        while let Some(id) = stack.pop() {
            if !placed.insert(id.clone()) {
                continue;
            }
            chain.push(id.clone());
            stack.extend(self.replies(id).iter().rev());
        }

        chain
    }

    pub fn len(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
