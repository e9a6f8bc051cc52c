use masto_ref::PostId;

/// Options for listing an account's statuses, passed through as query
/// parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostsFilter {
    pub exclude_replies: bool,
    pub exclude_reblogs: bool,
    pub limit: u32,
    pub since_id: Option<PostId>,
    pub max_id: Option<PostId>,
    pub min_id: Option<PostId>,
    pub tagged: Option<String>,
    pub only_media: bool,
    pub pinned: bool,
}

impl Default for PostsFilter {
    fn default() -> Self {
        Self {
            exclude_replies: false,
            exclude_reblogs: false,
            limit: 40,
            since_id: None,
            max_id: None,
            min_id: None,
            tagged: None,
            only_media: false,
            pinned: false,
        }
    }
}

impl PostsFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        let flags = [
            ("exclude_replies", self.exclude_replies),
            ("exclude_reblogs", self.exclude_reblogs),
            ("only_media", self.only_media),
            ("pinned", self.pinned),
        ];
        for (key, set) in flags {
            if set {
                pairs.push((key, "true".to_string()));
            }
        }

        let ids = [
            ("since_id", &self.since_id),
            ("max_id", &self.max_id),
            ("min_id", &self.min_id),
        ];
        for (key, id) in ids {
            if let Some(id) = id.as_ref().filter(|id| !id.is_empty()) {
                pairs.push((key, id.to_string()));
            }
        }

        if let Some(tagged) = self.tagged.as_ref().filter(|tag| !tag.is_empty()) {
            pairs.push(("tagged", tagged.clone()));
        }

        pairs.push(("limit", self.limit.to_string()));

        pairs
    }
}
