// https://docs.joinmastodon.org/entities/

use chrono::{DateTime, Utc};
use masto_ref::{AccountId, PostId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, DefaultOnError};

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub acct: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub display_name: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub note: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub url: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub avatar: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub bot: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub statuses_count: u64,
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MediaAttachment {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub description: Option<String>,
}

impl MediaAttachment {
    pub fn is_image(&self) -> bool {
        self.media_type == "image"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
    pub url: String,
}

#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Post {
    pub id: PostId,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_post_id")]
    pub in_reply_to_id: Option<PostId>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<AccountId>,
    pub visibility: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub sensitive: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub spoiler_text: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub application: Option<Application>,
    #[serde(default)]
    pub content: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub pinned: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub reblog: Option<Box<Post>>,
    pub account: Account,
}

impl Post {
    pub fn parent_id(&self) -> Option<&PostId> {
        self.in_reply_to_id.as_ref()
    }

    pub fn is_authored_by(&self, account_id: &AccountId) -> bool {
        &self.account.id == account_id
    }
}

/// Response of `GET /api/v1/statuses/:id/context`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Context {
    /// Oldest first.
    pub ancestors: Vec<Post>,
    pub descendants: Vec<Post>,
}

// Some servers send "" instead of null for a post without a parent.
fn deserialize_optional_post_id<'de, D>(deserializer: D) -> Result<Option<PostId>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|id| !id.is_empty()).map(PostId::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account_json() -> serde_json::Value {
        json!({
            "id": "1",
            "username": "gabriel",
            "acct": "gabriel",
            "display_name": "Gabriel",
            "url": "https://example.social/@gabriel",
            "bot": "not a bool"
        })
    }

    #[test]
    fn test_decode_post() {
        let post: Post = serde_json::from_value(json!({
            "id": "109",
            "created_at": "2023-04-01T10:20:30.000Z",
            "in_reply_to_id": "108",
            "in_reply_to_account_id": "1",
            "visibility": "public",
            "content": "<p>hello</p>",
            "media_attachments": [
                { "id": "m1", "type": "image", "url": "https://files.example/m1.png", "description": null }
            ],
            "tags": [{ "name": "rust", "url": "https://example.social/tags/rust" }],
            "application": null,
            "account": account_json()
        }))
        .unwrap();

        assert_eq!(post.id, PostId::new("109"));
        assert_eq!(post.parent_id(), Some(&PostId::new("108")));
        assert!(post.is_authored_by(&AccountId::new("1")));
        assert!(post.media_attachments[0].is_image());
        assert_eq!(post.tags[0].name, "rust");
        assert!(!post.account.bot);
        assert_eq!(post.created_at.to_rfc3339(), "2023-04-01T10:20:30+00:00");
    }

    #[test]
    fn test_empty_parent_is_no_parent() {
        for parent in [json!(null), json!("")] {
            let post: Post = serde_json::from_value(json!({
                "id": "1",
                "created_at": "2023-04-01T10:20:30Z",
                "in_reply_to_id": parent,
                "visibility": "unlisted",
                "account": account_json()
            }))
            .unwrap();
            assert_eq!(post.parent_id(), None);
        }
    }

    #[test]
    fn test_decode_context() {
        let context: Context = serde_json::from_value(json!({
            "ancestors": [],
            "descendants": []
        }))
        .unwrap();
        assert!(context.ancestors.is_empty());
        assert!(context.descendants.is_empty());
    }
}
