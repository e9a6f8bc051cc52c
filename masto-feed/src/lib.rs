use async_trait::async_trait;
use log::{debug, info};
use masto_msg::{Account, Context, Post};
use masto_ref::{AccountId, PostId, ProfileUrl};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error as ThisError;

mod filter;
pub use filter::PostsFilter;

#[derive(Debug, ThisError)]
pub enum FetchError {
    #[error("Request failed, cause: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server responded with status {0}")]
    Status(u16),
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Failed to look up account {handle}, cause: {source}")]
    AccountLookupFailed {
        handle: String,
        #[source]
        source: FetchError,
    },
    #[error("Failed to fetch {target}, cause: {source}")]
    FetchFailed {
        target: String,
        #[source]
        source: FetchError,
    },
    #[error("Malformed response from {target}, cause: {source}")]
    MalformedResponse {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to build http client, cause: {0}")]
    Client(#[source] reqwest::Error),
}

/// The three lookups the archiver needs from a server.
#[async_trait]
pub trait FeedSource {
    async fn lookup_account(&self, handle: &str) -> Result<Account, Error>;

    async fn list_posts(
        &self,
        account_id: &AccountId,
        filter: &PostsFilter,
    ) -> Result<Vec<Post>, Error>;

    async fn get_context(&self, post_id: &PostId) -> Result<Context, Error>;
}

#[derive(Clone, Debug)]
pub struct HttpFeedConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFeedConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("masto-archive/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub struct HttpFeed {
    client: Client,
    profile: ProfileUrl,
}

impl HttpFeed {
    pub fn new(profile: ProfileUrl, config: &HttpFeedConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(Error::Client)?;

        Ok(Self { client, profile })
    }

    pub fn profile(&self) -> &ProfileUrl {
        &self.profile
    }

    /// The underlying client, for requests outside the API such as media.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, Error> {
        debug!("GET {} {:?}", url, query);

        let fetch_failed = |source: FetchError| Error::FetchFailed {
            target: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| fetch_failed(err.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(FetchError::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| fetch_failed(err.into()))?;

        serde_json::from_slice(&body).map_err(|source| Error::MalformedResponse {
            target: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn lookup_account(&self, handle: &str) -> Result<Account, Error> {
        let url = ProfileUrl::with_base(self.profile.base_url(), handle).to_lookup_url();

        let account: Account = self.get(&url, &[]).await.map_err(|err| match err {
            Error::FetchFailed { source, .. } => Error::AccountLookupFailed {
                handle: handle.to_string(),
                source,
            },
            other => other,
        })?;

        info!("Found account {} ({})", account.acct, account.id);
        Ok(account)
    }

    async fn list_posts(
        &self,
        account_id: &AccountId,
        filter: &PostsFilter,
    ) -> Result<Vec<Post>, Error> {
        let url = self.profile.to_statuses_url(account_id);
        info!("Fetching posts from {}", url);

        let posts: Vec<Post> = self.get(&url, &filter.query_pairs()).await?;

        info!("Fetched {} posts", posts.len());
        Ok(posts)
    }

    async fn get_context(&self, post_id: &PostId) -> Result<Context, Error> {
        let url = self.profile.to_context_url(post_id);
        self.get(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account_json() -> serde_json::Value {
        json!({ "id": "7", "username": "someone", "acct": "someone" })
    }

    fn post_json(id: &str, parent: Option<&str>) -> serde_json::Value {
        json!({
            "id": id,
            "created_at": "2023-05-06T07:08:09.000Z",
            "in_reply_to_id": parent,
            "visibility": "public",
            "content": "<p>post</p>",
            "account": account_json()
        })
    }

    async fn feed(server: &MockServer) -> HttpFeed {
        let profile = ProfileUrl::with_base(&server.uri(), "someone");
        HttpFeed::new(profile, &HttpFeedConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/lookup"))
            .and(query_param("acct", "someone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_json()))
            .mount(&server)
            .await;

        let account = feed(&server).await.lookup_account("someone").await.unwrap();
        assert_eq!(account.id, AccountId::new("7"));
    }

    #[tokio::test]
    async fn test_lookup_missing_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/lookup"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = feed(&server)
            .await
            .lookup_account("nobody")
            .await
            .unwrap_err();
        match err {
            Error::AccountLookupFailed { handle, source } => {
                assert_eq!(handle, "nobody");
                assert!(matches!(source, FetchError::Status(404)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_list_posts_passes_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/statuses"))
            .and(query_param("exclude_reblogs", "true"))
            .and(query_param("since_id", "10"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                post_json("12", Some("11")),
                post_json("11", None),
            ])))
            .mount(&server)
            .await;

        let filter = PostsFilter {
            exclude_reblogs: true,
            since_id: Some(PostId::new("10")),
            limit: 2,
            ..PostsFilter::default()
        };
        let posts = feed(&server)
            .await
            .list_posts(&AccountId::new("7"), &filter)
            .await
            .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].parent_id(), Some(&PostId::new("11")));
    }

    #[tokio::test]
    async fn test_list_posts_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/7/statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = feed(&server)
            .await
            .list_posts(&AccountId::new("7"), &PostsFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_get_context() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/statuses/12/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ancestors": [post_json("11", None)],
                "descendants": [post_json("13", Some("12"))]
            })))
            .mount(&server)
            .await;

        let context = feed(&server)
            .await
            .get_context(&PostId::new("12"))
            .await
            .unwrap();
        assert_eq!(context.ancestors[0].id, PostId::new("11"));
        assert_eq!(context.descendants[0].id, PostId::new("13"));
    }

    #[tokio::test]
    async fn test_get_context_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/statuses/12/context"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = feed(&server)
            .await
            .get_context(&PostId::new("12"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FetchFailed {
                source: FetchError::Status(503),
                ..
            }
        ));
    }
}
