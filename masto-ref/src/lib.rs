use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use thiserror::Error as ThisError;
use urlencoding::encode;

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum RefError {
    #[error("Does not match as {ref_type}: {input}")]
    BadFormat {
        ref_type: &'static str,
        input: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        PostId::new(value)
    }
}

impl From<String> for PostId {
    fn from(value: String) -> Self {
        PostId(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        AccountId::new(value)
    }
}

/// Location of an account's profile page, e.g. `https://example.social/@someone`.
///
/// Every API url the archiver needs is derived from the instance base url
/// and the handle parsed out of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileUrl {
    base_url: String,
    handle: String,
}

impl ProfileUrl {
    pub fn from_string(string: String) -> Result<Self, RefError> {
        let caps = Self::regex()
            .captures(string.trim())
            .ok_or_else(|| RefError::BadFormat {
                ref_type: "Profile",
                input: string.clone(),
            })?;

        let base_url = caps["base"].trim_end_matches('/').to_string();
        let handle = caps["handle"].to_string();

        Ok(Self { base_url, handle })
    }

    pub fn with_base(base_url: &str, handle: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            handle: handle.trim_start_matches('@').to_string(),
        }
    }

    pub fn regex() -> &'static Regex {
        lazy_static! {
            static ref RE: Regex = Regex::new(
                r"^(?P<base>https?://[A-Za-z0-9.\-]+(?::[0-9]+)?)/@?(?P<handle>[A-Za-z0-9_]+(?:@[A-Za-z0-9.\-]+)?)/?$"
            )
            .unwrap();
        }
        &*RE
    }

    pub fn is_match(string: &str) -> bool {
        Self::regex().is_match(string.trim())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn handle(&self) -> &str {
        self.handle.as_str()
    }

    pub fn to_lookup_url(&self) -> String {
        format!(
            "{}/api/v1/accounts/lookup?acct={}",
            self.base_url,
            encode(self.handle.as_str())
        )
    }

    pub fn to_statuses_url(&self, account_id: &AccountId) -> String {
        format!(
            "{}/api/v1/accounts/{}/statuses",
            self.base_url,
            encode(account_id.as_str())
        )
    }

    pub fn to_context_url(&self, post_id: &PostId) -> String {
        format!(
            "{}/api/v1/statuses/{}/context",
            self.base_url,
            encode(post_id.as_str())
        )
    }
}

impl TryFrom<String> for ProfileUrl {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProfileUrl::from_string(value)
    }
}

impl fmt::Display for ProfileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/@{}", self.base_url, self.handle)
    }
}
