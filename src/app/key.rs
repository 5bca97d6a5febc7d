//! Remote resource keys
//!
//! A [`RemoteKey`] is the single identity used both for local store lookups
//! and for in-flight deduplication, so normalization happens exactly once,
//! at construction.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::KeyError;

/// Normalized path identifying a remote resource
///
/// Construction trims surrounding whitespace and rejects empty paths. Two
/// keys are equal exactly when their normalized strings are equal.
///
/// # Examples
///
/// ```rust
/// use remote_data::app::RemoteKey;
///
/// let key = RemoteKey::new("  images/a.jpg \n")?;
/// assert_eq!(key.as_str(), "images/a.jpg");
/// assert_eq!(key, RemoteKey::new("images/a.jpg")?);
/// # Ok::<(), remote_data::errors::KeyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteKey(String);

impl RemoteKey {
    /// Normalize a raw path into a key
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KeyError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the normalized path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key relative to a base URL (leading slashes removed so the join keeps
    /// the base path)
    pub fn relative_path(&self) -> &str {
        self.0.trim_start_matches('/')
    }

    /// MD5 digest of the key as lowercase hex, used for store file names
    pub fn digest_hex(&self) -> String {
        format!("{:x}", md5::compute(self.0.as_bytes()))
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RemoteKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RemoteKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RemoteKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemoteKey> for String {
    fn from(key: RemoteKey) -> Self {
        key.0
    }
}

impl AsRef<str> for RemoteKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RemoteKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
