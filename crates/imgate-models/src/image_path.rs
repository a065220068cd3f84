//! Image path grammar.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Prefix every image path starts with.
pub const IMAGE_PATH_PREFIX: &str = "/images/";

// The file hash is greedy, so only the last dot separates the extension.
static IMAGE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/images/([^/]+)/([^/]+)\.([^/]+)$").expect("valid image path regex")
});

/// Errors produced while parsing an image path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImagePathError {
    #[error("Path does not match /images/{{user_id}}/{{file_hash}}.{{ext}}: {0}")]
    NoMatch(String),
}

/// A parsed `/images/{user_id}/{file_hash}.{ext}` path.
///
/// `user_id` and `file_hash` are opaque tokens. `ext` is a client hint and
/// plays no part in routing or storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImagePath {
    /// Requesting user.
    pub user_id: String,
    /// Identifier of the stored image, shared across grantees.
    pub file_hash: String,
    /// Extension supplied by the client.
    pub ext: String,
}

impl ImagePath {
    pub fn new(
        user_id: impl Into<String>,
        file_hash: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            file_hash: file_hash.into(),
            ext: ext.into(),
        }
    }

    /// Parse a request path.
    pub fn parse(path: &str) -> Result<Self, ImagePathError> {
        let captures = IMAGE_PATH_RE
            .captures(path)
            .ok_or_else(|| ImagePathError::NoMatch(path.to_string()))?;

        Ok(Self::new(&captures[1], &captures[2], &captures[3]))
    }
}

impl FromStr for ImagePath {
    type Err = ImagePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}.{}",
            IMAGE_PATH_PREFIX, self.user_id, self.file_hash, self.ext
        )
    }
}
