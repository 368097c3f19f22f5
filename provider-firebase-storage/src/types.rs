//! Firebase Storage REST response types

use serde::{Deserialize, Serialize};

/// Object resource returned by uploads and metadata requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Full object path, e.g. `uploads/uid-1/cat.png`
    pub name: String,

    #[serde(default)]
    pub bucket: Option<String>,

    /// Size in bytes, encoded as a decimal string
    #[serde(default)]
    pub size: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Comma-separated list of download tokens
    #[serde(default)]
    pub download_tokens: Option<String>,
}

impl ObjectMetadata {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    /// First download token, if the object has any
    pub fn first_download_token(&self) -> Option<&str> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
    }
}

/// Item of a list response; only the name is guaranteed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub name: String,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default)]
    pub size: Option<String>,
}

/// Response of `GET /v0/b/{bucket}/o?prefix=..&delimiter=/`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<ListItem>,

    /// Sub-"directories" under the prefix
    #[serde(default)]
    pub prefixes: Vec<String>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}
