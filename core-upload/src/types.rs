//! Files on both sides of an upload: local candidates and remote objects.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::paths::extension_of;

/// A file the user selected or dropped, not yet stored.
///
/// `size` is the byte length of `bytes`. Cloning is cheap; the content is
/// reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub bytes: Bytes,
    /// MIME type reported by the host, if any
    pub mime_type: Option<String>,
    pub size: u64,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>, mime_type: Option<&str>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes,
            mime_type: mime_type
                .map(str::trim)
                .filter(|mime| !mime.is_empty())
                .map(str::to_string),
        }
    }

    /// Same content under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn preview_kind(&self) -> PreviewKind {
        match self.mime_type.as_deref() {
            Some(mime) => PreviewKind::from_mime(mime),
            None => PreviewKind::from_name(&self.name),
        }
    }
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish()
    }
}

/// A stored object as last seen in the listing.
///
/// `name` is always the basename of a key the store confirmed. `url` can be
/// empty for entries added without a successful URL lookup; it is filled by
/// the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub url: String,
    pub size: Option<u64>,
}

impl RemoteFile {
    pub fn preview_kind(&self) -> PreviewKind {
        PreviewKind::from_name(&self.name)
    }

    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }
}

/// How a host should preview a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    /// Render inline as an image
    Image,
    /// Embed a PDF viewer
    Pdf,
    /// Offer a download link only
    Other,
}

impl PreviewKind {
    pub fn from_name(name: &str) -> Self {
        match extension_of(name).map(str::to_ascii_lowercase).as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif") => PreviewKind::Image,
            Some("pdf") => PreviewKind::Pdf,
            _ => PreviewKind::Other,
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        if essence.eq_ignore_ascii_case("application/pdf") {
            PreviewKind::Pdf
        } else if essence
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
        {
            PreviewKind::Image
        } else {
            PreviewKind::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_file_size_and_mime() {
        let file = PendingFile::new("cat.png", vec![0u8; 10], Some("  "));
        assert_eq!(file.size, 10);
        assert_eq!(file.mime_type, None);

        let renamed = file.renamed("dog.png");
        assert_eq!(renamed.name, "dog.png");
        assert_eq!(renamed.bytes, file.bytes);
    }

    #[test]
    fn test_debug_omits_content() {
        let file = PendingFile::new("cat.png", &b"secret-bytes"[..], Some("image/png"));
        let debug = format!("{:?}", file);
        assert!(debug.contains("cat.png"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_preview_kind() {
        assert_eq!(PreviewKind::from_name("cat.PNG"), PreviewKind::Image);
        assert_eq!(PreviewKind::from_name("report.pdf"), PreviewKind::Pdf);
        assert_eq!(PreviewKind::from_name("notes.txt"), PreviewKind::Other);
        assert_eq!(PreviewKind::from_name("noext"), PreviewKind::Other);

        assert_eq!(PreviewKind::from_mime("image/gif"), PreviewKind::Image);
        assert_eq!(
            PreviewKind::from_mime("application/pdf; charset=binary"),
            PreviewKind::Pdf
        );
        assert_eq!(PreviewKind::from_mime("text/plain"), PreviewKind::Other);

        let file = PendingFile::new("scan", vec![1], Some("application/pdf"));
        assert_eq!(file.preview_kind(), PreviewKind::Pdf);
    }
}
