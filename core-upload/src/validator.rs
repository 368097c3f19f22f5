//! # File Validation
//!
//! Client-side checks applied to every selected file before it may be queued.
//!
//! Rules run in order and the first failure wins:
//!
//! 1. **Name** - non-empty and made only of `[A-Za-z0-9_.-]`
//! 2. **Type** - the extension (case-insensitive) is allow-listed, and a
//!    reported MIME type, when present, is the one allowed for that extension
//! 3. **Size** - at most the policy's ceiling (12 MiB by default)
//!
//! A rejection never affects other files: [`Validator::validate_batch`] keeps
//! every passing file and reports each rejected one with its own reason.

use core_runtime::config::UploadPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::paths::extension_of;
use crate::types::PendingFile;

/// Outcome of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted(PendingFile),
    Rejected { name: String, reason: String },
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted(_))
    }
}

/// A file that failed validation, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Partitioned result of validating a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchValidation {
    /// Files that passed, in selection order
    pub accepted: Vec<PendingFile>,
    /// Every rejected file, in selection order
    pub rejected: Vec<Rejection>,
}

impl BatchValidation {
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    policy: UploadPolicy,
}

impl Validator {
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn validate(&self, file: PendingFile) -> ValidationResult {
        match self.check(&file) {
            Ok(()) => ValidationResult::Accepted(file),
            Err(reason) => ValidationResult::Rejected {
                name: file.name,
                reason,
            },
        }
    }

    pub fn validate_batch(&self, files: impl IntoIterator<Item = PendingFile>) -> BatchValidation {
        let mut batch = BatchValidation::default();
        for file in files {
            match self.validate(file) {
                ValidationResult::Accepted(file) => batch.accepted.push(file),
                ValidationResult::Rejected { name, reason } => {
                    tracing::debug!(file = %name, %reason, "Rejected file");
                    batch.rejected.push(Rejection { name, reason });
                }
            }
        }
        batch
    }

    fn check(&self, file: &PendingFile) -> Result<(), String> {
        check_name(&file.name)?;
        self.check_type(file)?;
        self.check_size(file)
    }

    fn check_type(&self, file: &PendingFile) -> Result<(), String> {
        let Some(extension) = extension_of(&file.name) else {
            return Err(format!(
                "File has no extension; allowed types are {}",
                self.policy.allowed_extensions()
            ));
        };

        let Some(expected_mime) = self.policy.mime_for_extension(extension) else {
            return Err(format!(
                "File type '.{}' is not allowed; allowed types are {}",
                extension.to_ascii_lowercase(),
                self.policy.allowed_extensions()
            ));
        };

        if let Some(mime) = file.mime_type.as_deref() {
            let essence = mime.split(';').next().unwrap_or(mime).trim();
            if !essence.eq_ignore_ascii_case(expected_mime) {
                return Err(format!(
                    "Content type '{}' does not match a '.{}' file (expected {})",
                    essence,
                    extension.to_ascii_lowercase(),
                    expected_mime
                ));
            }
        }

        Ok(())
    }

    fn check_size(&self, file: &PendingFile) -> Result<(), String> {
        if file.size > self.policy.max_file_size_bytes {
            return Err(format!(
                "File is {} and exceeds the {} limit",
                format_size(file.size),
                format_size(self.policy.max_file_size_bytes)
            ));
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("File name is empty".to_string());
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(format!(
            "File name contains '{}'; only letters, digits, '_', '.' and '-' are allowed",
            bad.escape_default()
        ));
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 12_582_912;

    fn validator() -> Validator {
        Validator::new(UploadPolicy::default())
    }

    fn reason(result: ValidationResult) -> String {
        match result {
            ValidationResult::Rejected { reason, .. } => reason,
            ValidationResult::Accepted(file) => panic!("{} was accepted", file.name),
        }
    }

    #[test]
    fn test_accepts_allowed_types() {
        let v = validator();
        for (name, mime) in [
            ("cat.png", Some("image/png")),
            ("photo.JPG", Some("image/jpeg")),
            ("photo.jpeg", Some("IMAGE/JPEG")),
            ("anim.gif", None),
            ("report_v2-final.pdf", Some("application/pdf")),
        ] {
            assert!(
                v.validate(PendingFile::new(name, vec![0u8; 16], mime))
                    .is_accepted(),
                "{} rejected",
                name
            );
        }
    }

    #[test]
    fn test_oversized_files_rejected_whatever_the_name() {
        let v = validator();
        for name in ["big.png", "bad name.png", "big.exe"] {
            let file = PendingFile::new(name, vec![0u8; LIMIT + 1], Some("image/png"));
            assert!(!v.validate(file).is_accepted(), "{} accepted", name);
        }
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let v = validator();
        let at_limit = PendingFile::new("edge.png", vec![0u8; LIMIT], Some("image/png"));
        assert!(v.validate(at_limit).is_accepted());

        let over = PendingFile::new("edge.png", vec![0u8; LIMIT + 1], Some("image/png"));
        assert!(reason(v.validate(over)).contains("exceeds the 12.0 MiB limit"));
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let v = validator();
        for name in ["", "my cat.png", "../cat.png", "cat?.png", "кот.png", "a/b.png"] {
            let file = PendingFile::new(name, vec![0u8; 4], Some("image/png"));
            assert!(!v.validate(file).is_accepted(), "{:?} accepted", name);
        }
    }

    #[test]
    fn test_name_rule_wins_over_type_and_size() {
        let file = PendingFile::new("bad name.exe", vec![0u8; LIMIT + 1], None);
        assert!(reason(validator().validate(file)).starts_with("File name contains ' '"));
    }

    #[test]
    fn test_type_rules() {
        let v = validator();
        let no_ext = PendingFile::new("README", vec![1], None);
        assert!(reason(v.validate(no_ext)).contains("no extension"));

        let exe = PendingFile::new("setup.exe", vec![1], None);
        assert!(reason(v.validate(exe)).contains("'.exe' is not allowed"));

        let spoofed = PendingFile::new("cat.png", vec![1], Some("text/html"));
        assert!(reason(v.validate(spoofed)).contains("expected image/png"));
    }

    #[test]
    fn test_batch_keeps_valid_files_and_reports_each_rejection() {
        let batch = validator().validate_batch(vec![
            PendingFile::new("a.png", vec![1], Some("image/png")),
            PendingFile::new("b c.png", vec![1], Some("image/png")),
            PendingFile::new("d.pdf", vec![1], Some("application/pdf")),
            PendingFile::new("e.zip", vec![1], None),
        ]);

        let accepted: Vec<_> = batch.accepted.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(accepted, vec!["a.png", "d.pdf"]);

        let rejected: Vec<_> = batch.rejected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(rejected, vec!["b c.png", "e.zip"]);
        assert!(!batch.all_accepted());
    }
}
