//! Validated file reads, writes and directory listings.
//!
//! Every operation runs the path validator first and touches nothing on
//! rejection: no partial directory creation, no partial write.

use crate::error::SandboxError;
use crate::tools::security::{PathOperation, PathValidator};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// Default read ceiling (10 MiB).
pub const DEFAULT_MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
}

/// Information about a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Entry name
    pub name: String,
    /// Entry type
    pub entry_type: EntryType,
    /// Size in bytes (for files)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modified timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// File access gated by a [`PathValidator`].
///
/// # Example
///
/// ```rust,ignore
/// use toolgate::tools::{SafeFileAccessor, DEFAULT_MAX_READ_BYTES};
/// use toolgate::tools::security::{PathValidator, RootSources};
///
/// let files = SafeFileAccessor::new(PathValidator::new(RootSources::from_process()));
/// files.write("notes/todo.md", "- ship it\n").await?;
/// let text = files.read("notes/todo.md", DEFAULT_MAX_READ_BYTES).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SafeFileAccessor {
    validator: PathValidator,
}

impl SafeFileAccessor {
    /// Creates an accessor around a validator.
    #[must_use]
    pub fn new(validator: PathValidator) -> Self {
        Self { validator }
    }

    /// Returns the validator.
    #[must_use]
    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// Reads a whole text file of at most `max_bytes`.
    ///
    /// The size is checked from metadata before the file is opened, and the
    /// read itself is capped so a file growing in between cannot be buffered
    /// past the limit.
    ///
    /// # Errors
    ///
    /// Security validation, not found, file too large, or I/O failure
    /// (including content that is not UTF-8).
    pub async fn read(&self, path: &str, max_bytes: u64) -> Result<String, SandboxError> {
        let target = self.authorize(path, PathOperation::Read)?;

        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| SandboxError::from_io(path, &e))?;
        if !metadata.is_file() {
            return Err(SandboxError::io(path, "not a regular file"));
        }
        if metadata.len() > max_bytes {
            tracing::warn!(path, size = metadata.len(), max_bytes, "Read exceeds size limit");
            return Err(SandboxError::file_too_large(path, metadata.len(), max_bytes));
        }

        let file = tokio::fs::File::open(&target)
            .await
            .map_err(|e| SandboxError::from_io(path, &e))?;
        let mut buffer = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
        file.take(max_bytes.saturating_add(1))
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| SandboxError::from_io(path, &e))?;

        let read = buffer.len() as u64;
        if read > max_bytes {
            return Err(SandboxError::file_too_large(path, read, max_bytes));
        }

        let text = String::from_utf8(buffer)
            .map_err(|_| SandboxError::io(path, "file is not valid UTF-8 text"))?;
        tracing::debug!(path, bytes = read, "File read");
        Ok(text)
    }

    /// Writes a file, creating missing parent directories and replacing any
    /// existing content.
    ///
    /// # Errors
    ///
    /// Security validation or I/O failure.
    pub async fn write(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = self.authorize(path, PathOperation::Write)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::io(path, format!("failed to create parent directories: {e}")))?;
        }

        tokio::fs::write(&target, content)
            .await
            .map_err(|e| SandboxError::from_io(path, &e))?;

        tracing::debug!(path, bytes = content.len(), "File written");
        Ok(())
    }

    /// Lists a directory, sorted by name.
    ///
    /// Entries that would themselves be rejected as forbidden (for example
    /// `.git` or `.env`) are left out.
    ///
    /// # Errors
    ///
    /// Security validation, not found, or I/O failure.
    pub async fn list(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let target = self.authorize(path, PathOperation::List)?;

        let mut read_dir = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| SandboxError::from_io(path, &e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| SandboxError::io(path, format!("failed to read entry: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if self.validator.is_forbidden(&target.join(&name)) {
                continue;
            }

            let file_type = entry.file_type().await.ok();
            let metadata = entry.metadata().await.ok();

            let entry_type = match file_type {
                Some(ft) if ft.is_symlink() => EntryType::Symlink,
                Some(ft) if ft.is_dir() => EntryType::Dir,
                _ => EntryType::File,
            };
            let size = match entry_type {
                EntryType::File => metadata.as_ref().map(std::fs::Metadata::len),
                _ => None,
            };
            let modified = metadata
                .and_then(|m| m.modified().ok())
                .map(format_time);

            entries.push(DirEntry {
                name,
                entry_type,
                size,
                modified,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Validates a path and returns the absolute path to perform I/O on.
    ///
    /// I/O uses the lexical absolute form so the caller's spelling (and case)
    /// is preserved on disk.
    fn authorize(&self, path: &str, operation: PathOperation) -> Result<PathBuf, SandboxError> {
        let result = self.validator.validate(path, operation);
        if !result.valid {
            return Err(SandboxError::security_validation(path, result.reasons));
        }

        self.validator
            .absolute_path(path)
            .ok_or_else(|| SandboxError::security_validation(path, vec!["invalid path".into()]))
    }
}

/// Formats a system time as ISO 8601.
fn format_time(time: std::time::SystemTime) -> String {
    let datetime = chrono::DateTime::<chrono::Utc>::from(time);
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
