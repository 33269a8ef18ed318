use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::frontmatter::{self, FrontMatter};
use crate::walk::{self, NOTE_EXTENSION};

/// Files read concurrently during a scan.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 64;
/// Leading bytes read per note; enough for front matter plus excerpt.
pub const DEFAULT_HEADER_BYTES: usize = 16 * 1024;
/// Characters of body text kept as an excerpt.
pub const DEFAULT_EXCERPT_CHARS: usize = 150;

// ---- Types ----

/// Summary of one note file, as listed in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMetadata {
    pub id: String,
    pub title: String,
    pub absolute_path: PathBuf,
    /// Path from the root, with platform separators.
    pub relative_path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl NoteMetadata {
    /// Build a summary from decoded front matter. Fields present in the
    /// front matter win over values derived from the path.
    pub fn from_parts(
        metadata: &FrontMatter,
        body: &str,
        absolute_path: &Path,
        relative_path: String,
        excerpt_chars: usize,
    ) -> Self {
        let id = metadata
            .text("id")
            .map(str::to_string)
            .unwrap_or_else(|| id_from_relative_path(&relative_path));
        let title = metadata
            .text("title")
            .map(str::to_string)
            .unwrap_or_else(|| title_from_path(absolute_path));

        Self {
            id,
            title,
            absolute_path: absolute_path.to_path_buf(),
            relative_path,
            tags: metadata.list("tags"),
            created_at: metadata.text("createdAt").map(str::to_string),
            updated_at: metadata.text("updatedAt").map(str::to_string),
            excerpt: excerpt(body, excerpt_chars),
        }
    }

    /// Relative path of the directory holding this note, `/` separated,
    /// `""` for the root.
    pub fn folder_path(&self) -> String {
        let normalized = walk::to_slash(&self.relative_path);
        match normalized.rsplit_once('/') {
            Some((parent, _)) if parent != "." => parent.to_string(),
            _ => String::new(),
        }
    }
}

/// Tuning knobs for [`scan_notes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub header_bytes: usize,
    pub excerpt_chars: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SCAN_CONCURRENCY,
            header_bytes: DEFAULT_HEADER_BYTES,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

// ---- Helpers ----

/// Default note id: relative path with `/` separators and no `.md` suffix.
pub fn id_from_relative_path(relative_path: &str) -> String {
    let normalized = walk::to_slash(relative_path);
    match normalized.strip_suffix(NOTE_EXTENSION) {
        Some(stem) => stem.to_string(),
        None => normalized,
    }
}

/// Default title: the file name without its `.md` suffix.
pub fn title_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(NOTE_EXTENSION) {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

pub fn excerpt(body: &str, max_chars: usize) -> Option<String> {
    let text: String = body.trim().chars().take(max_chars).collect();
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Read at most `limit` bytes from the start of `path`.
async fn read_header(path: &Path, limit: usize) -> io::Result<String> {
    let file = fs::File::open(path).await?;
    let mut bytes = Vec::with_capacity(limit.min(DEFAULT_HEADER_BYTES));
    file.take(limit as u64).read_to_end(&mut bytes).await?;
    Ok(utf8_prefix(bytes))
}

/// Decode bytes that may end partway through a multi-byte character.
fn utf8_prefix(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let error = e.utf8_error();
            let bytes = e.into_bytes();
            if error.error_len().is_none() {
                String::from_utf8_lossy(&bytes[..error.valid_up_to()]).into_owned()
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }
}

async fn read_note_metadata(root: &Path, path: PathBuf, options: ScanOptions) -> Option<NoteMetadata> {
    let header = match read_header(&path, options.header_bytes).await {
        Ok(header) => header,
        Err(e) => {
            warn!("Error reading note {}: {}", path.display(), e);
            return None;
        }
    };

    let decoded = frontmatter::decode(&header);
    let relative_path = path
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned());

    Some(NoteMetadata::from_parts(
        &decoded.metadata,
        &decoded.body,
        &path,
        relative_path,
        options.excerpt_chars,
    ))
}

// ---- Scan ----

/// List every note under `root`.
///
/// Directories are walked concurrently, then note headers are read with at
/// most `options.concurrency` files open at once. Unreadable files are
/// logged and left out. The result is unordered.
pub async fn scan_notes(root: &Path, options: ScanOptions) -> Vec<NoteMetadata> {
    let paths = walk::collect_note_files(root, false).await;
    debug!("Found {} note files under {}", paths.len(), root.display());

    walk::map_bounded(paths, options.concurrency, |path| {
        read_note_metadata(root, path, options)
    })
    .await
}
