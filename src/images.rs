//! Image attachments stored under `<root>/images/`.
//!
//! An image belongs to a note when its file name starts with the note's
//! sanitized base name followed by `_`. Nothing else records the relation,
//! so before deleting anything every note under the root is scanned for
//! references to the candidate files.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::sanitize::sanitize_note_base;
use crate::scanner::DEFAULT_SCAN_CONCURRENCY;
use crate::walk::{self, IMAGES_DIR};

pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

pub const SUPPORTED_IMAGE_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("valid regex"));
static HTML_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src=["']([^"']+)["'][^>]*>"#).expect("valid regex"));
static LINK_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+("[^"]*"|'[^']*')$"#).expect("valid regex"));

// ---- Types ----

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of saving an image. `relative_path` is set on success
/// (`images/<name>`), `error` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSaveResult {
    pub success: bool,
    pub relative_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, ImageError>> for ImageSaveResult {
    fn from(result: Result<String, ImageError>) -> Self {
        match result {
            Ok(relative_path) => Self {
                success: true,
                relative_path: Some(relative_path),
                error: None,
            },
            Err(e) => Self {
                success: false,
                relative_path: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Outcome of a cleanup pass. `success` only says the pass ran; files that
/// could not be removed are listed in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub success: bool,
    pub deleted_files: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for CleanupResult {
    fn default() -> Self {
        Self {
            success: true,
            deleted_files: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// ---- Naming ----

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_lowercase();
    SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Whether `path` has one of the supported image extensions (any case).
pub fn is_image_file(path: &Path) -> bool {
    is_supported_extension(&extension_of(path))
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// `<base>_<YYYYMMDDHHmmssSSS>_<seq:03>.<ext>`, stamped with the current
/// local time.
pub fn generate_image_file_name(note_base: &str, ext: &str, seq: u32) -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S%3f");
    format!("{}_{}_{:03}.{}", sanitize_note_base(note_base), timestamp, seq, ext)
}

/// Probe `seq = 1, 2, ...` until the generated name is free in `images_dir`.
pub async fn find_unique_file_name(images_dir: &Path, note_base: &str, ext: &str) -> String {
    let mut seq = 1;
    loop {
        let name = generate_image_file_name(note_base, ext, seq);
        if !fs::try_exists(images_dir.join(&name)).await.unwrap_or(false) {
            return name;
        }
        seq += 1;
    }
}

fn owner_prefix(note_base: &str) -> String {
    format!("{}_", sanitize_note_base(note_base))
}

// ---- References ----

/// Every target of `![alt](path)` and `<img src="path">` in `markdown`, in
/// order of appearance. Duplicates are kept.
///
/// Markdown targets lose their angle brackets and any trailing link title.
/// HTML `src` values are taken whole, spaces included.
pub fn parse_image_references(markdown: &str) -> Vec<String> {
    let markdown_refs = MARKDOWN_IMAGE
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), markdown_target(m.as_str()).to_string()));
    let html_refs = HTML_IMAGE
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str().to_string()));

    let mut refs: Vec<(usize, String)> = markdown_refs.chain(html_refs).collect();
    refs.sort_by_key(|(start, _)| *start);
    refs.into_iter().map(|(_, path)| path).collect()
}

fn markdown_target(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('<') {
        if let Some(end) = inner.find('>') {
            return &inner[..end];
        }
    }
    match LINK_TITLE.find(raw) {
        Some(title) => &raw[..title.start()],
        None => raw,
    }
}

/// File name a reference points at: the last path segment without any
/// query or fragment.
pub fn reference_file_name(reference: &str) -> Option<String> {
    let name = reference.trim().rsplit(['/', '\\']).next()?;
    let name = name.split(['?', '#']).next().unwrap_or(name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn referenced_names(markdown: &str) -> HashSet<String> {
    parse_image_references(markdown)
        .iter()
        .filter_map(|r| reference_file_name(r))
        .collect()
}

/// Image file names referenced by any note under `root`. Notes inside the
/// root `images/` directory are not read; unreadable notes are skipped.
pub async fn scan_all_note_references(root: &Path) -> HashSet<String> {
    let notes = walk::collect_note_files(root, true).await;
    let per_note = walk::map_bounded(notes, DEFAULT_SCAN_CONCURRENCY, |path| async move {
        match fs::read_to_string(&path).await {
            Ok(content) => Some(referenced_names(&content)),
            Err(e) => {
                debug!("Skipping {} in reference scan: {}", path.display(), e);
                None
            }
        }
    })
    .await;

    per_note.into_iter().flatten().collect()
}

// ---- Saving ----

pub fn images_dir(root: &Path) -> PathBuf {
    root.join(IMAGES_DIR)
}

/// Create `<root>/images` if needed and return its path.
pub async fn ensure_images_dir(root: &Path) -> io::Result<PathBuf> {
    let dir = images_dir(root);
    fs::create_dir_all(&dir).await?;
    Ok(dir)
}

async fn try_save_from_file(root: &Path, note_base: &str, source: &Path) -> Result<String, ImageError> {
    if !is_image_file(source) {
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        return Err(ImageError::UnsupportedFormat(ext));
    }

    let dir = ensure_images_dir(root).await?;
    let name = find_unique_file_name(&dir, note_base, &extension_of(source)).await;
    fs::copy(source, dir.join(&name)).await?;
    Ok(format!("{}/{}", IMAGES_DIR, name))
}

/// Copy an image file into `<root>/images` under a fresh name owned by
/// `note_base`.
pub async fn save_image_from_file(root: &Path, note_base: &str, source: &Path) -> ImageSaveResult {
    let result = try_save_from_file(root, note_base, source).await;
    if let Err(e) = &result {
        warn!("Failed to save image {}: {}", source.display(), e);
    }
    result.into()
}

async fn try_save_from_buffer(root: &Path, note_base: &str, bytes: &[u8], ext: &str) -> Result<String, ImageError> {
    if !is_supported_extension(ext) {
        return Err(ImageError::UnsupportedFormat(ext.to_string()));
    }

    let dir = ensure_images_dir(root).await?;
    let name = find_unique_file_name(&dir, note_base, &ext.to_lowercase()).await;
    fs::write(dir.join(&name), bytes).await?;
    Ok(format!("{}/{}", IMAGES_DIR, name))
}

/// Write raw image bytes (e.g. pasted from the clipboard) into
/// `<root>/images` under a fresh name owned by `note_base`.
pub async fn save_image_from_buffer(root: &Path, note_base: &str, bytes: &[u8], ext: &str) -> ImageSaveResult {
    let result = try_save_from_buffer(root, note_base, bytes, ext).await;
    if let Err(e) = &result {
        warn!("Failed to save pasted image: {}", e);
    }
    result.into()
}

// ---- Cleanup ----

/// Plain file names in `dir`, or `None` when it cannot be listed.
async fn list_image_files(dir: &Path) -> Option<Vec<String>> {
    match walk::list_dir(dir).await {
        Ok(listing) => Some(listing.files.into_iter().map(|e| e.name).collect()),
        Err(e) => {
            debug!("No images to clean up in {}: {}", dir.display(), e);
            None
        }
    }
}

async fn remove_files(dir: &Path, names: Vec<String>, result: &mut CleanupResult) {
    for name in names {
        match fs::remove_file(dir.join(&name)).await {
            Ok(()) => result.deleted_files.push(name),
            Err(e) => result.errors.push(format!("Failed to delete {}: {}", name, e)),
        }
    }
}

/// Delete the images owned by `note_base` that neither `current_markdown`
/// nor any note under `root` still references.
pub async fn cleanup_unused_images(root: &Path, note_base: &str, current_markdown: &str) -> CleanupResult {
    let mut result = CleanupResult::default();
    let dir = images_dir(root);
    let Some(files) = list_image_files(&dir).await else {
        return result;
    };

    let prefix = owner_prefix(note_base);
    let in_current = referenced_names(current_markdown);
    let unreferenced: Vec<String> = files
        .into_iter()
        .filter(|f| f.starts_with(&prefix) && !in_current.contains(f))
        .collect();
    if unreferenced.is_empty() {
        return result;
    }

    let everywhere = scan_all_note_references(root).await;
    let doomed = unreferenced.into_iter().filter(|f| !everywhere.contains(f)).collect();
    remove_files(&dir, doomed, &mut result).await;
    result
}

/// Delete every image owned by `note_base` that no note under `root`
/// references. Used when the note itself is deleted.
pub async fn delete_note_images(root: &Path, note_base: &str) -> CleanupResult {
    let mut result = CleanupResult::default();
    let dir = images_dir(root);
    let Some(files) = list_image_files(&dir).await else {
        return result;
    };

    let prefix = owner_prefix(note_base);
    let owned: Vec<String> = files.into_iter().filter(|f| f.starts_with(&prefix)).collect();
    if owned.is_empty() {
        return result;
    }

    let everywhere = scan_all_note_references(root).await;
    let doomed = owned.into_iter().filter(|f| !everywhere.contains(f)).collect();
    remove_files(&dir, doomed, &mut result).await;
    result
}

/// Delete every file in `<root>/images` that no note under `root` references.
pub async fn cleanup_all_unused_images(root: &Path) -> CleanupResult {
    let mut result = CleanupResult::default();
    let dir = images_dir(root);
    let Some(files) = list_image_files(&dir).await else {
        return result;
    };
    if files.is_empty() {
        return result;
    }

    let everywhere = scan_all_note_references(root).await;
    let doomed = files.into_iter().filter(|f| !everywhere.contains(f)).collect();
    remove_files(&dir, doomed, &mut result).await;
    result
}
