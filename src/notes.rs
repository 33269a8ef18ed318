//! Create, read, update, rename, move and delete individual note files.
//!
//! Every public operation reports failure as data (`None` or `false`) and
//! logs the cause; none of them return an error to the caller.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::frontmatter::{self, FrontMatter};
use crate::sanitize::sanitize_note_filename;
use crate::scanner::{NoteMetadata, DEFAULT_EXCERPT_CHARS};
use crate::walk::NOTE_EXTENSION;

/// A note read in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContent {
    pub meta: NoteMetadata,
    /// Body with the front matter removed.
    pub content: String,
    /// File contents exactly as stored.
    pub raw_content: String,
}

// ---- Path helpers ----

/// Current time as an ISO-8601 UTC timestamp with milliseconds.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lexically resolve `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a root-relative folder onto `root`, refusing anything that would
/// land outside of it.
pub fn resolve_in_root(root: &Path, folder_path: &str) -> Result<PathBuf> {
    let folder_path = folder_path.trim_matches(['/', '\\']);
    let target = normalize_path(&root.join(folder_path));
    if !target.starts_with(normalize_path(root)) {
        bail!("Folder '{}' is outside of {}", folder_path, root.display());
    }
    Ok(target)
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// First free `<stem>.md`, `<stem>-1.md`, `<stem>-2.md`, ... in `dir`.
/// `allow` is treated as free even if it exists (a note being rewritten
/// in place).
async fn unique_note_path(dir: &Path, stem: &str, allow: Option<&Path>) -> PathBuf {
    let mut candidate = dir.join(format!("{}{}", stem, NOTE_EXTENSION));
    let mut counter = 1;

    loop {
        if allow == Some(candidate.as_path()) || !exists(&candidate).await {
            return candidate;
        }
        candidate = dir.join(format!("{}-{}{}", stem, counter, NOTE_EXTENSION));
        counter += 1;
    }
}

// ---- Operations ----

/// True when `root` exists and is a directory.
pub async fn check_root_exists(root: &Path) -> bool {
    match fs::metadata(root).await {
        Ok(meta) => meta.is_dir(),
        Err(_) => false,
    }
}

/// Read a whole note. `meta` is derived from the file name since no root
/// is known here.
pub async fn read_note(path: &Path) -> Option<NoteContent> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Error reading note content {}: {}", path.display(), e);
            return None;
        }
    };

    let decoded = frontmatter::decode(&raw);
    let relative_path = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meta = NoteMetadata::from_parts(
        &decoded.metadata,
        &decoded.body,
        path,
        relative_path,
        DEFAULT_EXCERPT_CHARS,
    );

    Some(NoteContent {
        meta,
        content: decoded.body,
        raw_content: raw,
    })
}

/// Write a note. With `front_matter`, the block is rebuilt in full ahead
/// of `content`; without it, `content` is written as is.
pub async fn save_note(path: &Path, content: &str, front_matter: Option<&FrontMatter>) -> bool {
    let text = match front_matter {
        Some(metadata) => frontmatter::encode(content, metadata),
        None => content.to_string(),
    };

    match fs::write(path, text).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Error saving note {}: {}", path.display(), e);
            false
        }
    }
}

async fn try_create_note(root: &Path, folder_path: &str, title: &str) -> Result<PathBuf> {
    let target_dir = resolve_in_root(root, folder_path)?;
    fs::create_dir_all(&target_dir)
        .await
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let path = unique_note_path(&target_dir, &sanitize_note_filename(title), None).await;

    let now = now_iso();
    let mut metadata = FrontMatter::new();
    metadata.set_text("title", title);
    metadata.set_text("createdAt", now.clone());
    metadata.set_text("updatedAt", now);
    metadata.set_list("tags", Vec::new());

    let content = frontmatter::encode(&format!("# {}\n\n", title), &metadata);
    fs::write(&path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    debug!("Created note {}", path.display());
    Ok(path)
}

/// Create a note titled `title` in `folder_path` (relative to `root`),
/// creating the folder if needed. Returns the new file's path.
pub async fn create_note(root: &Path, folder_path: &str, title: &str) -> Option<PathBuf> {
    match try_create_note(root, folder_path, title).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Error creating note: {:#}", e);
            None
        }
    }
}

async fn try_rename_note(old_path: &Path, new_title: &str) -> Result<PathBuf> {
    let dir = old_path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", old_path.display()))?;

    let raw = fs::read_to_string(old_path)
        .await
        .with_context(|| format!("reading {}", old_path.display()))?;
    let mut decoded = frontmatter::decode(&raw);
    decoded.metadata.set_text("title", new_title);
    decoded.metadata.set_text("updatedAt", now_iso());

    let new_path = unique_note_path(dir, &sanitize_note_filename(new_title), Some(old_path)).await;
    fs::write(&new_path, frontmatter::encode(&decoded.body, &decoded.metadata))
        .await
        .with_context(|| format!("writing {}", new_path.display()))?;

    if new_path != old_path {
        fs::remove_file(old_path)
            .await
            .with_context(|| format!("removing {}", old_path.display()))?;
    }

    Ok(new_path)
}

/// Retitle a note: updates `title` and `updatedAt` in its front matter and
/// renames the file after the new title. An existing file with the target
/// name is not overwritten; the name gets a `-1`, `-2`, ... suffix instead.
pub async fn rename_note(old_path: &Path, new_title: &str) -> Option<PathBuf> {
    match try_rename_note(old_path, new_title).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Error renaming note: {:#}", e);
            None
        }
    }
}

pub async fn delete_note(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Error deleting note {}: {}", path.display(), e);
            false
        }
    }
}

async fn try_move_note(root: &Path, current_path: &Path, target_folder: &str) -> Result<PathBuf> {
    let file_name = current_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", current_path.display()))?;
    let target_dir = resolve_in_root(root, target_folder)?;

    if normalize_path(current_path) == normalize_path(&target_dir.join(&file_name)) {
        return Ok(current_path.to_path_buf());
    }

    fs::create_dir_all(&target_dir)
        .await
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let stem = file_name.strip_suffix(NOTE_EXTENSION).unwrap_or(&file_name);
    let new_path = unique_note_path(&target_dir, stem, None).await;

    // Copy then remove so moves work across devices. If the removal fails
    // both files are left in place.
    fs::copy(current_path, &new_path)
        .await
        .with_context(|| format!("copying {} to {}", current_path.display(), new_path.display()))?;
    fs::remove_file(current_path)
        .await
        .with_context(|| format!("removing {}", current_path.display()))?;

    Ok(new_path)
}

/// Move a note into `target_folder` (relative to `root`, `""` for the root).
/// Moving a note onto its own location returns it untouched.
pub async fn move_note(root: &Path, current_path: &Path, target_folder: &str) -> Option<PathBuf> {
    match try_move_note(root, current_path, target_folder).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Error moving note {}: {:#}", current_path.display(), e);
            None
        }
    }
}

async fn try_create_folder(root: &Path, folder_path: &str) -> Result<()> {
    let target = resolve_in_root(root, folder_path)?;
    fs::create_dir_all(&target)
        .await
        .with_context(|| format!("creating {}", target.display()))
}

pub async fn create_folder(root: &Path, folder_path: &str) -> bool {
    match try_create_folder(root, folder_path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Error creating folder: {:#}", e);
            false
        }
    }
}

async fn try_delete_folder(root: &Path, folder_path: &str) -> Result<()> {
    let target = resolve_in_root(root, folder_path)?;
    if target == normalize_path(root) {
        bail!("refusing to delete the root folder {}", root.display());
    }
    match fs::remove_dir_all(&target).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("removing {}", target.display()))
        }
        _ => Ok(()),
    }
}

/// Remove a folder and everything in it. A folder that is already gone
/// counts as removed. The root itself is never removed.
pub async fn delete_folder(root: &Path, folder_path: &str) -> bool {
    match try_delete_folder(root, folder_path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Error deleting folder: {:#}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c.md")), PathBuf::from("/a/c.md"));
        assert_eq!(normalize_path(Path::new("/a//b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_resolve_in_root() {
        let root = Path::new("/notes");
        assert_eq!(resolve_in_root(root, "docs/sub").unwrap(), PathBuf::from("/notes/docs/sub"));
        assert_eq!(resolve_in_root(root, "").unwrap(), PathBuf::from("/notes"));
        assert_eq!(resolve_in_root(root, "/docs/").unwrap(), PathBuf::from("/notes/docs"));
        assert!(resolve_in_root(root, "../escape").is_err());
    }

    #[test]
    fn test_now_iso_shape() {
        let now = now_iso();
        assert_eq!(now.len(), 24);
        assert!(now.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_check_root_exists() {
        let dir = TempDir::new().unwrap();
        assert!(check_root_exists(dir.path()).await);
        assert!(!check_root_exists(&dir.path().join("missing")).await);
        let file = dir.path().join("file.md");
        stdfs::write(&file, "x").unwrap();
        assert!(!check_root_exists(&file).await);
    }

    #[tokio::test]
    async fn test_create_note_writes_front_matter() {
        let dir = TempDir::new().unwrap();
        let path = create_note(dir.path(), "docs", "My New Note").await.unwrap();
        assert_eq!(path, dir.path().join("docs/my-new-note.md"));

        let raw = stdfs::read_to_string(&path).unwrap();
        assert!(raw.contains("title: My New Note"));
        assert!(raw.contains("# My New Note"));

        let decoded = frontmatter::decode(&raw);
        assert_eq!(decoded.body, "# My New Note\n\n");
        assert!(decoded.metadata.list("tags").is_empty());
        assert_eq!(decoded.metadata.text("createdAt"), decoded.metadata.text("updatedAt"));
    }

    #[tokio::test]
    async fn test_create_note_collision_suffix() {
        let dir = TempDir::new().unwrap();
        let first = create_note(dir.path(), "", "Same").await.unwrap();
        let second = create_note(dir.path(), "", "Same").await.unwrap();
        let third = create_note(dir.path(), "", "Same").await.unwrap();
        assert_eq!(first, dir.path().join("same.md"));
        assert_eq!(second, dir.path().join("same-1.md"));
        assert_eq!(third, dir.path().join("same-2.md"));
    }

    #[tokio::test]
    async fn test_create_note_outside_root_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        stdfs::create_dir_all(&root).unwrap();
        assert!(create_note(&root, "../elsewhere", "x").await.is_none());
        assert!(!dir.path().join("elsewhere").exists());
    }

    #[tokio::test]
    async fn test_read_note() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("my-note.md");
        let raw = "---\ntitle: My Note\n---\nNote body here\n";
        stdfs::write(&path, raw).unwrap();

        let note = read_note(&path).await.unwrap();
        assert_eq!(note.meta.title, "My Note");
        assert_eq!(note.meta.id, "my-note");
        assert_eq!(note.content, "Note body here\n");
        assert_eq!(note.raw_content, raw);
    }

    #[tokio::test]
    async fn test_read_missing_note_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_note(&dir.path().join("nope.md")).await.is_none());
    }

    #[tokio::test]
    async fn test_save_note_verbatim_and_with_front_matter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");

        assert!(save_note(&path, "# Hello", None).await);
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "# Hello");

        let mut fm = FrontMatter::new();
        fm.set_text("title", "Hello");
        assert!(save_note(&path, "# Hello", Some(&fm)).await);
        let raw = stdfs::read_to_string(&path).unwrap();
        assert!(raw.contains("title: Hello"));
        assert!(raw.ends_with("---\n# Hello"));
    }

    #[tokio::test]
    async fn test_save_note_failure_is_false() {
        let dir = TempDir::new().unwrap();
        assert!(!save_note(&dir.path().join("missing/dir/note.md"), "x", None).await);
    }

    #[tokio::test]
    async fn test_rename_note() {
        let dir = TempDir::new().unwrap();
        let old = create_note(dir.path(), "", "Old Title").await.unwrap();

        let new = rename_note(&old, "New Title").await.unwrap();
        assert_eq!(new, dir.path().join("new-title.md"));
        assert!(!old.exists());

        let decoded = frontmatter::decode(&stdfs::read_to_string(&new).unwrap());
        assert_eq!(decoded.metadata.text("title"), Some("New Title"));
        assert_eq!(decoded.body, "# Old Title\n\n");
    }

    #[tokio::test]
    async fn test_rename_to_same_name_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = create_note(dir.path(), "", "Title").await.unwrap();
        let renamed = rename_note(&path, "TITLE").await.unwrap();
        assert_eq!(renamed, path);
        let raw = stdfs::read_to_string(&path).unwrap();
        assert!(raw.contains("title: TITLE"));
    }

    #[tokio::test]
    async fn test_rename_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let taken = create_note(dir.path(), "", "Taken").await.unwrap();
        let other = create_note(dir.path(), "", "Other").await.unwrap();

        let renamed = rename_note(&other, "Taken").await.unwrap();
        assert_eq!(renamed, dir.path().join("taken-1.md"));
        let original = frontmatter::decode(&stdfs::read_to_string(&taken).unwrap());
        assert_eq!(original.body, "# Taken\n\n");
    }

    #[tokio::test]
    async fn test_rename_missing_note_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(rename_note(&dir.path().join("ghost.md"), "x").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_note() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("n.md");
        stdfs::write(&path, "x").unwrap();
        assert!(delete_note(&path).await);
        assert!(!delete_note(&path).await);
    }

    #[tokio::test]
    async fn test_move_note_copies_then_deletes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let current = root.join("a.md");
        stdfs::write(&current, "content").unwrap();

        let moved = move_note(root, &current, "target").await.unwrap();
        assert_eq!(moved, root.join("target/a.md"));
        assert!(!current.exists());
        assert_eq!(stdfs::read_to_string(&moved).unwrap(), "content");
    }

    #[tokio::test]
    async fn test_move_note_same_location_is_noop() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        stdfs::create_dir_all(root.join("docs")).unwrap();
        let current = root.join("docs/./a.md");
        stdfs::write(root.join("docs/a.md"), "content").unwrap();

        let moved = move_note(root, &current, "docs").await.unwrap();
        assert_eq!(moved, current);
        assert!(root.join("docs/a.md").exists());
        assert!(!root.join("docs/a-1.md").exists());
    }

    #[tokio::test]
    async fn test_move_note_to_root_and_collision() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        stdfs::write(root.join("a.md"), "root copy").unwrap();
        stdfs::create_dir_all(root.join("docs")).unwrap();
        stdfs::write(root.join("docs/a.md"), "docs copy").unwrap();

        let moved = move_note(root, &root.join("docs/a.md"), "").await.unwrap();
        assert_eq!(moved, root.join("a-1.md"));
        assert_eq!(stdfs::read_to_string(root.join("a.md")).unwrap(), "root copy");
        assert_eq!(stdfs::read_to_string(&moved).unwrap(), "docs copy");
    }

    #[tokio::test]
    async fn test_move_missing_note_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        assert!(move_note(root, &root.join("ghost.md"), "target").await.is_none());
        assert!(!root.join("target/ghost.md").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_move_failure_after_copy_keeps_both_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let locked = root.join("locked");
        stdfs::create_dir_all(&locked).unwrap();
        let current = locked.join("a.md");
        stdfs::write(&current, "content").unwrap();
        stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions; nothing to observe then.
        let probe = locked.join("probe");
        if stdfs::write(&probe, "x").is_ok() {
            let _ = stdfs::remove_file(&probe);
            stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let moved = move_note(root, &current, "target").await;
        stdfs::set_permissions(&locked, stdfs::Permissions::from_mode(0o755)).unwrap();

        assert!(moved.is_none());
        assert!(current.exists());
        assert_eq!(stdfs::read_to_string(root.join("target/a.md")).unwrap(), "content");
    }

    #[tokio::test]
    async fn test_create_and_delete_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        assert!(create_folder(root, "a/b/c").await);
        assert!(root.join("a/b/c").is_dir());
        stdfs::write(root.join("a/b/note.md"), "x").unwrap();

        assert!(delete_folder(root, "a").await);
        assert!(!root.join("a").exists());
        assert!(delete_folder(root, "a").await);
    }

    #[tokio::test]
    async fn test_delete_folder_refuses_root() {
        let dir = TempDir::new().unwrap();
        assert!(!delete_folder(dir.path(), "").await);
        assert!(!delete_folder(dir.path(), "sub/..").await);
        assert!(dir.path().exists());
    }
}
