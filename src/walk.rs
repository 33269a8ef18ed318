//! Directory traversal shared by the note scanner, the folder tree builder
//! and the image reference scan.
//!
//! Every walk is independent: a failure listing one directory is logged and
//! treated as an empty directory, so one walk can fail without affecting
//! another.

use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Root-level directory that holds image attachments.
pub const IMAGES_DIR: &str = "images";

/// Suffix identifying note files. Matched case-sensitively.
pub const NOTE_EXTENSION: &str = ".md";

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
}

/// Immediate children of a directory, split by kind, in listing order.
/// Symlinks and other special files are left out.
#[derive(Debug, Default)]
pub struct Listing {
    pub dirs: Vec<Entry>,
    pub files: Vec<Entry>,
}

pub async fn list_dir(dir: &Path) -> io::Result<Listing> {
    let mut listing = Listing::default();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(_) => continue,
        };
        let item = Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
        };
        if file_type.is_dir() {
            listing.dirs.push(item);
        } else if file_type.is_file() {
            listing.files.push(item);
        }
    }

    Ok(listing)
}

/// Whether `name` under `parent` is the reserved attachments directory.
/// Only the one directly under the root counts.
pub fn is_reserved(root: &Path, parent: &Path, name: &str) -> bool {
    name == IMAGES_DIR && parent == root
}

pub fn is_note_file_name(name: &str) -> bool {
    name.ends_with(NOTE_EXTENSION)
}

/// Recursively collect every note file under `root`. Subdirectories are
/// walked concurrently.
pub async fn collect_note_files(root: &Path, skip_reserved: bool) -> Vec<PathBuf> {
    collect_from(root, root.to_path_buf(), skip_reserved).await
}

fn collect_from<'a>(root: &'a Path, dir: PathBuf, skip_reserved: bool) -> BoxFuture<'a, Vec<PathBuf>> {
    async move {
        let listing = match list_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Error collecting files from {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = listing
            .files
            .into_iter()
            .filter(|e| is_note_file_name(&e.name))
            .map(|e| e.path)
            .collect();

        let nested = listing
            .dirs
            .into_iter()
            .filter(|e| !(skip_reserved && is_reserved(root, &dir, &e.name)))
            .map(|e| collect_from(root, e.path, skip_reserved));

        for found in join_all(nested).await {
            files.extend(found);
        }
        files
    }
    .boxed()
}

/// Run `f` over `items` with at most `limit` futures in flight, keeping
/// the `Some` results. Output order follows completion, not input.
pub async fn map_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .filter_map(futures::future::ready)
        .collect()
        .await
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        stdfs::create_dir_all(path.parent().unwrap()).unwrap();
        stdfs::write(path, "x").unwrap();
    }

    #[tokio::test]
    async fn test_collect_note_files_recurses() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("a.md"));
        touch(&root.join("docs/b.md"));
        touch(&root.join("docs/sub/c.md"));
        touch(&root.join("docs/readme.txt"));
        touch(&root.join("upper.MD"));

        let mut found = collect_note_files(root, false).await;
        found.sort();
        assert_eq!(
            found,
            vec![root.join("a.md"), root.join("docs/b.md"), root.join("docs/sub/c.md")]
        );
    }

    #[tokio::test]
    async fn test_collect_skips_only_root_images() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("images/stray.md"));
        touch(&root.join("docs/images/nested.md"));

        let skipped = collect_note_files(root, true).await;
        assert_eq!(skipped, vec![root.join("docs/images/nested.md")]);

        let all = collect_note_files(root, false).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let found = collect_note_files(&dir.path().join("nope"), false).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_map_bounded_keeps_some_results() {
        let items: Vec<u32> = (0..100).collect();
        let mut out = map_bounded(items, 8, |n| async move { (n % 2 == 0).then_some(n) }).await;
        out.sort();
        assert_eq!(out.len(), 50);
        assert_eq!(out[0], 0);
        assert_eq!(out[49], 98);
    }

    #[tokio::test]
    async fn test_map_bounded_caps_in_flight() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..50).collect();

        let out = map_bounded(items, 4, |n| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                Some(n)
            }
        })
        .await;

        assert_eq!(out.len(), 50);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak {}", peak);
        assert!(peak > 1, "peak {}", peak);
    }

    #[test]
    fn test_is_reserved() {
        let root = Path::new("/notes");
        assert!(is_reserved(root, root, "images"));
        assert!(!is_reserved(root, &root.join("docs"), "images"));
        assert!(!is_reserved(root, root, "Images"));
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(r"docs\sub\note.md"), "docs/sub/note.md");
    }
}
