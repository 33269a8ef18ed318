use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use crate::images::{self, CleanupResult};

/// Remembers the most recently used notes root so a final image cleanup
/// can run when the application exits.
#[derive(Debug, Default)]
pub struct Session {
    last_root: RwLock<Option<PathBuf>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_root(&self, root: &Path) {
        let mut last = self.last_root.write().expect("session write lock");
        *last = Some(root.to_path_buf());
    }

    pub fn last_root(&self) -> Option<PathBuf> {
        self.last_root.read().expect("session read lock").clone()
    }

    /// Forget the remembered root and return it.
    pub fn take_root(&self) -> Option<PathBuf> {
        self.last_root.write().expect("session write lock").take()
    }

    /// Run a full image cleanup over the last used root, if any. A second
    /// call does nothing until another root is marked.
    pub async fn shutdown(&self) -> Option<CleanupResult> {
        let root = self.take_root()?;
        let result = images::cleanup_all_unused_images(&root).await;
        info!(
            "Image cleanup on exit for {}: {} deleted, {} errors",
            root.display(),
            result.deleted_files.len(),
            result.errors.len()
        );
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_mark_and_take() {
        let session = Session::new();
        assert_eq!(session.last_root(), None);

        session.mark_root(Path::new("/a"));
        session.mark_root(Path::new("/b"));
        assert_eq!(session.last_root(), Some(PathBuf::from("/b")));
        assert_eq!(session.take_root(), Some(PathBuf::from("/b")));
        assert_eq!(session.last_root(), None);
    }

    #[tokio::test]
    async fn test_shutdown_without_root() {
        assert_eq!(Session::new().shutdown().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_cleans_last_root_once() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("orphan.png"), [0u8]).unwrap();

        let session = Session::new();
        session.mark_root(dir.path());

        let result = session.shutdown().await.unwrap();
        assert_eq!(result.deleted_files, vec!["orphan.png"]);
        assert!(!images.join("orphan.png").exists());
        assert_eq!(session.shutdown().await, None);
    }
}
