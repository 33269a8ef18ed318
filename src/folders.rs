use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::scanner::NoteMetadata;
use crate::walk;

/// One directory of the note tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub name: String,
    /// `/` separated path from the root; `""` for the root itself.
    pub relative_path: String,
    pub children: Vec<FolderNode>,
    /// Notes directly inside this directory (not in subdirectories).
    pub notes: Vec<NoteMetadata>,
}

impl FolderNode {
    pub fn new(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            children: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Node at `relative_path` (`/` separated) below this one.
    pub fn find(&self, relative_path: &str) -> Option<&FolderNode> {
        let mut node = self;
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.iter().find(|c| c.name == segment)?;
        }
        Some(node)
    }

    pub fn find_mut(&mut self, relative_path: &str) -> Option<&mut FolderNode> {
        let mut node = self;
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.iter_mut().find(|c| c.name == segment)?;
        }
        Some(node)
    }

    /// Number of notes in this node and all of its descendants.
    pub fn total_notes(&self) -> usize {
        self.notes.len() + self.children.iter().map(FolderNode::total_notes).sum::<usize>()
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Build the node for `dir` with its whole subtree. A directory's own
/// entries are registered before its subdirectories are walked, and the
/// subdirectories are walked concurrently.
fn walk_folders<'a>(root: &'a Path, dir: PathBuf, node: FolderNode) -> BoxFuture<'a, FolderNode> {
    async move {
        let mut node = node;
        let listing = match walk::list_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Error scanning directory structure {}: {}", dir.display(), e);
                return node;
            }
        };

        let pending = listing
            .dirs
            .into_iter()
            .filter(|e| !walk::is_reserved(root, &dir, &e.name))
            .map(|e| {
                let child = FolderNode::new(e.name.clone(), child_path(&node.relative_path, &e.name));
                walk_folders(root, e.path, child)
            })
            .collect::<Vec<_>>();

        node.children = join_all(pending).await;
        node
    }
    .boxed()
}

/// Build the folder tree under `root` and hang each note on the node of
/// its parent directory.
///
/// The directory walk is independent of whatever produced `notes`. A note
/// whose directory was not found by the walk is dropped.
pub async fn build_folder_tree(root: &Path, notes: &[NoteMetadata]) -> FolderNode {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned());

    let mut tree = walk_folders(root, root.to_path_buf(), FolderNode::new(name, "")).await;

    for note in notes {
        let folder = note.folder_path();
        match tree.find_mut(&folder) {
            Some(node) => node.notes.push(note.clone()),
            None => debug!("No folder '{}' for note {}", folder, note.relative_path),
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{scan_notes, ScanOptions};
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        stdfs::create_dir_all(path.parent().unwrap()).unwrap();
        stdfs::write(path, "body").unwrap();
    }

    fn names(node: &FolderNode) -> Vec<&str> {
        let mut names: Vec<&str> = node.children.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_tree_mirrors_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        stdfs::create_dir_all(root.join("docs/sub")).unwrap();
        stdfs::create_dir_all(root.join("empty")).unwrap();
        stdfs::create_dir_all(root.join("images")).unwrap();
        stdfs::create_dir_all(root.join("docs/images")).unwrap();

        let tree = build_folder_tree(root, &[]).await;
        assert_eq!(tree.relative_path, "");
        assert_eq!(tree.name, root.file_name().unwrap().to_string_lossy());
        assert_eq!(names(&tree), vec!["docs", "empty"]);

        let docs = tree.find("docs").unwrap();
        assert_eq!(names(docs), vec!["images", "sub"]);
        assert_eq!(tree.find("docs/sub").unwrap().relative_path, "docs/sub");
        assert!(tree.find("images").is_none());
    }

    #[tokio::test]
    async fn test_notes_attach_to_parent_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "top.md");
        write(root, "docs/mid.md");
        write(root, "docs/sub/deep.md");

        let notes = scan_notes(root, ScanOptions::default()).await;
        let tree = build_folder_tree(root, &notes).await;

        assert_eq!(tree.notes.len(), 1);
        assert_eq!(tree.notes[0].title, "top");

        let docs = tree.find("docs").unwrap();
        assert_eq!(docs.notes.len(), 1);
        assert_eq!(docs.notes[0].title, "mid");

        let sub = tree.find("docs/sub").unwrap();
        assert_eq!(sub.notes.len(), 1);
        assert_eq!(sub.notes[0].title, "deep");
        assert_eq!(tree.total_notes(), 3);
    }

    #[tokio::test]
    async fn test_note_in_unknown_folder_is_dropped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "gone/ghost.md");
        let notes = scan_notes(root, ScanOptions::default()).await;
        stdfs::remove_dir_all(root.join("gone")).unwrap();

        let tree = build_folder_tree(root, &notes).await;
        assert_eq!(tree.total_notes(), 0);
        assert!(tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_windows_style_relative_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        stdfs::create_dir_all(root.join("docs/sub")).unwrap();
        let mut notes = scan_notes(root, ScanOptions::default()).await;
        notes.push(NoteMetadata {
            id: "docs/sub/n".to_string(),
            title: "n".to_string(),
            absolute_path: root.join("docs/sub/n.md"),
            relative_path: r"docs\sub\n.md".to_string(),
            tags: vec![],
            created_at: None,
            updated_at: None,
            excerpt: None,
        });

        let tree = build_folder_tree(root, &notes).await;
        assert_eq!(tree.find("docs/sub").unwrap().notes.len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut node = FolderNode::new("root", "");
        node.children.push(FolderNode::new("a", "a"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["relativePath"], "");
        assert_eq!(json["children"][0]["relativePath"], "a");
        assert!(json["notes"].as_array().unwrap().is_empty());
    }
}
