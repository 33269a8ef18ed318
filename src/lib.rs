//! Filesystem core of an offline markdown notes app.
//!
//! Notes are plain `.md` files with optional YAML front matter under a
//! user-chosen root directory. Images live in `<root>/images/` and are tied
//! to a note by file-name prefix. Nothing is cached between calls; every
//! operation goes back to disk.

pub mod folders;
pub mod frontmatter;
pub mod images;
pub mod logging;
pub mod notes;
pub mod sanitize;
pub mod scanner;
pub mod session;
pub mod settings;
pub mod walk;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

pub use folders::{build_folder_tree, FolderNode};
pub use frontmatter::{FrontMatter, FrontMatterValue};
pub use images::{CleanupResult, ImageError, ImageSaveResult};
pub use notes::NoteContent;
pub use scanner::{scan_notes, NoteMetadata, ScanOptions};
pub use session::Session;
pub use settings::{Settings, SettingsError};
pub use watcher::{FileChanged, NoteWatcher};

/// Everything a host application needs: the note operations, the
/// remembered root for exit cleanup, persisted settings and file watching.
pub struct Notebook {
    options: ScanOptions,
    session: Session,
    watcher: NoteWatcher,
    settings: RwLock<Settings>,
    settings_path: Option<PathBuf>,
}

impl Notebook {
    /// A notebook without persisted settings. File change events arrive on
    /// the returned receiver.
    pub fn new(options: ScanOptions) -> (Self, UnboundedReceiver<FileChanged>) {
        Self::build(options, Settings::default(), None)
    }

    /// A notebook whose settings are loaded from, and saved to, `path`.
    pub fn with_settings_file(options: ScanOptions, path: PathBuf) -> (Self, UnboundedReceiver<FileChanged>) {
        let settings = settings::load(&path);
        Self::build(options, settings, Some(path))
    }

    fn build(
        options: ScanOptions,
        settings: Settings,
        settings_path: Option<PathBuf>,
    ) -> (Self, UnboundedReceiver<FileChanged>) {
        let (watcher, changes) = NoteWatcher::new();
        let notebook = Self {
            options,
            session: Session::new(),
            watcher,
            settings: RwLock::new(settings),
            settings_path,
        };
        (notebook, changes)
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // ---- Settings ----

    pub fn settings(&self) -> Settings {
        self.settings.read().expect("settings read lock").clone()
    }

    /// Replace the settings and write them to the settings file, if any.
    pub fn update_settings(&self, new_settings: Settings) -> Result<(), SettingsError> {
        {
            let mut settings = self.settings.write().expect("settings write lock");
            *settings = new_settings;
        }

        if let Some(path) = &self.settings_path {
            let settings = self.settings.read().expect("settings read lock");
            settings::save(path, &settings)?;
        }
        Ok(())
    }

    // ---- Notes ----

    pub async fn check_root_exists(&self, root: &Path) -> bool {
        notes::check_root_exists(root).await
    }

    pub async fn scan_notes(&self, root: &Path) -> Vec<NoteMetadata> {
        self.session.mark_root(root);
        scanner::scan_notes(root, self.options).await
    }

    pub async fn build_folder_tree(&self, root: &Path, notes: &[NoteMetadata]) -> FolderNode {
        folders::build_folder_tree(root, notes).await
    }

    pub async fn get_note_content(&self, path: &Path) -> Option<NoteContent> {
        notes::read_note(path).await
    }

    pub async fn save_note(&self, path: &Path, content: &str, front_matter: Option<&FrontMatter>) -> bool {
        notes::save_note(path, content, front_matter).await
    }

    pub async fn create_note(&self, root: &Path, folder_path: &str, title: &str) -> Option<PathBuf> {
        notes::create_note(root, folder_path, title).await
    }

    pub async fn create_folder(&self, root: &Path, folder_path: &str) -> bool {
        notes::create_folder(root, folder_path).await
    }

    pub async fn rename_note(&self, old_path: &Path, new_title: &str) -> Option<PathBuf> {
        notes::rename_note(old_path, new_title).await
    }

    pub async fn delete_note(&self, path: &Path) -> bool {
        notes::delete_note(path).await
    }

    /// Delete a note, then the images it owns that nothing else references.
    /// `None` when the note itself could not be deleted.
    pub async fn delete_note_with_images(&self, root: &Path, path: &Path) -> Option<CleanupResult> {
        if !notes::delete_note(path).await {
            return None;
        }
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            warn!("Deleted note {} has no file stem", path.display());
            return Some(CleanupResult::default());
        };
        Some(images::delete_note_images(root, &stem).await)
    }

    pub async fn move_note(&self, root: &Path, current_path: &Path, target_folder: &str) -> Option<PathBuf> {
        notes::move_note(root, current_path, target_folder).await
    }

    pub async fn delete_folder(&self, root: &Path, folder_path: &str) -> bool {
        notes::delete_folder(root, folder_path).await
    }

    // ---- Images ----

    pub async fn save_image_from_file(&self, root: &Path, note_base: &str, source: &Path) -> ImageSaveResult {
        self.session.mark_root(root);
        images::save_image_from_file(root, note_base, source).await
    }

    pub async fn save_image_from_buffer(&self, root: &Path, note_base: &str, bytes: &[u8], ext: &str) -> ImageSaveResult {
        self.session.mark_root(root);
        images::save_image_from_buffer(root, note_base, bytes, ext).await
    }

    pub async fn cleanup_unused_images(&self, root: &Path, note_base: &str, markdown: &str) -> CleanupResult {
        images::cleanup_unused_images(root, note_base, markdown).await
    }

    pub async fn delete_note_images(&self, root: &Path, note_base: &str) -> CleanupResult {
        images::delete_note_images(root, note_base).await
    }

    pub async fn cleanup_all_unused_images(&self, root: &Path) -> CleanupResult {
        images::cleanup_all_unused_images(root).await
    }

    // ---- File watching ----

    pub fn watch_file(&self, path: &Path) -> bool {
        self.watcher.watch(path)
    }

    pub fn unwatch_file(&self, path: &Path) -> bool {
        self.watcher.unwatch(path)
    }

    /// Final cleanup over the last used root. Call once when the host exits.
    pub async fn shutdown(&self) -> Option<CleanupResult> {
        debug!("Notebook shutting down");
        self.session.shutdown().await
    }
}
