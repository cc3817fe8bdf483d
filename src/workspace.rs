use std::{cell::Ref, rc::Rc};

use log::{debug, error, info, warn};

use crate::{
    capability::{DirectoryEntry, FileFilter, FilePicker},
    error::FsError,
    handles::{HandleDirectory, SharedHandles},
    persistence::PersistencePipeline,
    registry::{FileEntry, Registry, SharedRegistry},
    settings::AppSettings,
    sidebar::Sidebar,
    sync::RemoteSync,
};

/// What an upload did, for callers that report it to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Opened(String),
    /// The file was already known. Its handle was replaced and its content
    /// reloaded from the newly picked file.
    Reopened(String),
    Imported {
        folder: String,
        files: Vec<String>,
    },
    Cancelled,
    Failed(String),
}

/// Glues the picker, the handle directory and the persistence pipeline to the
/// registry. Every user action of the workspace view goes through here.
pub struct Workspace {
    registry: SharedRegistry,
    handles: SharedHandles,
    pipeline: PersistencePipeline,
    picker: Rc<dyn FilePicker>,
    filter: FileFilter,
}

impl Workspace {
    pub fn new(picker: Rc<dyn FilePicker>, settings: &AppSettings) -> Self {
        Self::with_remote(picker, settings, None)
    }

    pub fn with_remote(
        picker: Rc<dyn FilePicker>,
        settings: &AppSettings,
        remote: Option<Rc<dyn RemoteSync>>,
    ) -> Self {
        let registry = Registry::shared();
        let handles = HandleDirectory::shared();
        let pipeline = PersistencePipeline::new(
            Rc::clone(&registry),
            Rc::clone(&handles),
            settings.debounce(),
            remote,
        );
        Self {
            registry,
            handles,
            pipeline,
            picker,
            filter: settings.file_filter(),
        }
    }

    pub fn registry(&self) -> Ref<'_, Registry> {
        self.registry.borrow()
    }

    pub fn shared_registry(&self) -> SharedRegistry {
        Rc::clone(&self.registry)
    }

    pub fn has_handle(&self, name: &str) -> bool {
        self.handles.borrow().contains(name)
    }

    pub fn has_pending_write(&self) -> bool {
        self.pipeline.has_pending_write()
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    pub fn sidebar(&self) -> Sidebar {
        Sidebar::from_registry(&self.registry.borrow())
    }

    pub async fn upload_file(&self) -> UploadOutcome {
        let handle = match self.picker.pick_file(&self.filter).await {
            Ok(handle) => handle,
            Err(FsError::Cancelled) => {
                debug!("File picker dismissed");
                return UploadOutcome::Cancelled;
            }
            Err(e) => {
                error!("Error opening file: {}", e);
                return UploadOutcome::Failed(e.to_string());
            }
        };

        let name = handle.name();
        let reopened = self.registry.borrow().contains(&name);
        if reopened {
            // The new handle wins, an edit still waiting for the old one is dropped
            self.pipeline.discard_pending_for(&name);
        } else {
            self.registry.borrow_mut().add_file(&name, None);
        }
        self.handles.borrow_mut().insert(&name, handle);
        self.registry.borrow_mut().select_file(&name);

        let loaded = self.pipeline.load(&name).await;
        if reopened {
            if loaded {
                self.registry.borrow_mut().mark_file_as_saved(&name);
            }
            info!("Reopened file {}", name);
            UploadOutcome::Reopened(name)
        } else {
            info!("Opened file {}", name);
            UploadOutcome::Opened(name)
        }
    }

    pub async fn upload_folder(&self) -> UploadOutcome {
        let directory = match self.picker.pick_directory().await {
            Ok(directory) => directory,
            Err(FsError::Cancelled) => {
                debug!("Folder picker dismissed");
                return UploadOutcome::Cancelled;
            }
            Err(e) => {
                error!("Error opening folder: {}", e);
                return UploadOutcome::Failed(e.to_string());
            }
        };

        let folder = directory.name();
        let entries = match directory.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error reading folder {}: {}", folder, e);
                return UploadOutcome::Failed(e.to_string());
            }
        };

        let mut staged = vec![];
        for entry in entries {
            match entry {
                DirectoryEntry::File { name, handle } if self.filter.matches(&name) => {
                    // A pending edit of a file with this name now lands in the new handle
                    self.handles.borrow_mut().insert(&name, handle);
                    staged.push(FileEntry::new(name, Some(folder.as_str())));
                }
                other => debug!("Skipping {} in {}", other.name(), folder),
            }
        }

        let first = {
            let mut registry = self.registry.borrow_mut();
            registry.add_files(&staged);
            match staged.first() {
                Some(first) if registry.selected_file().is_none() => {
                    registry.select_file(&first.name);
                    Some(first.name.clone())
                }
                _ => None,
            }
        };
        if let Some(first) = first {
            self.pipeline.load(&first).await;
        }

        info!("Imported {} files from {}", staged.len(), folder);
        UploadOutcome::Imported {
            folder,
            files: staged.into_iter().map(|entry| entry.name).collect(),
        }
    }

    /// Switches to a known file and re-reads it from disk, so changes made
    /// outside the editor show up. Unknown names leave the selection as is.
    pub async fn select_existing_file(&self, name: &str) -> bool {
        if !self.registry.borrow_mut().select_file(name) {
            warn!("No file named {}", name);
            return false;
        }
        if self.pipeline.flush_pending_for(name).await {
            debug!("Wrote pending edit of {} before reloading", name);
        }
        self.pipeline.load(name).await;
        true
    }

    pub fn on_editor_text_changed<S: Into<String>>(&self, text: S) {
        let text = text.into();
        let target = {
            let mut registry = self.registry.borrow_mut();
            registry.set_editor_text(text.clone());
            let target = registry.selected_file().map(|name| name.to_string());
            if let Some(name) = &target {
                registry.mark_file_as_unsaved(name);
            }
            target
        };
        self.pipeline.schedule_write(target, text);
    }

    /// Forgets every file. The pending edit, if any, is dropped.
    pub fn clear(&self) {
        self.pipeline.cancel_pending();
        self.handles.borrow_mut().clear();
        self.registry.borrow_mut().clear();
    }

    pub async fn flush(&self) {
        self.pipeline.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, time::Duration};

    use tokio::{task::LocalSet, time::sleep};

    use super::{UploadOutcome, Workspace};
    use crate::{
        capability::{MemoryFs, MemoryPicker, PickerAnswer},
        settings::AppSettings,
        sidebar::FileStatus,
    };

    const WINDOW: Duration = Duration::from_millis(500);

    fn workspace(fs: &MemoryFs) -> (Rc<MemoryPicker>, Workspace) {
        let picker = Rc::new(MemoryPicker::new(fs));
        let workspace = Workspace::new(picker.clone(), &AppSettings::default());
        (picker, workspace)
    }

    #[tokio::test(start_paused = true)]
    async fn upload_file_selects_and_loads() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("home/notes.txt", "hello");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("home/notes.txt");

                let outcome = workspace.upload_file().await;
                assert_eq!(UploadOutcome::Opened("notes.txt".to_string()), outcome);

                let registry = workspace.registry();
                assert_eq!(Some("notes.txt"), registry.selected_file());
                assert_eq!("hello", registry.editor_text());
                let record = registry.file("notes.txt").unwrap();
                assert!(record.is_saved);
                assert!(!record.is_loading);
                assert_eq!(None, record.folder_name);
                assert!(workspace.has_handle("notes.txt"));
                assert_eq!(1, picker.seen_filters().len());
                assert!(picker.seen_filters()[0].matches("x.txt"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pickers_change_nothing() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                let (picker, workspace) = workspace(&fs);
                picker.answer(PickerAnswer::Cancel);

                assert_eq!(UploadOutcome::Cancelled, workspace.upload_file().await);
                assert_eq!(UploadOutcome::Cancelled, workspace.upload_folder().await);
                assert!(workspace.registry().is_empty());
                assert_eq!(None, workspace.registry().selected_file());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn picker_failure_registers_nothing() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                let (picker, workspace) = workspace(&fs);
                picker.answer(PickerAnswer::Fail("Access denied".to_string()));
                picker.answer(PickerAnswer::Fail("Access denied".to_string()));

                assert_eq!(
                    UploadOutcome::Failed("Access denied".to_string()),
                    workspace.upload_file().await
                );
                assert_eq!(
                    UploadOutcome::Failed("Access denied".to_string()),
                    workspace.upload_folder().await
                );
                assert!(workspace.registry().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_on_upload_sets_error() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("x.txt", "secret");
                fs.fail_reads("x.txt", "Permission denied");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("x.txt");

                workspace.upload_file().await;

                let registry = workspace.registry();
                let record = registry.file("x.txt").unwrap();
                assert_eq!(Some("Permission denied".to_string()), record.error);
                assert!(!record.is_loading);
                assert_eq!(Some("x.txt"), registry.selected_file());
                assert_eq!("", registry.editor_text());
                assert_eq!(FileStatus::Error, workspace.sidebar().ungrouped[0].status);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn folder_import_groups_and_auto_selects_first() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Docs/a.txt", "alpha");
                fs.insert("Docs/b.txt", "beta");
                fs.insert("Docs/image.png", "png");
                fs.insert("Docs/nested/c.txt", "nested");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Docs");

                let outcome = workspace.upload_folder().await;
                assert_eq!(
                    UploadOutcome::Imported {
                        folder: "Docs".to_string(),
                        files: vec!["a.txt".to_string(), "b.txt".to_string()],
                    },
                    outcome
                );

                {
                    let registry = workspace.registry();
                    assert_eq!(2, registry.len());
                    assert_eq!(Some("a.txt"), registry.selected_file());
                    assert_eq!("alpha", registry.editor_text());
                }
                assert!(workspace.has_handle("b.txt"));
                assert!(!workspace.has_handle("image.png"));

                let sidebar = workspace.sidebar();
                assert!(sidebar.ungrouped.is_empty());
                assert_eq!(1, sidebar.folders.len());
                assert_eq!("Docs", sidebar.folders[0].folder);
                assert_eq!(2, sidebar.folders[0].files.len());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn folder_import_keeps_existing_selection() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("notes.txt", "mine");
                fs.insert("Docs/a.txt", "alpha");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                picker.answer_directory("Docs");

                workspace.upload_file().await;
                workspace.upload_folder().await;

                let registry = workspace.registry();
                assert_eq!(Some("notes.txt"), registry.selected_file());
                assert_eq!("mine", registry.editor_text());
                assert!(registry.contains("a.txt"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn folder_without_text_files_imports_nothing() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Pics/a.png", "png");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Pics");

                let outcome = workspace.upload_folder().await;
                assert_eq!(
                    UploadOutcome::Imported {
                        folder: "Pics".to_string(),
                        files: vec![],
                    },
                    outcome
                );
                assert!(workspace.registry().is_empty());
                assert_eq!(None, workspace.registry().selected_file());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_write_follows_the_file_it_was_typed_in() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Docs/a.txt", "alpha");
                fs.insert("Docs/b.txt", "beta");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Docs");
                workspace.upload_folder().await;

                workspace.on_editor_text_changed("hello");
                assert!(!workspace.registry().file("a.txt").unwrap().is_saved);
                sleep(Duration::from_millis(100)).await;
                assert!(workspace.select_existing_file("b.txt").await);
                assert_eq!("beta", workspace.registry().editor_text());

                sleep(WINDOW * 2).await;
                assert_eq!(Some("hello".to_string()), fs.content("Docs/a.txt"));
                assert_eq!(Some("beta".to_string()), fs.content("Docs/b.txt"));
                assert!(workspace.registry().file("a.txt").unwrap().is_saved);
                assert_eq!(1, fs.commits().len());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn edit_on_second_file_replaces_pending_write() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Docs/a.txt", "alpha");
                fs.insert("Docs/b.txt", "beta");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Docs");
                workspace.upload_folder().await;

                workspace.on_editor_text_changed("alpha edited");
                workspace.select_existing_file("b.txt").await;
                workspace.on_editor_text_changed("beta edited");
                sleep(WINDOW * 2).await;

                assert_eq!(
                    vec![("Docs/b.txt".to_string(), "beta edited".to_string())],
                    fs.commits()
                );
                assert!(!workspace.registry().file("a.txt").unwrap().is_saved);
                assert!(workspace.registry().file("b.txt").unwrap().is_saved);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn folder_import_keeps_pending_edit_of_same_name() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("a.txt", "old");
                fs.insert("Docs/a.txt", "docs");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("a.txt");
                picker.answer_directory("Docs");
                workspace.upload_file().await;

                workspace.on_editor_text_changed("my edit");
                workspace.upload_folder().await;
                assert!(workspace.has_pending_write());

                sleep(WINDOW * 2).await;
                let registry = workspace.registry();
                let record = registry.file("a.txt").unwrap();
                assert!(record.is_saved);
                assert_eq!(Some("Docs".to_string()), record.folder_name);
                assert_eq!("my edit", registry.editor_text());
                assert_eq!(
                    vec![("Docs/a.txt".to_string(), "my edit".to_string())],
                    fs.commits()
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn reselecting_during_running_write_reads_written_text() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new().with_latency(Duration::from_millis(100));
                fs.insert("notes.txt", "old");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                workspace.upload_file().await;

                workspace.on_editor_text_changed("new");
                sleep(WINDOW + Duration::from_millis(50)).await;
                assert!(workspace.registry().file("notes.txt").unwrap().is_loading);

                assert!(workspace.select_existing_file("notes.txt").await);
                sleep(Duration::from_secs(2)).await;

                let registry = workspace.registry();
                let record = registry.file("notes.txt").unwrap();
                assert_eq!("new", registry.editor_text());
                assert_eq!(Some("new".to_string()), fs.content("notes.txt"));
                assert!(record.is_saved);
                assert!(!record.is_loading);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn typing_burst_is_saved_once() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("notes.txt", "");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                workspace.upload_file().await;

                let mut text = String::new();
                for c in "typing".chars() {
                    text.push(c);
                    workspace.on_editor_text_changed(text.as_str());
                    sleep(Duration::from_millis(80)).await;
                }
                assert!(workspace.has_pending_write());
                assert_eq!(
                    FileStatus::Unsaved,
                    workspace.sidebar().ungrouped[0].status
                );

                sleep(WINDOW * 2).await;
                assert_eq!(
                    vec![("notes.txt".to_string(), "typing".to_string())],
                    fs.commits()
                );
                assert_eq!(FileStatus::Saved, workspace.sidebar().ungrouped[0].status);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn reupload_replaces_handle_and_discards_pending_edit() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("first/a.txt", "one");
                fs.insert("second/a.txt", "two");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("first/a.txt");
                picker.answer_file("second/a.txt");

                workspace.upload_file().await;
                workspace.on_editor_text_changed("edited");

                let outcome = workspace.upload_file().await;
                assert_eq!(UploadOutcome::Reopened("a.txt".to_string()), outcome);
                assert!(!workspace.has_pending_write());
                assert_eq!(1, workspace.registry().len());
                assert_eq!("two", workspace.registry().editor_text());
                assert!(workspace.registry().file("a.txt").unwrap().is_saved);

                sleep(WINDOW * 2).await;
                assert!(fs.commits().is_empty());

                workspace.on_editor_text_changed("new");
                sleep(WINDOW * 2).await;
                assert_eq!(Some("new".to_string()), fs.content("second/a.txt"));
                assert_eq!(Some("one".to_string()), fs.content("first/a.txt"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn select_existing_file_picks_up_external_changes() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Docs/a.txt", "alpha");
                fs.insert("Docs/b.txt", "beta");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Docs");
                workspace.upload_folder().await;

                fs.insert("Docs/a.txt", "changed elsewhere");
                assert!(workspace.select_existing_file("b.txt").await);
                assert!(workspace.select_existing_file("a.txt").await);
                assert_eq!("changed elsewhere", workspace.registry().editor_text());

                assert!(!workspace.select_existing_file("missing.txt").await);
                assert_eq!(Some("a.txt"), workspace.registry().selected_file());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn reselecting_writes_pending_edit_before_reload() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("notes.txt", "old");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                workspace.upload_file().await;

                workspace.on_editor_text_changed("fresh");
                assert!(workspace.select_existing_file("notes.txt").await);

                assert_eq!("fresh", workspace.registry().editor_text());
                assert_eq!(Some("fresh".to_string()), fs.content("notes.txt"));
                assert!(!workspace.has_pending_write());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_keeps_edit_in_buffer() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("notes.txt", "old");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                workspace.upload_file().await;
                fs.fail_writes("notes.txt", "Disk full");

                workspace.on_editor_text_changed("unsaved work");
                sleep(WINDOW * 2).await;

                let registry = workspace.registry();
                let record = registry.file("notes.txt").unwrap();
                assert_eq!(Some("Disk full".to_string()), record.error);
                assert!(!record.is_saved);
                assert_eq!("unsaved work", registry.editor_text());
                assert_eq!(Some("old".to_string()), fs.content("notes.txt"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_forgets_everything() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("Docs/a.txt", "alpha");
                let (picker, workspace) = workspace(&fs);
                picker.answer_directory("Docs");
                workspace.upload_folder().await;
                workspace.on_editor_text_changed("dropped");

                workspace.clear();
                sleep(WINDOW * 2).await;

                let registry = workspace.registry();
                assert!(registry.is_empty());
                assert_eq!(None, registry.selected_file());
                assert_eq!("", registry.editor_text());
                assert!(!workspace.has_handle("a.txt"));
                assert!(fs.commits().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_without_waiting() {
        LocalSet::new()
            .run_until(async {
                let fs = MemoryFs::new();
                fs.insert("notes.txt", "");
                let (picker, workspace) = workspace(&fs);
                picker.answer_file("notes.txt");
                workspace.upload_file().await;

                workspace.on_editor_text_changed("last words");
                workspace.flush().await;
                assert_eq!(Some("last words".to_string()), fs.content("notes.txt"));
                assert!(workspace.registry().file("notes.txt").unwrap().is_saved);
            })
            .await;
    }
}
