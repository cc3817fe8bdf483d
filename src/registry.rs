use std::{cell::RefCell, rc::Rc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SharedRegistry = Rc<RefCell<Registry>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub name: String,
    pub folder_name: Option<String>,
    pub last_edited: Option<DateTime<Utc>>,
    pub is_saved: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    // Bumped on every edit, lets a finished write tell whether it is still current
    #[serde(default)]
    pub revision: u64,
}

impl FileRecord {
    fn new<S: AsRef<str>>(name: S, folder_name: Option<String>) -> Self {
        Self {
            name: name.as_ref().to_string(),
            folder_name,
            last_edited: None,
            is_saved: true,
            is_loading: false,
            error: None,
            revision: 0,
        }
    }
}

/// A file discovered by a picker, before it becomes a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub folder_name: Option<String>,
}

impl FileEntry {
    pub fn new<S: AsRef<str>>(name: S, folder_name: Option<&str>) -> Self {
        Self {
            name: name.as_ref().to_string(),
            folder_name: folder_name.map(|f| f.to_string()),
        }
    }
}

/// Serializable state of the workspace: the known files, the selection and the
/// editor buffer. Every operation here is a plain state transition; I/O lives in
/// the persistence pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    files: Vec<FileRecord>,
    selected_file: Option<String>,
    editor_text: String,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.name == name)
    }

    fn file_mut(&mut self, name: &str) -> Option<&mut FileRecord> {
        self.files.iter_mut().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn selected_file(&self) -> Option<&str> {
        self.selected_file.as_deref()
    }

    pub fn selected_record(&self) -> Option<&FileRecord> {
        self.selected_file.as_deref().and_then(|name| self.file(name))
    }

    pub fn editor_text(&self) -> &str {
        &self.editor_text
    }

    pub fn add_file<S: AsRef<str>>(&mut self, name: S, folder_name: Option<&str>) {
        let name = name.as_ref();
        if !self.contains(name) {
            self.files
                .push(FileRecord::new(name, folder_name.map(|f| f.to_string())));
        }
    }

    /// Bulk insert for folder imports. Existing records keep their data, but an
    /// ungrouped record adopts the first folder it is seen in.
    pub fn add_files(&mut self, entries: &[FileEntry]) {
        for entry in entries {
            match self.file_mut(&entry.name) {
                Some(existing) => {
                    if existing.folder_name.is_none() && entry.folder_name.is_some() {
                        existing.folder_name = entry.folder_name.clone();
                    }
                }
                None => self
                    .files
                    .push(FileRecord::new(&entry.name, entry.folder_name.clone())),
            }
        }
    }

    /// Returns `false` and leaves the selection untouched when there is no
    /// record with that name.
    pub fn select_file(&mut self, name: &str) -> bool {
        if self.contains(name) {
            self.selected_file = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn set_editor_text<S: Into<String>>(&mut self, text: S) {
        self.editor_text = text.into();
    }

    pub fn mark_file_as_unsaved(&mut self, name: &str) {
        if let Some(file) = self.file_mut(name) {
            file.is_saved = false;
            file.last_edited = Some(Utc::now());
            file.error = None;
            file.revision = file.revision.wrapping_add(1);
        }
    }

    pub fn mark_file_as_saved(&mut self, name: &str) {
        if let Some(file) = self.file_mut(name) {
            file.is_saved = true;
        }
    }

    /// Marks the file saved only if nothing was edited since `revision` was read.
    pub fn mark_file_as_saved_if_current(&mut self, name: &str, revision: u64) -> bool {
        match self.file_mut(name) {
            Some(file) if file.revision == revision => {
                file.is_saved = true;
                true
            }
            _ => false,
        }
    }

    pub fn set_file_loading(&mut self, name: &str, is_loading: bool) {
        if let Some(file) = self.file_mut(name) {
            file.is_loading = is_loading;
            if is_loading {
                file.error = None;
            }
        }
    }

    pub fn set_file_error<S: Into<String>>(&mut self, name: &str, message: S) {
        if let Some(file) = self.file_mut(name) {
            file.error = Some(message.into());
            file.is_loading = false;
            file.is_saved = false;
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.selected_file = None;
        self.editor_text.clear();
    }
}
