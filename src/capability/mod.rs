pub mod memory;
pub mod native;

use std::{fmt::Debug, path::Path, rc::Rc};

use async_trait::async_trait;

use crate::error::FsError;

pub use memory::{MemoryFs, MemoryPicker, PickerAnswer};
pub use native::NativePicker;

/// Restricts the single-file picker to a set of extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub description: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn text<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            description: "Text Files".to_string(),
            extensions: extensions
                .iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn matches<S: AsRef<str>>(&self, file_name: S) -> bool {
        Path::new(file_name.as_ref())
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::text(&["txt"])
    }
}

#[async_trait(?Send)]
pub trait FilePicker {
    /// Asks the user for one file. Dismissing the dialog yields [`FsError::Cancelled`].
    async fn pick_file(&self, filter: &FileFilter) -> Result<Rc<dyn FileHandle>, FsError>;
    async fn pick_directory(&self) -> Result<Box<dyn DirectoryHandle>, FsError>;
}

/// Read/write capability over a single file, granted by a picker.
#[async_trait(?Send)]
pub trait FileHandle: Debug {
    fn name(&self) -> String;
    async fn read(&self) -> Result<String, FsError>;
    async fn open_writer(&self) -> Result<Box<dyn FileWriter>, FsError>;
}

/// Scoped writer. Data is only committed by [`FileWriter::close`], which must be
/// called whether or not the writes succeeded.
#[async_trait(?Send)]
pub trait FileWriter {
    async fn write(&mut self, text: &str) -> Result<(), FsError>;
    async fn close(self: Box<Self>) -> Result<(), FsError>;
}

#[async_trait(?Send)]
pub trait DirectoryHandle: Debug {
    fn name(&self) -> String;
    /// Immediate children only, in enumeration order.
    async fn entries(&self) -> Result<Vec<DirectoryEntry>, FsError>;
}

#[derive(Debug, Clone)]
pub enum DirectoryEntry {
    File {
        name: String,
        handle: Rc<dyn FileHandle>,
    },
    Directory {
        name: String,
    },
}

impl DirectoryEntry {
    pub fn name(&self) -> &str {
        match self {
            DirectoryEntry::File { name, .. } => name,
            DirectoryEntry::Directory { name } => name,
        }
    }
}

/// Writes `text` through a fresh writer and closes it even when the write fails.
pub async fn write_text(handle: &dyn FileHandle, text: &str) -> Result<(), FsError> {
    let mut writer = handle.open_writer().await?;
    let written = writer.write(text).await;
    let closed = writer.close().await;
    written?;
    closed
}
