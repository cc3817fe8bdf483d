use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    rc::Rc,
};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;

use super::{DirectoryEntry, DirectoryHandle, FileFilter, FileHandle, FilePicker, FileWriter};
use crate::error::FsError;

const SWAP_SUFFIX: &str = ".swap";

/// Native dialogs through `rfd`, file access through `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct NativePicker {
    start_dir: Option<PathBuf>,
}

impl NativePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.start_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn dialog(&self) -> rfd::AsyncFileDialog {
        let dialog = rfd::AsyncFileDialog::new();
        match &self.start_dir {
            Some(dir) => dialog.set_directory(dir),
            None => dialog,
        }
    }
}

#[async_trait(?Send)]
impl FilePicker for NativePicker {
    async fn pick_file(&self, filter: &FileFilter) -> Result<Rc<dyn FileHandle>, FsError> {
        let picked = self
            .dialog()
            .add_filter(filter.description.as_str(), filter.extensions.as_slice())
            .pick_file()
            .await
            .ok_or(FsError::Cancelled)?;
        Ok(Rc::new(NativeFileHandle::new(picked.path())))
    }

    async fn pick_directory(&self) -> Result<Box<dyn DirectoryHandle>, FsError> {
        let picked = self.dialog().pick_folder().await.ok_or(FsError::Cancelled)?;
        Ok(Box::new(NativeDirectoryHandle::new(picked.path())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFileHandle {
    path: PathBuf,
}

impl NativeFileHandle {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn swap_path(&self) -> PathBuf {
        let mut swap: OsString = self.path.clone().into_os_string();
        swap.push(SWAP_SUFFIX);
        PathBuf::from(swap)
    }
}

#[async_trait(?Send)]
impl FileHandle for NativeFileHandle {
    fn name(&self) -> String {
        file_name_of(&self.path)
    }

    async fn read(&self) -> Result<String, FsError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(String::from_utf8(bytes)?)
    }

    async fn open_writer(&self) -> Result<Box<dyn FileWriter>, FsError> {
        let swap = self.swap_path();
        let file = tokio::fs::File::create(&swap).await?;
        Ok(Box::new(NativeFileWriter {
            file,
            swap,
            target: self.path.clone(),
            failed: false,
        }))
    }
}

/// Writes into a sibling swap file; `close` moves it over the target, so a
/// write that never closes leaves the original untouched.
struct NativeFileWriter {
    file: tokio::fs::File,
    swap: PathBuf,
    target: PathBuf,
    failed: bool,
}

#[async_trait(?Send)]
impl FileWriter for NativeFileWriter {
    async fn write(&mut self, text: &str) -> Result<(), FsError> {
        if let Err(e) = self.file.write_all(text.as_bytes()).await {
            self.failed = true;
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), FsError> {
        let NativeFileWriter {
            mut file,
            swap,
            target,
            failed,
        } = *self;

        let synced = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);

        if failed || synced.is_err() {
            debug!("Discarding swap file {}", swap.to_string_lossy());
            if let Err(e) = tokio::fs::remove_file(&swap).await {
                warn!("Can't remove swap file {}: {}", swap.to_string_lossy(), e);
            }
            synced?;
            return Ok(());
        }

        tokio::fs::rename(&swap, &target).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDirectoryHandle {
    path: PathBuf,
}

impl NativeDirectoryHandle {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait(?Send)]
impl DirectoryHandle for NativeDirectoryHandle {
    fn name(&self) -> String {
        file_name_of(&self.path)
    }

    async fn entries(&self) -> Result<Vec<DirectoryEntry>, FsError> {
        let mut read_dir = tokio::fs::read_dir(&self.path).await?;
        let mut entries = vec![];
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(SWAP_SUFFIX) {
                continue;
            }
            // Follows symlinks, a dangling one is just skipped
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping entry {}: {}", name, e);
                    continue;
                }
            };
            if metadata.is_dir() {
                entries.push(DirectoryEntry::Directory { name });
            } else if metadata.is_file() {
                entries.push(DirectoryEntry::File {
                    name,
                    handle: Rc::new(NativeFileHandle::new(entry.path())),
                });
            }
        }
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
