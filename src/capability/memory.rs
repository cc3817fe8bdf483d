//! In-memory capabilities: a tiny filesystem keyed by `/`-separated paths and a
//! picker that replays scripted answers. Used for headless runs and tests.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use async_trait::async_trait;

use super::{DirectoryEntry, DirectoryHandle, FileFilter, FileHandle, FilePicker, FileWriter};
use crate::error::FsError;

#[derive(Debug, Default)]
struct MemoryFsState {
    files: BTreeMap<String, String>,
    read_failures: HashMap<String, String>,
    write_failures: HashMap<String, String>,
    commits: Vec<(String, String)>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Rc<RefCell<MemoryFsState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read, writer open and close waits this long on the tokio clock.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.borrow_mut().latency = Some(latency);
        self
    }

    pub fn insert<P: AsRef<str>, S: Into<String>>(&self, path: P, content: S) {
        self.state
            .borrow_mut()
            .files
            .insert(normalize(path.as_ref()), content.into());
    }

    pub fn content<P: AsRef<str>>(&self, path: P) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(&normalize(path.as_ref()))
            .cloned()
    }

    pub fn fail_reads<P: AsRef<str>, S: Into<String>>(&self, path: P, message: S) {
        self.state
            .borrow_mut()
            .read_failures
            .insert(normalize(path.as_ref()), message.into());
    }

    pub fn fail_writes<P: AsRef<str>, S: Into<String>>(&self, path: P, message: S) {
        self.state
            .borrow_mut()
            .write_failures
            .insert(normalize(path.as_ref()), message.into());
    }

    pub fn heal<P: AsRef<str>>(&self, path: P) {
        let path = normalize(path.as_ref());
        let mut state = self.state.borrow_mut();
        state.read_failures.remove(&path);
        state.write_failures.remove(&path);
    }

    /// Every committed write as `(path, content)`, oldest first.
    pub fn commits(&self) -> Vec<(String, String)> {
        self.state.borrow().commits.clone()
    }

    pub fn handle<P: AsRef<str>>(&self, path: P) -> Rc<dyn FileHandle> {
        Rc::new(MemoryFileHandle {
            fs: self.clone(),
            path: normalize(path.as_ref()),
        })
    }

    pub fn directory<P: AsRef<str>>(&self, path: P) -> MemoryDirectoryHandle {
        MemoryDirectoryHandle {
            fs: self.clone(),
            path: normalize(path.as_ref()),
        }
    }

    async fn wait(&self) {
        let latency = self.state.borrow().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn last_segment(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[derive(Debug, Clone)]
pub struct MemoryFileHandle {
    fs: MemoryFs,
    path: String,
}

#[async_trait(?Send)]
impl FileHandle for MemoryFileHandle {
    fn name(&self) -> String {
        last_segment(&self.path)
    }

    async fn read(&self) -> Result<String, FsError> {
        self.fs.wait().await;
        let state = self.fs.state.borrow();
        if let Some(message) = state.read_failures.get(&self.path) {
            return Err(FsError::failed(message));
        }
        state
            .files
            .get(&self.path)
            .cloned()
            .ok_or_else(|| FsError::failed(format!("File not found: {}", self.path)))
    }

    async fn open_writer(&self) -> Result<Box<dyn FileWriter>, FsError> {
        self.fs.wait().await;
        Ok(Box::new(MemoryFileWriter {
            fs: self.fs.clone(),
            path: self.path.clone(),
            buffer: String::new(),
            failed: false,
        }))
    }
}

struct MemoryFileWriter {
    fs: MemoryFs,
    path: String,
    buffer: String,
    failed: bool,
}

#[async_trait(?Send)]
impl FileWriter for MemoryFileWriter {
    async fn write(&mut self, text: &str) -> Result<(), FsError> {
        let failure = self.fs.state.borrow().write_failures.get(&self.path).cloned();
        if let Some(message) = failure {
            self.failed = true;
            return Err(FsError::Failed(message));
        }
        self.buffer.push_str(text);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), FsError> {
        let MemoryFileWriter {
            fs,
            path,
            buffer,
            failed,
        } = *self;
        fs.wait().await;
        if failed {
            return Ok(());
        }
        let mut state = fs.state.borrow_mut();
        state.files.insert(path.clone(), buffer.clone());
        state.commits.push((path, buffer));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDirectoryHandle {
    fs: MemoryFs,
    path: String,
}

#[async_trait(?Send)]
impl DirectoryHandle for MemoryDirectoryHandle {
    fn name(&self) -> String {
        last_segment(&self.path)
    }

    async fn entries(&self) -> Result<Vec<DirectoryEntry>, FsError> {
        self.fs.wait().await;
        let prefix = if self.path.is_empty() {
            String::new()
        } else {
            format!("{}/", self.path)
        };

        let paths: Vec<String> = self.fs.state.borrow().files.keys().cloned().collect();
        let mut entries = vec![];
        let mut directories = BTreeSet::new();
        for path in paths {
            let Some(relative) = path.strip_prefix(&prefix) else {
                continue;
            };
            match relative.split_once('/') {
                Some((dir, _)) => {
                    directories.insert(dir.to_string());
                }
                None => entries.push(DirectoryEntry::File {
                    name: relative.to_string(),
                    handle: self.fs.handle(&path),
                }),
            }
        }
        entries.extend(
            directories
                .into_iter()
                .map(|name| DirectoryEntry::Directory { name }),
        );
        Ok(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAnswer {
    File(String),
    Directory(String),
    Cancel,
    Fail(String),
}

/// Answers picker calls from a queue. An exhausted queue behaves like a
/// dismissed dialog.
#[derive(Debug, Default)]
pub struct MemoryPicker {
    fs: MemoryFs,
    answers: RefCell<VecDeque<PickerAnswer>>,
    filters: RefCell<Vec<FileFilter>>,
}

impl MemoryPicker {
    pub fn new(fs: &MemoryFs) -> Self {
        Self {
            fs: fs.clone(),
            ..Default::default()
        }
    }

    pub fn answer(&self, answer: PickerAnswer) {
        self.answers.borrow_mut().push_back(answer);
    }

    pub fn answer_file<P: AsRef<str>>(&self, path: P) {
        self.answer(PickerAnswer::File(path.as_ref().to_string()));
    }

    pub fn answer_directory<P: AsRef<str>>(&self, path: P) {
        self.answer(PickerAnswer::Directory(path.as_ref().to_string()));
    }

    /// Filters the file picker was opened with, in call order.
    pub fn seen_filters(&self) -> Vec<FileFilter> {
        self.filters.borrow().clone()
    }

    fn next_answer(&self) -> PickerAnswer {
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(PickerAnswer::Cancel)
    }
}

#[async_trait(?Send)]
impl FilePicker for MemoryPicker {
    async fn pick_file(&self, filter: &FileFilter) -> Result<Rc<dyn FileHandle>, FsError> {
        self.filters.borrow_mut().push(filter.clone());
        match self.next_answer() {
            PickerAnswer::File(path) => Ok(self.fs.handle(path)),
            PickerAnswer::Directory(path) => {
                Err(FsError::failed(format!("{path} is a directory")))
            }
            PickerAnswer::Cancel => Err(FsError::Cancelled),
            PickerAnswer::Fail(message) => Err(FsError::Failed(message)),
        }
    }

    async fn pick_directory(&self) -> Result<Box<dyn DirectoryHandle>, FsError> {
        match self.next_answer() {
            PickerAnswer::Directory(path) => Ok(Box::new(self.fs.directory(path))),
            PickerAnswer::File(path) => Err(FsError::failed(format!("{path} is not a directory"))),
            PickerAnswer::Cancel => Err(FsError::Cancelled),
            PickerAnswer::Fail(message) => Err(FsError::Failed(message)),
        }
    }
}
