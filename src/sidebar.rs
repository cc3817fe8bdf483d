use std::fmt::{self, Display};

use chrono::{DateTime, Utc};

use crate::registry::{FileRecord, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Loading,
    Error,
    Unsaved,
    Saved,
}

impl FileStatus {
    /// Loading wins over an error, an error over unsaved edits.
    pub fn of(record: &FileRecord) -> Self {
        if record.is_loading {
            FileStatus::Loading
        } else if record.error.is_some() {
            FileStatus::Error
        } else if !record.is_saved {
            FileStatus::Unsaved
        } else {
            FileStatus::Saved
        }
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStatus::Loading => "⏳ Loading...",
            FileStatus::Error => "⚠ Error",
            FileStatus::Unsaved => "⊙ Unsaved",
            FileStatus::Saved => "✓ Saved",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarItem {
    pub name: String,
    pub status: FileStatus,
    pub selected: bool,
    pub last_edited: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SidebarItem {
    fn from_record(record: &FileRecord, selected: Option<&str>) -> Self {
        Self {
            name: record.name.clone(),
            status: FileStatus::of(record),
            selected: selected == Some(record.name.as_str()),
            last_edited: record.last_edited,
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderGroup {
    pub folder: String,
    pub files: Vec<SidebarItem>,
}

/// What the file list shows: ungrouped files first, then one group per folder
/// in the order the folders first appear in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sidebar {
    pub ungrouped: Vec<SidebarItem>,
    pub folders: Vec<FolderGroup>,
}

impl Sidebar {
    pub fn from_registry(registry: &Registry) -> Self {
        let selected = registry.selected_file();
        let mut sidebar = Sidebar::default();
        for record in registry.files() {
            let item = SidebarItem::from_record(record, selected);
            match &record.folder_name {
                None => sidebar.ungrouped.push(item),
                Some(folder) => match sidebar.folders.iter_mut().find(|g| &g.folder == folder) {
                    Some(group) => group.files.push(item),
                    None => sidebar.folders.push(FolderGroup {
                        folder: folder.clone(),
                        files: vec![item],
                    }),
                },
            }
        }
        sidebar
    }

    pub fn is_empty(&self) -> bool {
        self.ungrouped.is_empty() && self.folders.is_empty()
    }
}

fn write_item(f: &mut fmt::Formatter<'_>, item: &SidebarItem, indent: &str) -> fmt::Result {
    let marker = if item.selected { ">" } else { " " };
    write!(f, "{}{} {}  {}", indent, marker, item.name, item.status)?;
    if let Some(error) = &item.error {
        write!(f, " ({})", error)?;
    }
    if let Some(edited) = item.last_edited {
        write!(f, "  edited {}", edited.format("%H:%M:%S"))?;
    }
    writeln!(f)
}

impl Display for Sidebar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No files uploaded yet");
        }
        for item in &self.ungrouped {
            write_item(f, item, "")?;
        }
        for group in &self.folders {
            writeln!(f, "{}/", group.folder)?;
            for item in &group.files {
                write_item(f, item, "  ")?;
            }
        }
        Ok(())
    }
}
