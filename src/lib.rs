pub mod capability;
pub mod debounce;
pub mod error;
pub mod handles;
pub mod persistence;
pub mod registry;
pub mod settings;
pub mod sidebar;
pub mod sync;
pub mod workspace;

pub use error::{FsError, SyncError};
pub use registry::{FileEntry, FileRecord, Registry};
pub use settings::AppSettings;
pub use workspace::{UploadOutcome, Workspace};
