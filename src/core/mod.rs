mod errors;
mod manager;
mod manager_worker;
mod progress;
mod store;
mod traits;
mod types;
mod worker;

pub use errors::{ManagerError, Result, UploadError};
pub use manager::{FilteredEventReceiver, ManagerConfig, UploadManager, UploadManagerHandle};
pub use progress::{aggregate, percentage, AggregateProgress, UploadSnapshot};
pub use traits::{Compressor, ProgressCallback, Transport};
pub use types::{
    media_type_for_path,
    CompressionOptions,
    FileHandle,
    OutputFormat,
    RemoteObject,
    Upload,
    UploadEvent,
    UploadId,
    UploadStatus,
};
