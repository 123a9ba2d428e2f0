pub mod compress;
pub mod config;
pub mod core;
pub mod uploaders;
pub mod utils;

// 重新导出核心类型
pub use crate::core::{
    AggregateProgress,
    CompressionOptions,
    Compressor,
    FileHandle,
    ManagerConfig,
    ManagerError,
    OutputFormat,
    RemoteObject,
    Result,
    Transport,
    Upload,
    UploadError,
    UploadEvent,
    UploadId,
    UploadManager,
    UploadManagerHandle,
    UploadSnapshot,
    UploadStatus,
};

pub use crate::compress::ImageCompressor;
pub use crate::config::{Config, ConfigError};
pub use crate::uploaders::{MultipartConfig, MultipartUploader};
pub use crate::utils::format_bytes;
