use std::fmt;
use std::path::Path;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::errors::{ManagerError, Result, UploadError};
use super::progress::percentage;

/// 上传任务唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    /// 压缩或上传中
    Progress,
    /// 已完成
    Success,
    /// 失败
    Error,
    /// 已取消
    Canceled,
}

impl UploadStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, UploadStatus::Progress)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Progress => "progress",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
            UploadStatus::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// An in-memory file as handed over by the application: name, declared media
/// type and payload.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Reads a file from disk, deriving the media type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(name, media_type_for_path(path), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Best-effort media type lookup by file extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Re-encode target of the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// WebP; the `image` crate only ships a lossless encoder, quality is ignored
    #[default]
    Webp,
    /// JPEG with quality-controlled lossy compression
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Bounds applied by the compressor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// 0.0 ..= 1.0
    pub quality: f32,
    pub format: OutputFormat,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1000,
            max_height: 1000,
            quality: 0.8,
            format: OutputFormat::Webp,
        }
    }
}

/// Locator of an object stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteObject {
    pub url: String,
}

/// One tracked submission.
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub id: UploadId,
    pub name: String,
    pub media_type: String,
    #[serde(skip)]
    pub source: FileHandle,
    pub status: UploadStatus,
    pub original_size_in_bytes: u64,
    pub compressed_size_in_bytes: Option<u64>,
    pub uploaded_size_in_bytes: u64,
    pub remote_url: Option<String>,
    /// Attempt counter; bumped every time the pipeline (re)starts
    pub attempt: u32,
    /// Whether a cancellation handle is currently live for this upload
    pub in_flight: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Upload {
    pub(crate) fn new(id: UploadId, source: FileHandle) -> Self {
        Self {
            id,
            name: source.name.clone(),
            media_type: source.media_type.clone(),
            status: UploadStatus::Progress,
            original_size_in_bytes: source.size(),
            compressed_size_in_bytes: None,
            uploaded_size_in_bytes: 0,
            remote_url: None,
            attempt: 0,
            in_flight: false,
            error: None,
            created_at: Utc::now(),
            settled_at: None,
            source,
        }
    }

    /// Transmission progress of the compressed payload, 0 ..= 100.
    pub fn percentage(&self) -> u8 {
        match (self.status, self.compressed_size_in_bytes) {
            (UploadStatus::Success, _) => 100,
            (_, Some(compressed)) => percentage(self.uploaded_size_in_bytes, compressed).unwrap_or(0),
            (_, None) => 0,
        }
    }

    /// How much smaller the compressed payload is, in percent of the original.
    /// Negative when compression grew the file.
    pub fn savings_percentage(&self) -> Option<i64> {
        let compressed = self.compressed_size_in_bytes?;
        if self.original_size_in_bytes == 0 {
            return None;
        }

        let saved = self.original_size_in_bytes as f64 - compressed as f64;
        Some((saved * 100.0 / self.original_size_in_bytes as f64).round() as i64)
    }

    pub fn can_cancel(&self) -> bool {
        self.status == UploadStatus::Progress
    }

    pub fn can_retry(&self) -> bool {
        matches!(self.status, UploadStatus::Error | UploadStatus::Canceled)
    }
}

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 任务已添加
    Added {
        upload_id: UploadId,
        name: String,
        size: u64,
    },

    /// 状态变更（包括重试时回到 Progress）
    StateChanged {
        upload_id: UploadId,
        old_state: UploadStatus,
        new_state: UploadStatus,
    },

    /// 压缩完成
    Compressed {
        upload_id: UploadId,
        original_size: u64,
        compressed_size: u64,
    },

    /// 进度更新
    Progress {
        upload_id: UploadId,
        uploaded_bytes: u64,
        total_bytes: u64,
    },

    /// 任务完成
    Completed {
        upload_id: UploadId,
        remote_url: String,
    },

    /// 任务失败或取消
    Failed {
        upload_id: UploadId,
        error: UploadError,
    },
}

impl UploadEvent {
    pub fn upload_id(&self) -> UploadId {
        match self {
            UploadEvent::Added { upload_id, .. }
            | UploadEvent::StateChanged { upload_id, .. }
            | UploadEvent::Compressed { upload_id, .. }
            | UploadEvent::Progress { upload_id, .. }
            | UploadEvent::Completed { upload_id, .. }
            | UploadEvent::Failed { upload_id, .. } => *upload_id,
        }
    }
}

/// 上传管理器命令
pub(crate) enum ManagerCommand {
    /// 批量添加
    AddUploads {
        files: Vec<FileHandle>,
        reply: oneshot::Sender<Vec<UploadId>>,
    },

    /// 取消
    CancelUpload {
        upload_id: UploadId,
        reply: oneshot::Sender<()>,
    },

    /// 取消所有
    CancelAll {
        reply: oneshot::Sender<usize>,
    },

    /// 重试
    RetryUpload {
        upload_id: UploadId,
        reply: oneshot::Sender<()>,
    },
}

/// Pipeline → worker report, tagged with the attempt it belongs to.
#[derive(Debug)]
pub(crate) struct PatchMessage {
    pub upload_id: UploadId,
    pub attempt: u32,
    pub patch: super::store::UploadPatch,
}

pub(crate) type CommandResult<T> = Result<T, ManagerError>;

// 静态断言确保类型是 Send 的
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn assert_types() {
        assert_send::<Upload>();
        assert_send::<UploadEvent>();
        assert_send::<PatchMessage>();
    }
};
