use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use super::errors::Result;
use super::types::{CompressionOptions, FileHandle, RemoteObject};

/// Called with the cumulative number of bytes sent so far.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// 压缩器 - 把原始文件转换成待上传的文件
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Produces a new file; the input is left untouched.
    ///
    /// Fails with `UnsupportedFormat` or `EncodingFailure`.
    async fn compress(&self, file: &FileHandle, options: &CompressionOptions) -> Result<FileHandle>;
}

/// 传输层 - 把文件发送到远端存储
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `file`, reporting progress through `on_progress`.
    ///
    /// Fails with `Canceled` once `cancellation_token` fires, and with
    /// `TransportFailure` for anything else.
    async fn upload(
        &self,
        file: FileHandle,
        on_progress: ProgressCallback,
        cancellation_token: CancellationToken,
    ) -> Result<RemoteObject>;
}
