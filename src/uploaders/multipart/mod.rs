use std::time::Duration;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::core::{FileHandle, ProgressCallback, RemoteObject, Result, Transport, UploadError};
use super::progress_stream::{chunked, ProgressStream};

/// Form field carrying the file.
pub const FILE_FIELD: &str = "file";

/// HTTP 上传配置
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// 整个请求的超时时间
    pub timeout: Duration,

    /// 进度回调的粒度
    pub chunk_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            chunk_size: 64 * 1024,
        }
    }
}

/// Sends each file as a single `multipart/form-data` POST and expects a JSON
/// body of the form `{"url": "..."}` back.
pub struct MultipartUploader {
    client: Client,
    endpoint: String,
    config: MultipartConfig,
}

impl MultipartUploader {
    pub fn new(endpoint: &str, config: MultipartConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, file: FileHandle, on_progress: ProgressCallback) -> Result<RemoteObject> {
        let total = file.size();
        let stream = ProgressStream::new(
            futures::stream::iter(chunked(&file.data, self.config.chunk_size)),
            on_progress,
        );

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file.name.clone())
            .mime_str(&file.media_type)?;
        let form = Form::new().part(FILE_FIELD, part);

        let response = self.client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::transport_failure(format!(
                "Upload of {} failed with status {}",
                file.name, status
            )));
        }

        let remote: RemoteObject = response.json().await?;
        debug!(name = %file.name, url = %remote.url, bytes = total, "storage accepted file");

        Ok(remote)
    }
}

#[async_trait]
impl Transport for MultipartUploader {
    async fn upload(
        &self,
        file: FileHandle,
        on_progress: ProgressCallback,
        cancellation_token: CancellationToken,
    ) -> Result<RemoteObject> {
        if cancellation_token.is_cancelled() {
            return Err(UploadError::Canceled);
        }

        // 取消时直接丢弃请求 future，连接随之中断
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => Err(UploadError::Canceled),
            result = self.send(file, on_progress) => result,
        }
    }
}
