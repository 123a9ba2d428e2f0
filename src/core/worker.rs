use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use super::errors::Result;
use super::store::UploadPatch;
use super::traits::{Compressor, ProgressCallback, Transport};
use super::types::{CompressionOptions, FileHandle, PatchMessage, UploadId};

/// Runs one attempt: compress, then transmit.
pub(crate) struct UploadWorker {
    pub(crate) upload_id: UploadId,
    pub(crate) attempt: u32,
    pub(crate) source: FileHandle,
    pub(crate) options: CompressionOptions,
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) patch_tx: mpsc::UnboundedSender<PatchMessage>,
}

impl UploadWorker {
    pub async fn run(self) {
        let patch = match self.execute().await {
            Ok(remote_url) => UploadPatch::Succeeded { remote_url },
            Err(error) => {
                warn!(upload_id = %self.upload_id, attempt = self.attempt, %error, "upload attempt failed");
                UploadPatch::Failed { error }
            }
        };

        self.report(patch);
    }

    async fn execute(&self) -> Result<String> {
        // 压缩不响应取消，取消由传输层处理
        let compressed = self.compressor.compress(&self.source, &self.options).await?;
        debug!(
            upload_id = %self.upload_id,
            original = self.source.size(),
            compressed = compressed.size(),
            "compressed"
        );
        self.report(UploadPatch::Compressed { size: compressed.size() });

        let on_progress: ProgressCallback = {
            let patch_tx = self.patch_tx.clone();
            let upload_id = self.upload_id;
            let attempt = self.attempt;
            Arc::new(move |uploaded| {
                let _ = patch_tx.send(PatchMessage {
                    upload_id,
                    attempt,
                    patch: UploadPatch::Progress { uploaded },
                });
            })
        };

        let remote = self.transport
            .upload(compressed, on_progress, self.cancellation_token.clone())
            .await?;

        Ok(remote.url)
    }

    fn report(&self, patch: UploadPatch) {
        let _ = self.patch_tx.send(PatchMessage {
            upload_id: self.upload_id,
            attempt: self.attempt,
            patch,
        });
    }
}
