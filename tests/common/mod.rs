#![allow(dead_code)]

use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use pixdrop::core::ProgressCallback;
use pixdrop::{
    CompressionOptions,
    Compressor,
    FileHandle,
    RemoteObject,
    Result,
    Transport,
    UploadError,
    UploadManager,
    UploadSnapshot,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn png(name: &str, size: usize) -> FileHandle {
    FileHandle::new(name, "image/png", vec![0u8; size])
}

pub fn webp(name: &str, size: usize) -> FileHandle {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    FileHandle::new(format!("{}.webp", stem), "image/webp", vec![0u8; size])
}

/// Waits until a published snapshot satisfies `predicate`.
pub async fn wait_for<F>(manager: &UploadManager, predicate: F) -> UploadSnapshot
where
    F: FnMut(&UploadSnapshot) -> bool,
{
    let mut rx = manager.watch();
    let snapshot = tokio::time::timeout(TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("manager stopped");
    snapshot.clone()
}

/// Compressor that shrinks every file to `ratio` of its size right away.
pub struct RatioCompressor(pub f64);

#[async_trait]
impl Compressor for RatioCompressor {
    async fn compress(&self, file: &FileHandle, _options: &CompressionOptions) -> Result<FileHandle> {
        let size = (file.size() as f64 * self.0).round() as usize;
        Ok(webp(&file.name, size))
    }
}

/// One pending compression, answered by the test.
pub struct CompressCall {
    pub name: String,
    pub size: u64,
    respond: oneshot::Sender<Result<FileHandle>>,
}

impl CompressCall {
    pub fn compress_to(self, size: usize) {
        let output = webp(&self.name, size);
        let _ = self.respond.send(Ok(output));
    }

    pub fn fail(self, error: UploadError) {
        let _ = self.respond.send(Err(error));
    }
}

/// Compressor that hands every call to the test through a channel.
pub struct ScriptedCompressor {
    calls: mpsc::UnboundedSender<CompressCall>,
}

impl ScriptedCompressor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompressCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }
}

#[async_trait]
impl Compressor for ScriptedCompressor {
    async fn compress(&self, file: &FileHandle, _options: &CompressionOptions) -> Result<FileHandle> {
        let (respond, response) = oneshot::channel();
        self.calls
            .send(CompressCall {
                name: file.name.clone(),
                size: file.size(),
                respond,
            })
            .map_err(|_| UploadError::encoding_failure("test finished"))?;

        response
            .await
            .unwrap_or_else(|_| Err(UploadError::encoding_failure("call dropped")))
    }
}

/// One pending transmission, driven by the test.
pub struct TransportCall {
    pub name: String,
    pub size: u64,
    pub on_progress: ProgressCallback,
    pub cancellation_token: CancellationToken,
    respond: oneshot::Sender<Result<RemoteObject>>,
}

impl TransportCall {
    pub fn progress(&self, uploaded: u64) {
        (self.on_progress)(uploaded);
    }

    pub fn succeed(self, url: &str) {
        let _ = self.respond.send(Ok(RemoteObject { url: url.to_string() }));
    }

    pub fn fail(self, error: UploadError) {
        let _ = self.respond.send(Err(error));
    }
}

/// Transport that hands every call to the test and honors cancellation.
pub struct ScriptedTransport {
    calls: mpsc::UnboundedSender<TransportCall>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(
        &self,
        file: FileHandle,
        on_progress: ProgressCallback,
        cancellation_token: CancellationToken,
    ) -> Result<RemoteObject> {
        let (respond, response) = oneshot::channel();
        self.calls
            .send(TransportCall {
                name: file.name.clone(),
                size: file.size(),
                on_progress,
                cancellation_token: cancellation_token.clone(),
                respond,
            })
            .map_err(|_| UploadError::transport_failure("test finished"))?;

        tokio::select! {
            _ = cancellation_token.cancelled() => Err(UploadError::Canceled),
            result = response => result.unwrap_or_else(|_| Err(UploadError::transport_failure("call dropped"))),
        }
    }
}

pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for call")
        .expect("channel closed")
}
