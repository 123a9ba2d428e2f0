use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use super::errors::ManagerError;
use super::manager_worker::UploadManagerWorker;
use super::progress::{AggregateProgress, UploadSnapshot};
use super::traits::{Compressor, Transport};
use super::types::{CommandResult, CompressionOptions, FileHandle, ManagerCommand, Upload, UploadEvent, UploadId};

/// 上传管理器配置
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub compression: CompressionOptions,

    /// 事件缓存大小，慢订阅者超出后会收到 lagged
    pub event_capacity: usize,

    /// 命令通道大小
    pub command_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            compression: CompressionOptions::default(),
            event_capacity: 256,
            command_buffer: 100,
        }
    }
}

/// Front of the upload coordinator. Cheap to clone; every clone talks to the
/// same worker.
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
    snapshot_rx: watch::Receiver<UploadSnapshot>,
}

/// 上传管理器句柄 - 包含管理器和工作线程
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    /// Drops this manager and waits for the worker. In-flight attempts are
    /// canceled once the last manager clone is gone.
    pub async fn shutdown(self) -> CommandResult<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| ManagerError::WorkerPanic(err.to_string()))
    }
}

impl UploadManager {
    pub fn new<C, T>(compressor: C, transport: T, config: ManagerConfig) -> UploadManagerHandle
    where
        C: Compressor + 'static,
        T: Transport + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(UploadSnapshot::default());

        let worker_handle = tokio::spawn(UploadManagerWorker::run(
            Arc::new(compressor),
            Arc::new(transport),
            config.compression,
            command_rx,
            event_tx.clone(),
            snapshot_tx,
        ));

        let manager = Self {
            command_tx,
            event_tx,
            snapshot_rx,
        };

        UploadManagerHandle {
            manager,
            worker_handle,
        }
    }

    /// Submit files. Every file gets a record in `Progress` before any
    /// pipeline step runs; the returned ids follow the input order.
    pub async fn add_uploads(&self, files: Vec<FileHandle>) -> CommandResult<Vec<UploadId>> {
        self.request(|reply| ManagerCommand::AddUploads { files, reply }).await
    }

    /// Request cancellation of the attempt in flight. The upload reaches
    /// `Canceled` once the transport observes the signal.
    pub async fn cancel_upload(&self, upload_id: UploadId) -> CommandResult<()> {
        self.request(|reply| ManagerCommand::CancelUpload { upload_id, reply }).await
    }

    /// Request cancellation of every attempt in flight; returns how many were signaled.
    pub async fn cancel_all(&self) -> CommandResult<usize> {
        self.request(|reply| ManagerCommand::CancelAll { reply }).await
    }

    /// Restart the pipeline for `upload_id`.
    pub async fn retry_upload(&self, upload_id: UploadId) -> CommandResult<()> {
        self.request(|reply| ManagerCommand::RetryUpload { upload_id, reply }).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> UploadSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.snapshot_rx.borrow().uploads.clone()
    }

    pub fn get_upload(&self, upload_id: UploadId) -> Option<Upload> {
        self.snapshot_rx.borrow().get(&upload_id).cloned()
    }

    pub fn progress(&self) -> AggregateProgress {
        self.snapshot_rx.borrow().progress
    }

    /// Receiver notified after every mutation.
    pub fn watch(&self) -> watch::Receiver<UploadSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Resolves with the first snapshot that has nothing pending.
    pub async fn wait_until_settled(&self) -> CommandResult<UploadSnapshot> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|snapshot| !snapshot.progress.any_pending)
            .await
            .map_err(|_| ManagerError::Shutdown)?;

        Ok(snapshot.clone())
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 快照（`watch`）永远不会丢失最新状态
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> ManagerCommand) -> CommandResult<R> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| ManagerError::Shutdown)?;

        // 等待响应
        reply_rx.await.map_err(|_| ManagerError::Shutdown)
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
