use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use super::progress::UploadSnapshot;
use super::store::UploadStore;
use super::traits::{Compressor, Transport};
use super::types::{
    CompressionOptions, FileHandle, ManagerCommand, PatchMessage, Upload, UploadEvent, UploadId,
    UploadStatus,
};
use super::worker::UploadWorker;

/// Cancellation handle of the attempt currently in flight.
struct AttemptHandle {
    attempt: u32,
    cancellation_token: CancellationToken,
}

/// Owns the upload collection. Every mutation happens on this task, one
/// message at a time, followed by a publish.
pub(crate) struct UploadManagerWorker {
    store: UploadStore,
    attempts: HashMap<UploadId, AttemptHandle>,
    compressor: Arc<dyn Compressor>,
    transport: Arc<dyn Transport>,
    options: CompressionOptions,

    event_tx: broadcast::Sender<UploadEvent>,
    snapshot_tx: watch::Sender<UploadSnapshot>,
    patch_tx: mpsc::UnboundedSender<PatchMessage>,
    patch_rx: mpsc::UnboundedReceiver<PatchMessage>,
}

impl UploadManagerWorker {
    pub(crate) async fn run(
        compressor: Arc<dyn Compressor>,
        transport: Arc<dyn Transport>,
        options: CompressionOptions,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
        snapshot_tx: watch::Sender<UploadSnapshot>,
    ) {
        let (patch_tx, patch_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            store: UploadStore::new(),
            attempts: HashMap::new(),
            compressor,
            transport,
            options,
            event_tx,
            snapshot_tx,
            patch_tx,
            patch_rx,
        };

        // 主事件循环, 循环等待命令和任务上报
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command),
                    None => break,
                },
                Some(message) = worker.patch_rx.recv() => {
                    worker.handle_patch(message);
                }
            }
        }

        let canceled = worker.cancel_all();
        debug!(canceled, "upload manager worker stopped");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::AddUploads { files, reply } => {
                let ids = self.add_uploads(files);
                let _ = reply.send(ids);
            }
            ManagerCommand::CancelUpload { upload_id, reply } => {
                self.cancel_upload(upload_id);
                let _ = reply.send(());
            }
            ManagerCommand::CancelAll { reply } => {
                let _ = reply.send(self.cancel_all());
            }
            ManagerCommand::RetryUpload { upload_id, reply } => {
                self.process_upload(upload_id);
                let _ = reply.send(());
            }
        }
    }

    fn add_uploads(&mut self, files: Vec<FileHandle>) -> Vec<UploadId> {
        let mut added = Vec::with_capacity(files.len());

        for file in files {
            let upload = Upload::new(UploadId::new(), file);
            added.push(UploadEvent::Added {
                upload_id: upload.id,
                name: upload.name.clone(),
                size: upload.original_size_in_bytes,
            });
            self.store.insert(upload);
        }

        // 整批插入后再发布，观察者不会看到半批
        self.publish(added.iter().cloned());

        let ids: Vec<_> = added.iter().map(UploadEvent::upload_id).collect();
        for upload_id in &ids {
            self.process_upload(*upload_id);
        }

        ids
    }

    fn process_upload(&mut self, upload_id: UploadId) {
        if self.store.get(&upload_id).is_none() {
            debug!(%upload_id, "ignoring unknown upload");
            return;
        }

        // 同一上传同时只允许一个进行中的尝试
        if let Some(previous) = self.attempts.remove(&upload_id) {
            debug!(%upload_id, attempt = previous.attempt, "superseding attempt in flight");
            previous.cancellation_token.cancel();
        }

        let Some((attempt, old_state)) = self.store.begin_attempt(&upload_id) else {
            return;
        };
        let Some(source) = self.store.get(&upload_id).map(|upload| upload.source.clone()) else {
            return;
        };

        let cancellation_token = CancellationToken::new();
        self.attempts.insert(upload_id, AttemptHandle {
            attempt,
            cancellation_token: cancellation_token.clone(),
        });

        let events = (old_state != UploadStatus::Progress).then_some(UploadEvent::StateChanged {
            upload_id,
            old_state,
            new_state: UploadStatus::Progress,
        });
        self.publish(events);
        debug!(%upload_id, attempt, "starting attempt");

        let worker = UploadWorker {
            upload_id,
            attempt,
            source,
            options: self.options.clone(),
            compressor: self.compressor.clone(),
            transport: self.transport.clone(),
            cancellation_token,
            patch_tx: self.patch_tx.clone(),
        };
        tokio::spawn(worker.run());
    }

    fn cancel_upload(&mut self, upload_id: UploadId) {
        match self.attempts.get(&upload_id) {
            Some(handle) => {
                debug!(%upload_id, attempt = handle.attempt, "cancel requested");
                handle.cancellation_token.cancel();
            }
            None => debug!(%upload_id, "nothing in flight to cancel"),
        }
    }

    fn cancel_all(&mut self) -> usize {
        for handle in self.attempts.values() {
            handle.cancellation_token.cancel();
        }
        self.attempts.len()
    }

    fn handle_patch(&mut self, message: PatchMessage) {
        let PatchMessage { upload_id, attempt, patch } = message;

        let Some(events) = self.store.apply(&upload_id, attempt, patch) else {
            debug!(%upload_id, attempt, "dropping patch from settled or superseded attempt");
            return;
        };
        if events.is_empty() {
            return;
        }

        if let Some(upload) = self.store.get(&upload_id).filter(|upload| upload.status.is_terminal()) {
            if self.attempts.get(&upload_id).is_some_and(|handle| handle.attempt == attempt) {
                self.attempts.remove(&upload_id);
            }
            info!(
                %upload_id,
                name = %upload.name,
                status = %upload.status,
                attempt,
                remote_url = upload.remote_url.as_deref().unwrap_or(""),
                "upload settled"
            );
        }

        self.publish(events);
    }

    /// Publishes the current snapshot, then the events describing the change.
    fn publish(&self, events: impl IntoIterator<Item = UploadEvent>) {
        self.snapshot_tx.send_replace(UploadSnapshot::new(self.store.snapshot()));
        for event in events {
            let _ = self.event_tx.send(event);
        }
    }
}
