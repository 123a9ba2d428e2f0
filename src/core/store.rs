use std::collections::HashMap;
use chrono::Utc;
use super::errors::UploadError;
use super::types::{Upload, UploadEvent, UploadId, UploadStatus};

/// Partial update reported by a running attempt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UploadPatch {
    Compressed { size: u64 },
    Progress { uploaded: u64 },
    Succeeded { remote_url: String },
    Failed { error: UploadError },
}

/// Ordered upload collection. Only the manager worker holds one.
#[derive(Debug, Default)]
pub(crate) struct UploadStore {
    uploads: HashMap<UploadId, Upload>,
    order: Vec<UploadId>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, upload: Upload) {
        let id = upload.id;
        if self.uploads.insert(id, upload).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &UploadId) -> Option<&Upload> {
        self.uploads.get(id)
    }

    /// Uploads in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Upload> + '_ {
        self.order.iter().filter_map(|id| self.uploads.get(id))
    }

    pub fn snapshot(&self) -> Vec<Upload> {
        self.iter().cloned().collect()
    }

    /// Resets the transient fields and opens a new attempt.
    ///
    /// Returns the new attempt number and the status the upload left, or
    /// `None` for an unknown id.
    pub fn begin_attempt(&mut self, id: &UploadId) -> Option<(u32, UploadStatus)> {
        let upload = self.uploads.get_mut(id)?;
        let old_state = upload.status;

        upload.attempt += 1;
        upload.status = UploadStatus::Progress;
        upload.compressed_size_in_bytes = None;
        upload.uploaded_size_in_bytes = 0;
        upload.remote_url = None;
        upload.error = None;
        upload.in_flight = true;
        upload.settled_at = None;

        Some((upload.attempt, old_state))
    }

    /// Read-merge-write of one patch.
    ///
    /// Returns `None` when the patch is dropped: unknown id, superseded attempt,
    /// or an attempt that already settled.
    pub(crate) fn apply(&mut self, id: &UploadId, attempt: u32, patch: UploadPatch) -> Option<Vec<UploadEvent>> {
        let upload = self.uploads.get_mut(id)?;
        if upload.attempt != attempt || upload.status.is_terminal() {
            return None;
        }

        let upload_id = *id;
        let events = match patch {
            UploadPatch::Compressed { size } => {
                upload.compressed_size_in_bytes = Some(size);
                vec![UploadEvent::Compressed {
                    upload_id,
                    original_size: upload.original_size_in_bytes,
                    compressed_size: size,
                }]
            }
            UploadPatch::Progress { uploaded } => {
                // 同一次尝试内只增不减
                if uploaded <= upload.uploaded_size_in_bytes {
                    return Some(Vec::new());
                }
                upload.uploaded_size_in_bytes = uploaded;
                vec![UploadEvent::Progress {
                    upload_id,
                    uploaded_bytes: uploaded,
                    total_bytes: upload
                        .compressed_size_in_bytes
                        .unwrap_or(upload.original_size_in_bytes),
                }]
            }
            UploadPatch::Succeeded { remote_url } => {
                upload.remote_url = Some(remote_url.clone());
                Self::settle(upload, UploadStatus::Success);
                vec![
                    UploadEvent::StateChanged {
                        upload_id,
                        old_state: UploadStatus::Progress,
                        new_state: UploadStatus::Success,
                    },
                    UploadEvent::Completed { upload_id, remote_url },
                ]
            }
            UploadPatch::Failed { error } => {
                let new_state = if error.is_canceled() {
                    UploadStatus::Canceled
                } else {
                    UploadStatus::Error
                };
                upload.error = Some(error.to_string());
                Self::settle(upload, new_state);
                vec![
                    UploadEvent::StateChanged {
                        upload_id,
                        old_state: UploadStatus::Progress,
                        new_state,
                    },
                    UploadEvent::Failed { upload_id, error },
                ]
            }
        };

        Some(events)
    }

    fn settle(upload: &mut Upload, status: UploadStatus) {
        upload.status = status;
        upload.in_flight = false;
        upload.settled_at = Some(Utc::now());
    }
}
