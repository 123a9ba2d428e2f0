use serde::Serialize;
use super::types::Upload;

/// Aggregate view over every tracked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateProgress {
    pub any_pending: bool,
    pub global_percentage: u8,
    /// Σ compressed size, falling back to the original size until compression completes
    pub total_expected_bytes: u64,
    /// Σ uploaded size of uploads whose compression completed
    pub total_uploaded_bytes: u64,
}

impl Default for AggregateProgress {
    fn default() -> Self {
        Self {
            any_pending: false,
            global_percentage: 100,
            total_expected_bytes: 0,
            total_uploaded_bytes: 0,
        }
    }
}

/// What the manager publishes after every mutation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSnapshot {
    /// Insertion order
    pub uploads: Vec<Upload>,
    pub progress: AggregateProgress,
}

impl UploadSnapshot {
    pub fn new(uploads: Vec<Upload>) -> Self {
        let progress = aggregate(&uploads);
        Self { uploads, progress }
    }

    pub fn get(&self, upload_id: &super::types::UploadId) -> Option<&Upload> {
        self.uploads.iter().find(|upload| upload.id == *upload_id)
    }
}

/// `min(round(done * 100 / total), 100)`; `None` when `total` is zero.
pub fn percentage(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }

    let value = (done as f64 * 100.0 / total as f64).round();
    Some(value.min(100.0) as u8)
}

/// Computes the aggregate view.
///
/// Uploads still compressing count their original size in the denominator and
/// nothing in the numerator; the same holds for uploads whose compression
/// failed. A zero denominator while something is pending yields 0%.
/// A compressed size of `Some(0)` counts as known and replaces the original size.
pub fn aggregate<'a>(uploads: impl IntoIterator<Item = &'a Upload>) -> AggregateProgress {
    let mut any_pending = false;
    let mut total_expected_bytes = 0u64;
    let mut total_uploaded_bytes = 0u64;

    for upload in uploads {
        any_pending |= upload.status.is_pending();

        match upload.compressed_size_in_bytes {
            Some(compressed) => {
                total_expected_bytes += compressed;
                total_uploaded_bytes += upload.uploaded_size_in_bytes;
            }
            None => {
                total_expected_bytes += upload.original_size_in_bytes;
            }
        }
    }

    let global_percentage = if any_pending {
        percentage(total_uploaded_bytes, total_expected_bytes).unwrap_or(0)
    } else {
        100
    };

    AggregateProgress {
        any_pending,
        global_percentage,
        total_expected_bytes,
        total_uploaded_bytes,
    }
}
