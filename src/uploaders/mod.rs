pub mod multipart;
pub mod progress_stream;

pub use multipart::{MultipartConfig, MultipartUploader};
pub use progress_stream::ProgressStream;
