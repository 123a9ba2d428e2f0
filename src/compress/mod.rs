//! Image recompression on top of the `image` crate.

use std::io::Cursor;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;
use crate::core::{CompressionOptions, Compressor, FileHandle, OutputFormat, Result, UploadError};

/// Downscales and re-encodes raster images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCompressor;

impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compressor for ImageCompressor {
    async fn compress(&self, file: &FileHandle, options: &CompressionOptions) -> Result<FileHandle> {
        let input_format = input_format(&file.media_type)?;
        let source = file.clone();
        let options = options.clone();

        // 解码和编码都是 CPU 密集型，放到阻塞线程池
        tokio::task::spawn_blocking(move || compress_blocking(&source, input_format, &options))
            .await
            .map_err(|err| UploadError::encoding_failure(format!("compression task failed: {}", err)))?
    }
}

/// Allow-list of input media types.
fn input_format(media_type: &str) -> Result<ImageFormat> {
    match media_type.to_ascii_lowercase().as_str() {
        "image/jpg" | "image/jpeg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        "image/webp" => Ok(ImageFormat::WebP),
        _ => Err(UploadError::UnsupportedFormat(media_type.to_string())),
    }
}

fn compress_blocking(file: &FileHandle, input_format: ImageFormat, options: &CompressionOptions) -> Result<FileHandle> {
    let img = image::load_from_memory_with_format(&file.data, input_format)
        .map_err(|err| UploadError::encoding_failure(format!("failed to decode {}: {}", file.name, err)))?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(UploadError::encoding_failure("image has no pixels"));
    }

    let (target_width, target_height) = fit_within(width, height, options.max_width, options.max_height);
    let img = if (target_width, target_height) != (width, height) {
        img.resize_exact(target_width, target_height, FilterType::Lanczos3)
    } else {
        img
    };

    let data = encode(&img, options)?;
    if data.is_empty() {
        return Err(UploadError::encoding_failure("encoder produced no data"));
    }

    debug!(
        name = %file.name,
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", target_width, target_height),
        bytes = data.len(),
        "re-encoded image"
    );

    Ok(FileHandle::new(
        replace_extension(&file.name, options.format.extension()),
        options.format.media_type(),
        data,
    ))
}

fn encode(img: &DynamicImage, options: &CompressionOptions) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let encoded = match options.format {
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(options.quality)))
        }
    };
    encoded.map_err(|err| UploadError::encoding_failure(format!("failed to encode: {}", err)))?;

    Ok(buffer.into_inner())
}

/// Maps a 0..=1 quality factor onto the JPEG 1..=100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

/// Largest size with the same aspect ratio that fits the bounds. Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );

    let scaled = |value: u32| ((value as f64 * scale).round() as u32).max(1);
    (scaled(width).min(max_width.max(1)), scaled(height).min(max_height.max(1)))
}

/// `photo.png` → `photo.webp`; `photo` → `photo.webp`.
pub fn replace_extension(name: &str, extension: &str) -> String {
    match name.rfind('.') {
        Some(index) => format!("{}.{}", &name[..index], extension),
        None => format!("{}.{}", name, extension),
    }
}
