use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use pixdrop::config::{Config, DEFAULT_CONFIG_PATH};
use pixdrop::utils::format_size;
use pixdrop::{
    FileHandle,
    ImageCompressor,
    MultipartUploader,
    Upload,
    UploadEvent,
    UploadManager,
    UploadSnapshot,
    UploadStatus,
};

/// Compress images and upload them with live progress.
#[derive(Parser, Debug)]
#[command(name = "pixdrop", version, about)]
struct Args {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the upload endpoint
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Override the compression quality (0.0 - 1.0)
    #[arg(short, long)]
    quality: Option<f32>,

    /// Print the final records as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("PIXDROP_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = FileHandle::from_path(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(file);
    }

    let transport = MultipartUploader::new(&config.endpoint, config.multipart_config())
        .context("failed to build HTTP client")?;
    let endpoint = transport.endpoint().to_string();
    let handle = UploadManager::new(ImageCompressor::new(), transport, config.manager_config());
    let manager = handle.manager.clone();

    let reporter = tokio::spawn(report_events(manager.subscribe_events(), manager.watch()));

    let ids = manager.add_uploads(files).await?;
    info!(count = ids.len(), %endpoint, "uploading");

    let snapshot = tokio::select! {
        snapshot = manager.wait_until_settled() => snapshot?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, canceling uploads");
            let canceled = manager.cancel_all().await?;
            debug!(canceled, "cancellation requested");
            manager.wait_until_settled().await?
        }
    };

    drop(manager);
    handle.shutdown().await?;
    let _ = reporter.await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.uploads)?);
    } else {
        print_summary(&snapshot);
    }

    let failed = snapshot
        .uploads
        .iter()
        .filter(|upload| upload.status != UploadStatus::Success)
        .count();
    if failed > 0 {
        bail!("{} of {} uploads did not succeed", failed, snapshot.uploads.len());
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to load {}", DEFAULT_CONFIG_PATH))?,
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(quality) = args.quality {
        config.compression.quality = quality;
    }
    config.validate()?;

    Ok(config)
}

async fn report_events(mut events: broadcast::Receiver<UploadEvent>, snapshot: watch::Receiver<UploadSnapshot>) {
    let mut last_percentage = None;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event reporter lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            UploadEvent::Added { upload_id, name, size } => {
                debug!(%upload_id, %name, size = %format_size(size), "queued");
            }
            UploadEvent::Compressed { upload_id, original_size, compressed_size } => {
                info!(
                    %upload_id,
                    from = %format_size(original_size),
                    to = %format_size(compressed_size),
                    "compressed"
                );
            }
            UploadEvent::Progress { .. } => {
                let progress = snapshot.borrow().progress;
                if last_percentage != Some(progress.global_percentage) {
                    last_percentage = Some(progress.global_percentage);
                    info!(
                        percentage = progress.global_percentage,
                        uploaded = %format_size(progress.total_uploaded_bytes),
                        total = %format_size(progress.total_expected_bytes),
                        "progress"
                    );
                }
            }
            UploadEvent::Completed { upload_id, remote_url } => {
                info!(%upload_id, url = %remote_url, "uploaded");
            }
            UploadEvent::Failed { upload_id, error } => {
                warn!(%upload_id, %error, "upload failed");
            }
            UploadEvent::StateChanged { .. } => {}
        }
    }
}

fn print_summary(snapshot: &UploadSnapshot) {
    for upload in &snapshot.uploads {
        println!("{}", summary_line(upload));
    }
}

fn summary_line(upload: &Upload) -> String {
    let sizes = match upload.compressed_size_in_bytes {
        Some(compressed) => format!(
            "{} -> {} ({}% smaller)",
            format_size(upload.original_size_in_bytes),
            format_size(compressed),
            upload.savings_percentage().unwrap_or_default()
        ),
        None => format_size(upload.original_size_in_bytes),
    };

    let outcome = match upload.status {
        UploadStatus::Success => upload.remote_url.clone().unwrap_or_default(),
        _ => upload.error.clone().unwrap_or_default(),
    };

    format!("{:<9} {:<32} {:<40} {}", upload.status.to_string(), upload.name, sizes, outcome)
}
