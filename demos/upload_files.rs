use clap::Parser;
use dotenvy::dotenv;
use presigned_uploader::config::{SigningConfig, UploaderConfig};
use presigned_uploader::infrastructure::signing::setup_orchestrator;
use presigned_uploader::models::FileHandle;
use presigned_uploader::services::orchestrator::Admission;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upload local files to the configured bucket through presigned URLs
#[derive(Parser, Debug)]
struct Args {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Key prefix (overrides UPLOAD_PATH_PREFIX)
    #[arg(short, long)]
    prefix: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presigned_uploader=info,upload_files=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = UploaderConfig::from_env();
    if args.files.len() > 1 {
        config = config.with_multiple(true);
    }
    if let Some(prefix) = args.prefix {
        config = config.with_prefix(prefix);
    }
    let signing = SigningConfig::from_env()?;

    info!(
        "🚀 Uploading {} file(s) to {} under '{}'",
        args.files.len(),
        signing.bucket,
        config.destination_path_prefix
    );

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(FileHandle::from_path(path).await?);
    }

    let uploader = setup_orchestrator(&signing, config).await?;
    for admission in uploader.admit(files) {
        if let Admission::Rejected { file_name, error } = admission {
            tracing::warn!("Skipped {}: {}", file_name, error);
        }
    }

    let mut updates = uploader.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();
            for record in &view.records {
                info!(
                    "{:>6.1}% {:?} {}",
                    record.progress, record.state, record.file_name
                );
            }
        }
    });

    tokio::select! {
        _ = uploader.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("⌨️  Ctrl+C received, cancelling uploads...");
            uploader.cancel_all();
        }
    }
    watcher.abort();

    for record in uploader.snapshot() {
        if record.is_completed() {
            info!("✅ {} -> {}", record.file_name, record.destination_key);
        } else {
            let reason = record
                .failure
                .map(|f| f.message)
                .unwrap_or_else(|| format!("{:?}", record.state));
            tracing::error!("❌ {}: {}", record.file_name, reason);
        }
    }

    Ok(())
}
