//! WSI Transfer - bulk upload and download of Whole Slide Images.
//!
//! This binary parses the command line, wires up logging and runs one
//! transfer.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_transfer::{
    config::{Cli, Command, ConnectionArgs, DownloadConfig, UploadConfig},
    ConsoleProgress, CoreClient, DownloadEngine, NoProgress, ProgressSink, SessionContext,
    TransferOrchestrator, TransferOutcome, UploadRequest,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Upload(config) => run_upload(config).await,
        Command::Download(config) => run_download(config).await,
    }
}

// =============================================================================
// Upload Command
// =============================================================================

async fn run_upload(config: UploadConfig) -> ExitCode {
    init_logging(config.connection.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let request = UploadRequest {
        server_url: config.connection.server_url.clone(),
        session_id: config.connection.session_id.clone(),
        slide_path: config.slide_path.clone(),
        upload_directory: config.upload_directory.clone(),
    };
    let validated = match request.validate().await {
        Ok(v) => v,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = match session(&config.connection, validated.server_url.as_str()) {
        Some(ctx) => ctx,
        None => return ExitCode::FAILURE,
    };

    info!(
        "Uploading {} to {} on {}",
        validated.slide_path.display(),
        validated.upload_directory,
        validated.server_url
    );

    let outcome = TransferOrchestrator::new(CoreClient::new(ctx.clone()), ctx)
        .with_options(config.transfer_options())
        .with_progress(progress_sink(&config.connection))
        .upload(&validated)
        .await;

    match outcome {
        TransferOutcome::Completed(report) => {
            info!(
                "Uploaded {} files ({} bytes) as transfer {}",
                report.files.len(),
                report.total_bytes(),
                report.transfer_id
            );
            ExitCode::SUCCESS
        }
        TransferOutcome::Failed { error, state } => {
            error!("Upload failed while {}: {}", state, error);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Download Command
// =============================================================================

async fn run_download(config: DownloadConfig) -> ExitCode {
    init_logging(config.connection.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let server_url = match config.connection.server_url.as_deref() {
        Some(url) => url,
        None => {
            error!("server_url is required");
            return ExitCode::FAILURE;
        }
    };
    let ctx = match session(&config.connection, server_url) {
        Some(ctx) => ctx,
        None => return ExitCode::FAILURE,
    };

    let engine = DownloadEngine::new(CoreClient::new(ctx))
        .with_options(config.download_options())
        .with_progress(progress_sink(&config.connection));

    match engine
        .download(&config.slide_ref, &config.save_directory)
        .await
    {
        Ok(report) => {
            info!(
                "Downloaded {} files ({} bytes) into {}",
                report.files.len(),
                report.total_bytes(),
                config.save_directory.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Download failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Build the session context and cancel it on Ctrl-C.
fn session(connection: &ConnectionArgs, server_url: &str) -> Option<SessionContext> {
    let session_id = match connection.session_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            error!("session_id is required");
            return None;
        }
    };

    let ctx = match SessionContext::with_timeout(
        server_url,
        session_id,
        connection.request_timeout(),
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{}", e);
            return None;
        }
    };

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling transfer");
            on_signal.cancel();
        }
    });

    Some(ctx.with_cancellation(token))
}

fn progress_sink(connection: &ConnectionArgs) -> Arc<dyn ProgressSink> {
    if connection.quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(ConsoleProgress::new())
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_transfer=debug"
    } else {
        "wsi_transfer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
