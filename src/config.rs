//! Configuration management for WSI Transfer.
//!
//! This module provides the CLI and configuration types:
//! - Command-line arguments via clap
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_transfer::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Upload(config) => println!("Uploading {}", config.slide_path.display()),
//!     Command::Download(config) => println!("Downloading {}", config.slide_ref),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_SERVER_URL` - Base URL of the slide management service (required)
//! - `WSI_SESSION_ID` - Session id obtained from the service (required)
//! - `WSI_TIMEOUT_SECS` - Per-request timeout, 0 disables (default: 0)
//! - `WSI_READ_CHUNK_SIZE` - Local read granularity for uploads (default: 64KB)
//! - `WSI_BLOCK_SIZE` - Azure block size (default: 4MB)
//! - `WSI_PART_CONCURRENCY` - S3 part PUTs in flight per file (default: 1)
//! - `WSI_PRESIGNED_BUFFER_LIMIT` - Largest file buffered for a single PUT (default: 5GB)
//! - `WSI_DOWNLOAD_CHUNK_SIZE` - Write granularity for downloads (default: 10KB)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::download::{DownloadOptions, DEFAULT_DOWNLOAD_CHUNK_SIZE};
use crate::upload::{
    TransferOptions, DEFAULT_BLOCK_SIZE, DEFAULT_PART_CONCURRENCY, DEFAULT_PRESIGNED_BUFFER_LIMIT,
    DEFAULT_READ_CHUNK_SIZE,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-request timeout in seconds (0 = no timeout).
pub const DEFAULT_TIMEOUT_SECS: u64 = 0;

/// Smallest accepted Azure block size.
const MIN_BLOCK_SIZE: usize = 64 * 1024;

/// Azure rejects staged blocks above 4000 MiB.
const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Transfer - bulk upload and download of multi-file Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-transfer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Upload a local slide (and its companion files) to a server directory.
    Upload(UploadConfig),

    /// Download every file of a remote slide into a local directory.
    Download(DownloadConfig),
}

/// Connection settings shared by all subcommands.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Base URL of the slide management service.
    #[arg(long, env = "WSI_SERVER_URL")]
    pub server_url: Option<String>,

    /// Session id of an authenticated session on the service.
    #[arg(long, env = "WSI_SESSION_ID", hide_env_values = true)]
    pub session_id: Option<String>,

    /// Per-request timeout in seconds (0 disables the timeout).
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "WSI_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Do not print per-file progress.
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}

impl ConnectionArgs {
    /// Request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Configuration for the `upload` subcommand.
#[derive(Args, Debug, Clone)]
pub struct UploadConfig {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Main file of the slide to upload (e.g. `slide.mrxs`, `slide.svs`).
    pub slide_path: PathBuf,

    /// Target directory on the server (e.g. `Amazon_S3/incoming`).
    #[arg(long = "to", env = "WSI_UPLOAD_DIRECTORY")]
    pub upload_directory: Option<String>,

    /// Local read granularity in bytes; one progress event per read.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE, env = "WSI_READ_CHUNK_SIZE")]
    pub read_chunk_size: usize,

    /// Block size in bytes for Azure block blob uploads.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "WSI_BLOCK_SIZE")]
    pub block_size: usize,

    /// Number of S3 part uploads allowed in flight for one file.
    #[arg(long, default_value_t = DEFAULT_PART_CONCURRENCY, env = "WSI_PART_CONCURRENCY")]
    pub part_concurrency: usize,

    /// Largest file, in bytes, buffered in memory for a single presigned PUT.
    #[arg(long, default_value_t = DEFAULT_PRESIGNED_BUFFER_LIMIT, env = "WSI_PRESIGNED_BUFFER_LIMIT")]
    pub presigned_buffer_limit: u64,
}

impl UploadConfig {
    /// Validate the tuning options and return an error message if invalid.
    ///
    /// Required inputs (server URL, session, paths) are checked by the upload
    /// validation layer so the messages match the library API.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_chunk_size == 0 {
            return Err("read_chunk_size must be greater than 0".to_string());
        }

        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 64KB and 4000MB".to_string());
        }

        if self.part_concurrency == 0 {
            return Err("part_concurrency must be greater than 0".to_string());
        }

        if self.presigned_buffer_limit == 0 {
            return Err("presigned_buffer_limit must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Build the transfer options for the orchestrator.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            read_chunk_size: self.read_chunk_size,
            block_size: self.block_size,
            part_concurrency: self.part_concurrency,
            presigned_buffer_limit: self.presigned_buffer_limit,
        }
    }
}

/// Configuration for the `download` subcommand.
#[derive(Args, Debug, Clone)]
pub struct DownloadConfig {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Virtual path of the slide on the server.
    pub slide_ref: String,

    /// Local directory to write the slide's files into.
    #[arg(long = "into", default_value = ".")]
    pub save_directory: PathBuf,

    /// Write granularity in bytes.
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_CHUNK_SIZE, env = "WSI_DOWNLOAD_CHUNK_SIZE")]
    pub chunk_size: usize,
}

impl DownloadConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Build the download engine options.
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            chunk_size: self.chunk_size,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
