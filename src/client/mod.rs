//! Client for the slide management service.
//!
//! [`TransferApi`] is the seam between the transfer engines and the service:
//! the orchestrator and download engine only talk to the trait, and
//! [`CoreClient`] implements it over HTTP.

mod api;
mod core_client;
pub mod models;

pub use api::{RemoteFile, RemoteStream, TransferApi, UploadStatus};
pub use core_client::CoreClient;

use crate::error::TransferError;
use models::error_message;

/// Turn a non-2xx response into [`TransferError::Protocol`].
pub(crate) async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransferError::Protocol {
        operation,
        status: status.as_u16(),
        message: error_message(&body),
    })
}
