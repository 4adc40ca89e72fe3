// Web server module
// Handles the upload, print and status endpoints and serves the bundled front-end

mod app;
mod error;
mod handlers;
mod image_codec;
mod listeners;
mod models;
mod upload;

pub use app::create_app;
pub use listeners::create_listener;

use crate::job_store::SharedJobStore;
use crate::printer_client::PrinterClient;
use std::path::PathBuf;
use std::sync::Arc;

// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MiB

// Request body cap; leaves room so oversize uploads still get the 400 message
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * MAX_UPLOAD_BYTES;

#[derive(Clone)]
pub struct AppState {
    pub jobs: SharedJobStore,
    pub printer: Arc<PrinterClient>,
    pub upload_dir: PathBuf,
}
