// Main entry point for the receipt-print-client service.
// Parses configuration, prepares the upload directory and the printer client,
// configures the Axum router, and starts the HTTP server.

mod job_store;
mod models;
mod printer_client;
mod shutdown_signal;
mod web;

use clap::Parser;
use job_store::InMemoryJobStore;
use printer_client::{PrinterClient, PrinterConfig};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

/// Command line arguments for receipt-print-client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// "*" listens on all interfaces.
    #[arg(long, env = "PRINT_CLIENT_HOST", default_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "PRINT_CLIENT_PORT", default_value_t = 3000)]
    port: u16,

    /// Base URL of the printer API.
    #[arg(long, env = "API_HOST", default_value = "http://printer-api:8080")]
    api_host: String,

    /// Path(s) under the API host that receive print uploads.
    /// When several are given, each print request picks one at random.
    #[arg(
        long = "print-endpoint",
        env = "PRINT_ENDPOINTS",
        value_delimiter = ',',
        default_value = "/"
    )]
    print_endpoints: Vec<String>,

    /// Timeout in seconds for a single call to the printer API.
    #[arg(long, env = "PRINTER_TIMEOUT_SECS", default_value_t = 30)]
    printer_timeout_secs: u64,

    /// Directory uploaded images are written to.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory holding the bundled front-end.
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,
}

impl AppConfig {
    fn printer_config(&self) -> PrinterConfig {
        let mut printer = PrinterConfig::new(self.api_host.clone());
        if !self.print_endpoints.is_empty() {
            printer.endpoints = self.print_endpoints.clone();
        }
        printer.timeout = Duration::from_secs(self.printer_timeout_secs);
        printer
    }
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Initialize tracing subscriber for structured logging.
    // RUST_LOG overrides the default INFO level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true) // Include module path in logs
        .with_file(true) // Include source file name
        .with_line_number(true) // Include line numbers
        .init();

    tracing::info!("Starting receipt-print-client...");

    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        tracing::error!(
            "FATAL: Failed to create upload directory {}: {}",
            config.upload_dir.display(),
            e
        );
        std::process::exit(1);
    }
    tracing::info!("Upload directory set to: {}", config.upload_dir.display());

    let printer_config = config.printer_config();
    tracing::info!(
        "Printer API: {} (endpoints: {:?}, timeout: {}s)",
        printer_config.api_host,
        printer_config.endpoints,
        printer_config.timeout.as_secs()
    );
    let printer = PrinterClient::new(printer_config).unwrap_or_else(|err| {
        tracing::error!("FATAL: Failed to build HTTP client: {}", err);
        std::process::exit(1);
    });

    let state = web::AppState {
        jobs: Arc::new(InMemoryJobStore::new()),
        printer: Arc::new(printer),
        upload_dir: config.upload_dir.clone(),
    };

    let app = web::create_app(state, &config.static_dir);
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            std::process::exit(1);
        }
    };

    // Run the server.
    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal::shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
    }

    tracing::info!("receipt-print-client has shut down.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::try_parse_from(["receipt-print-client"]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));

        let printer = config.printer_config();
        assert_eq!(printer.endpoints, vec!["/".to_string()]);
        assert_eq!(printer.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_multiple_endpoints() {
        let config = AppConfig::try_parse_from([
            "receipt-print-client",
            "--api-host",
            "http://localhost:9100",
            "--print-endpoint",
            "/0,/1",
        ])
        .unwrap();
        assert_eq!(config.api_host, "http://localhost:9100");
        assert_eq!(config.print_endpoints, vec!["/0", "/1"]);
    }
}
