// Client for the external printer API.
// Posts image bytes as the multipart field `imgf` and classifies failures so the
// print handler can report them precisely.

use rand::seq::SliceRandom;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, info};

/// Multipart field name the printer API reads the image from.
pub const PRINTER_FIELD_NAME: &str = "imgf";

/// Longest slice of a non-200 response body carried into error messages.
pub const MAX_ERROR_BODY_CHARS: usize = 200;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Base URL, e.g. `http://printer-api:8080`.
    pub api_host: String,
    /// Paths under `api_host`. A single entry is always used; with several,
    /// each print request picks one at random.
    pub endpoints: Vec<String>,
    pub timeout: Duration,
}

impl PrinterConfig {
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            api_host: api_host.into(),
            endpoints: vec!["/".to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("Print service returned error: {status} - {body} (API host: {api_host})")]
    Rejected {
        status: u16,
        body: String,
        api_host: String,
    },
    #[error("Print service timed out after {secs}s (API host: {api_host})", secs = .timeout.as_secs())]
    Timeout { api_host: String, timeout: Duration },
    #[error("Connection refused by print service (API host: {api_host})")]
    ConnectionRefused { api_host: String },
    #[error("Failed to connect to print service (API host: {api_host}): {source}")]
    Transport {
        api_host: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct PrinterClient {
    http: Client,
    config: PrinterConfig,
}

impl PrinterClient {
    pub fn new(config: PrinterConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Resolves the URL for one forwarding attempt.
    pub fn endpoint_url(&self) -> String {
        let endpoint = if self.config.endpoints.len() > 1 {
            self.config
                .endpoints
                .choose(&mut rand::thread_rng())
                .map(String::as_str)
        } else {
            self.config.endpoints.first().map(String::as_str)
        }
        .unwrap_or("/");

        join_url(&self.config.api_host, endpoint)
    }

    /// Sends one image to the printer. Only a 200 response counts as success.
    pub async fn forward(
        &self,
        filename: &str,
        data: Vec<u8>,
        mime: &str,
    ) -> Result<(), PrintError> {
        let url = self.endpoint_url();
        info!("Forwarding {} ({} bytes) to {}", filename, data.len(), url);

        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|source| self.transport_error(source))?;
        let form = Form::new().part(PRINTER_FIELD_NAME, part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| self.classify(source))?;

        let status = response.status();
        if status == StatusCode::OK {
            debug!("Printer API accepted {}", filename);
            return Ok(());
        }

        // The body only decorates the error; a failed read leaves it empty.
        let body = response.text().await.unwrap_or_default();
        Err(PrintError::Rejected {
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            api_host: self.config.api_host.clone(),
        })
    }

    fn classify(&self, source: reqwest::Error) -> PrintError {
        if source.is_timeout() {
            return PrintError::Timeout {
                api_host: self.config.api_host.clone(),
                timeout: self.config.timeout,
            };
        }
        if source.is_connect() && is_connection_refused(&source) {
            return PrintError::ConnectionRefused {
                api_host: self.config.api_host.clone(),
            };
        }
        self.transport_error(source)
    }

    fn transport_error(&self, source: reqwest::Error) -> PrintError {
        PrintError::Transport {
            api_host: self.config.api_host.clone(),
            source,
        }
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut current = err.source();
    while let Some(cause) = current {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = cause.source();
    }
    false
}

fn join_url(api_host: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        api_host.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        Router,
        extract::{Multipart, State},
        http::StatusCode as AxumStatus,
        routing::post,
    };
    use std::sync::{Arc, Mutex};

    /// What a fake printer saw in the `imgf` field.
    #[derive(Debug, Clone)]
    pub struct ReceivedImage {
        pub path: String,
        pub filename: Option<String>,
        pub content_type: Option<String>,
        pub data: Vec<u8>,
    }

    pub type Received = Arc<Mutex<Vec<ReceivedImage>>>;

    /// Starts a throwaway printer API answering every POST with `status`.
    pub async fn spawn_fake_printer(status: u16, body: &'static str) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));

        async fn accept(
            State((received, status, body)): State<(Received, u16, &'static str)>,
            uri: axum::http::Uri,
            mut multipart: Multipart,
        ) -> (AxumStatus, &'static str) {
            while let Ok(Some(field)) = multipart.next_field().await {
                if field.name() == Some(PRINTER_FIELD_NAME) {
                    let filename = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.unwrap().to_vec();
                    received.lock().unwrap().push(ReceivedImage {
                        path: uri.path().to_string(),
                        filename,
                        content_type,
                        data,
                    });
                }
            }
            (AxumStatus::from_u16(status).unwrap(), body)
        }

        let app = Router::new()
            .route("/", post(accept))
            .route("/{endpoint}", post(accept))
            .with_state((received.clone(), status, body));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), received)
    }

    /// An address nothing listens on.
    pub async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn client_for(api_host: &str) -> PrinterClient {
        PrinterClient::new(PrinterConfig::new(api_host)).unwrap()
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://printer:8080", "/"), "http://printer:8080/");
        assert_eq!(join_url("http://printer:8080/", "/0"), "http://printer:8080/0");
        assert_eq!(join_url("http://printer:8080", "1"), "http://printer:8080/1");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("ああああ", 2), "ああ...");
    }

    #[test]
    fn test_single_endpoint_is_always_used() {
        let client = client_for("http://printer-api:8080");
        for _ in 0..10 {
            assert_eq!(client.endpoint_url(), "http://printer-api:8080/");
        }
    }

    #[test]
    fn test_random_endpoint_stays_within_configured_set() {
        let mut config = PrinterConfig::new("http://printer-api:8080");
        config.endpoints = vec!["/0".to_string(), "/1".to_string()];
        let client = PrinterClient::new(config).unwrap();
        for _ in 0..20 {
            let url = client.endpoint_url();
            assert!(
                url == "http://printer-api:8080/0" || url == "http://printer-api:8080/1",
                "unexpected url {}",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_forward_success_sends_imgf_field() {
        let (api_host, received) = spawn_fake_printer(200, "ok").await;
        let client = client_for(&api_host);

        client
            .forward("receipt.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].path, "/");
        assert_eq!(received[0].filename.as_deref(), Some("receipt.png"));
        assert_eq!(received[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(received[0].data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_forward_non_200_is_rejected() {
        let (api_host, _) = spawn_fake_printer(503, "printer out of paper").await;
        let client = client_for(&api_host);

        let err = client
            .forward("receipt.png", vec![1], "image/png")
            .await
            .unwrap_err();

        match &err {
            PrintError::Rejected { status, body, .. } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "printer out of paper");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains(&api_host));
    }

    #[tokio::test]
    async fn test_forward_201_is_not_success() {
        let (api_host, _) = spawn_fake_printer(201, "").await;
        let client = client_for(&api_host);

        let err = client
            .forward("receipt.png", vec![1], "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::Rejected { status: 201, .. }));
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        let api_host = closed_port_url().await;
        let client = client_for(&api_host);

        let err = client
            .forward("receipt.png", vec![1], "image/png")
            .await
            .unwrap_err();
        assert!(
            matches!(err, PrintError::ConnectionRefused { .. }),
            "unexpected error: {:?}",
            err
        );
        assert!(err.to_string().contains(&api_host));
    }

    #[tokio::test]
    async fn test_forward_unresolvable_host_is_transport_error() {
        let client = client_for("http://no-such-host.invalid");

        let err = client
            .forward("receipt.png", vec![1], "image/png")
            .await
            .unwrap_err();
        assert!(
            matches!(err, PrintError::Transport { .. }),
            "unexpected error: {:?}",
            err
        );
        assert!(
            err.to_string()
                .starts_with("Failed to connect to print service (API host: http://no-such-host.invalid)"),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn test_forward_timeout() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = PrinterConfig::new(format!("http://{}", addr));
        config.timeout = Duration::from_millis(200);
        let client = PrinterClient::new(config).unwrap();

        let err = client
            .forward("receipt.png", vec![1], "image/png")
            .await
            .unwrap_err();
        assert!(
            matches!(err, PrintError::Timeout { .. }),
            "unexpected error: {:?}",
            err
        );
        assert!(err.to_string().contains("timed out"));
    }
}
