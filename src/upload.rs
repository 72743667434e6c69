use serde::Deserialize;
use thiserror::Error;

pub const MSG_SELECT_FIRST: &str = "Please select an image first.";
pub const MSG_UPLOADING: &str = "Uploading...";
pub const MSG_SUCCESS: &str = "Image uploaded successfully!";
pub const MSG_UPLOAD_ERROR: &str = "Error uploading image.";
pub const MSG_TRANSPORT_ERROR: &str = "Error sending image to server.";
pub const MSG_UPLOAD_BUSY: &str = "Upload already in progress.";

/// Upload outcome taxonomy. Application rejections (a non-2xx with a body)
/// and transport problems get distinct wording but the same user recourse.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("server rejected upload with HTTP {status}")]
    Rejected { status: u16, detail: String },

    #[error("failed to reach upload server")]
    Transport(#[from] reqwest::Error),

    #[error("malformed server response")]
    MalformedResponse(#[source] serde_json::Error),
}

impl UploadError {
    /// Generic status string shown to the user. Structured detail is only
    /// ever logged.
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::Rejected { .. } => MSG_UPLOAD_ERROR,
            UploadError::Transport(_) | UploadError::MalformedResponse(_) => MSG_TRANSPORT_ERROR,
        }
    }
}

/// Lifecycle of the current upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    InProgress,
    Success,
    Failure,
}

/// Body the processing server returns on a successful upload.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
}

/// What a finished upload hands back to the UI.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub server_filename: String,
    pub display_url: String,
}

/// HTTP client for the processing server's upload endpoint.
pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Where the server exposes a processed result for download.
    pub fn display_url(&self, filename: &str) -> String {
        format!("{}/downloads/{}", self.base_url, filename)
    }

    /// Send image bytes as a single multipart part named `image` and parse
    /// the server's JSON reply. The returned filename is taken as-is; its
    /// shape is not validated.
    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> Result<UploadReceipt, UploadError> {
        let endpoint = format!("{}/api/upload", self.base_url);
        log::info!("Uploading {} ({} bytes) to {}", filename, data.len(), endpoint);

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::error!("Upload rejected with HTTP {}: {}", status, body);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                detail: body,
            });
        }

        let parsed: UploadResponse =
            serde_json::from_str(&body).map_err(UploadError::MalformedResponse)?;

        log::info!("Upload succeeded, server filename: {}", parsed.filename);
        Ok(UploadReceipt {
            display_url: self.display_url(&parsed.filename),
            server_filename: parsed.filename,
        })
    }

    /// Fetch a processed result image for display.
    pub async fn fetch_result(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        log::debug!("Fetching processed result from {}", url);

        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            log::error!("Result fetch failed with HTTP {}", status);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                detail: String::new(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_url_construction() {
        let client = UploadClient::new("http://192.168.1.20:5000");
        assert_eq!(
            client.display_url("captured_image_20240101000000000.png"),
            "http://192.168.1.20:5000/downloads/captured_image_20240101000000000.png"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = UploadClient::new("http://example.com/");
        assert_eq!(client.base_url(), "http://example.com");
        assert_eq!(client.display_url("a.png"), "http://example.com/downloads/a.png");
    }

    #[test]
    fn test_upload_response_parsing() {
        let parsed: UploadResponse =
            serde_json::from_str(r#"{"filename": "captured_image_20240101T000000.png"}"#).unwrap();
        assert_eq!(parsed.filename, "captured_image_20240101T000000.png");

        // Extra fields are tolerated
        let parsed: UploadResponse =
            serde_json::from_str(r#"{"filename": "x.png", "size": 1234}"#).unwrap();
        assert_eq!(parsed.filename, "x.png");

        // A body without a filename is malformed
        assert!(serde_json::from_str::<UploadResponse>(r#"{"error": "bad format"}"#).is_err());
    }

    #[test]
    fn test_error_user_messages() {
        let rejected = UploadError::Rejected {
            status: 500,
            detail: r#"{"error":"bad format"}"#.to_string(),
        };
        assert_eq!(rejected.user_message(), MSG_UPLOAD_ERROR);

        let malformed = UploadError::MalformedResponse(
            serde_json::from_str::<UploadResponse>("not json").unwrap_err(),
        );
        assert_eq!(malformed.user_message(), MSG_TRANSPORT_ERROR);
    }

    #[test]
    fn test_default_status_is_idle() {
        assert_eq!(UploadStatus::default(), UploadStatus::Idle);
    }
}
