//! Image processor client
//!
//! Remote background-removal operation (Clipdrop). The call is opaque to the
//! rest of the service: image bytes in, image bytes or a typed failure out.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use shared::ImageServiceConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Upload part name expected by the remote API
const IMAGE_PART: &str = "image_file";

/// Remote processing can take a while for large images
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageServiceError {
    #[error("Service configuration error. Please contact support")]
    NotConfigured,

    #[error("Invalid API configuration. Please contact support")]
    Unauthorized,

    #[error("Service is busy. Please try again in a few minutes")]
    RateLimited,

    #[error("Invalid image format. Please upload a valid image file")]
    InvalidImage,

    #[error("No image data received from processing service")]
    EmptyResult,

    #[error("Image processing service is temporarily unavailable")]
    Unavailable(String),
}

/// Remote image operation
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    async fn remove_background(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, ImageServiceError>;
}

/// Clipdrop remove-background client
pub struct ClipdropClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl ClipdropClient {
    pub fn new(config: &ImageServiceConfig) -> Result<Self, ImageServiceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ImageServiceError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ImageProcessor for ClipdropClient {
    async fn remove_background(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, ImageServiceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            error!("Clipdrop API key is not configured");
            ImageServiceError::NotConfigured
        })?;

        let size = image.len();
        let part = Part::bytes(image)
            .file_name("upload")
            .mime_str(content_type)
            .map_err(|_| ImageServiceError::InvalidImage)?;
        let form = Form::new().part(IMAGE_PART, part);

        let response = self
            .http_client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Clipdrop request failed");
            return Err(classify_status(status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageServiceError::Unavailable(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageServiceError::EmptyResult);
        }

        info!(input_bytes = size, output_bytes = bytes.len(), "Background removed");
        Ok(bytes.to_vec())
    }
}

fn classify_status(status: StatusCode) -> ImageServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ImageServiceError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ImageServiceError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            ImageServiceError::InvalidImage
        }
        other => ImageServiceError::Unavailable(format!("HTTP {}", other)),
    }
}
