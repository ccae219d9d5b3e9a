use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};

/// Hard ceiling checked before any upload is attempted.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image input as it arrives from a client: absent, an already-hosted URL
/// (stored verbatim), an inline base64 data URI, or raw multipart bytes.
#[derive(Debug, Clone)]
pub enum ImageInput {
    None,
    Url(String),
    DataUri(String),
    Bytes { data: Vec<u8>, content_type: String },
}

impl ImageInput {
    /// Classify the string form of the `image` field.
    pub fn from_field(value: &str) -> ImageInput {
        let value = value.trim();
        if value.is_empty() {
            ImageInput::None
        } else if value.starts_with("data:") {
            ImageInput::DataUri(value.to_string())
        } else {
            ImageInput::Url(value.to_string())
        }
    }
}

/// Thin client for the third-party image host. Posts never reach the
/// database until this has produced a permanent URL (upload-then-persist).
pub struct ImageHost {
    client: reqwest::Client,
    upload_url: String,
    api_key: Option<String>,
}

impl ImageHost {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            upload_url: upstream.image_upload_url.clone(),
            api_key: upstream.image_api_key.clone(),
        }
    }

    /// Resolve any image input to the URL that will be persisted.
    pub async fn resolve(&self, input: ImageInput) -> AppResult<String> {
        match input {
            ImageInput::None => Ok(String::new()),
            ImageInput::Url(url) => {
                // Syntactic check only; reachability is the client's problem
                url::Url::parse(&url)
                    .map_err(|_| AppError::BadRequest("Invalid image URL".into()))?;
                Ok(url)
            }
            ImageInput::DataUri(uri) => {
                let (content_type, data) = parse_data_uri(&uri)?;
                check_image(&content_type, data.len())?;
                self.upload(&data).await
            }
            ImageInput::Bytes { data, content_type } => {
                check_image(&content_type, data.len())?;
                self.upload(&data).await
            }
        }
    }

    async fn upload(&self, data: &[u8]) -> AppResult<String> {
        let encoded = STANDARD.encode(data);
        let mut form = vec![("image", encoded)];
        if let Some(ref key) = self.api_key {
            form.push(("key", key.clone()));
        }

        let response = self
            .client
            .post(&self.upload_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Image host unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "Image host returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid image host response: {}", e)))?;

        // Hosts differ on nesting; accept {"data":{"url":..}} or {"url":..}
        body.pointer("/data/url")
            .or_else(|| body.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::BadGateway("Image host response missing URL".into()))
    }
}

/// Reject non-images and oversized payloads before any network traffic.
fn check_image(content_type: &str, len: usize) -> AppResult<()> {
    if !content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Only image files are allowed".into()));
    }
    if len > MAX_IMAGE_BYTES {
        return Err(AppError::PayloadTooLarge);
    }
    Ok(())
}

/// Split a `data:<mime>;base64,<payload>` URI into its content type and
/// decoded bytes. The size ceiling is also enforced on the encoded form so
/// oversized payloads are rejected without decoding them.
fn parse_data_uri(uri: &str) -> AppResult<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::BadRequest("Invalid data URI".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::BadRequest("Invalid data URI".into()))?;
    let content_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| AppError::BadRequest("Only base64 data URIs are supported".into()))?;

    if !content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Only image files are allowed".into()));
    }
    // base64 inflates by 4/3; anything past this bound cannot fit
    if payload.len() > MAX_IMAGE_BYTES / 3 * 4 + 4 {
        return Err(AppError::PayloadTooLarge);
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::BadRequest("Invalid base64 image data".into()))?;
    Ok((content_type.to_string(), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_classification() {
        assert!(matches!(ImageInput::from_field(""), ImageInput::None));
        assert!(matches!(ImageInput::from_field("   "), ImageInput::None));
        assert!(matches!(
            ImageInput::from_field("data:image/png;base64,aGk="),
            ImageInput::DataUri(_)
        ));
        assert!(matches!(
            ImageInput::from_field("https://cdn.example.com/a.png"),
            ImageInput::Url(_)
        ));
    }

    #[test]
    fn data_uri_parses_mime_and_bytes() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(b"pngbytes"));
        let (mime, data) = parse_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, b"pngbytes");
    }

    #[test]
    fn non_image_data_uri_is_rejected() {
        let uri = format!("data:text/plain;base64,{}", STANDARD.encode(b"hello"));
        let err = parse_data_uri(&uri).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        let err = parse_data_uri("data:image/png,rawbytes").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn oversized_payload_is_rejected_before_decoding() {
        // 6MB of pre-decode payload, no valid base64 required
        let payload = "A".repeat(6 * 1024 * 1024 / 3 * 4);
        let uri = format!("data:image/jpeg;base64,{}", payload);
        let err = parse_data_uri(&uri).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }

    #[test]
    fn oversized_bytes_are_rejected() {
        let err = check_image("image/png", MAX_IMAGE_BYTES + 1).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge));
        assert!(check_image("image/png", MAX_IMAGE_BYTES).is_ok());
    }

    #[test]
    fn non_image_content_type_is_rejected() {
        let err = check_image("application/pdf", 10).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn url_input_is_stored_verbatim_without_network() {
        let host = ImageHost::new(&crate::config::UpstreamConfig::default());
        let url = "https://cdn.example.com/photo.jpg".to_string();
        let resolved = host.resolve(ImageInput::Url(url.clone())).await.unwrap();
        assert_eq!(resolved, url);
    }

    #[tokio::test]
    async fn garbage_url_is_bad_request() {
        let host = ImageHost::new(&crate::config::UpstreamConfig::default());
        let err = host
            .resolve(ImageInput::Url("not a url".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn absent_image_resolves_to_empty_string() {
        let host = ImageHost::new(&crate::config::UpstreamConfig::default());
        assert_eq!(host.resolve(ImageInput::None).await.unwrap(), "");
    }
}
