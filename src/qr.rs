//! QR code images
//!
//! QR images are rendered by an external HTTP service (api.qrserver.com by
//! default). The service is addressed through a URL carrying the data to
//! encode; `QrRenderer` fetches the image bytes when the server has to
//! deliver the image itself.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;

use crate::{
    config::TicketsConfig,
    error::{AppError, AppResult},
};

/// Image formats the QR service can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrFormat {
    Png,
    Svg,
}

impl QrFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            QrFormat::Png => "png",
            QrFormat::Svg => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            QrFormat::Png => "image/png",
            QrFormat::Svg => "image/svg+xml",
        }
    }
}

impl std::str::FromStr for QrFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(QrFormat::Png),
            "svg" => Ok(QrFormat::Svg),
            other => Err(AppError::Internal(format!("Unsupported QR format: {}", other))),
        }
    }
}

/// Builds image URLs for the QR service
#[derive(Debug, Clone)]
pub struct QrImageUrl {
    base: Url,
    size: u32,
    format: QrFormat,
}

impl QrImageUrl {
    pub fn new(base: &str, size: u32, format: QrFormat) -> AppResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| AppError::Internal(format!("Invalid QR service URL '{}': {}", base, e)))?;
        if size == 0 || size > 1000 {
            return Err(AppError::Internal(format!("QR size out of range: {}", size)));
        }
        Ok(Self { base, size, format })
    }

    pub fn from_config(config: &TicketsConfig) -> AppResult<Self> {
        Self::new(&config.qr_service_url, config.qr_size, config.qr_format.parse()?)
    }

    pub fn format(&self) -> QrFormat {
        self.format
    }

    /// `{base}?size=NxN&format=fmt&data=<urlencoded data>`
    pub fn url_for(&self, data: &str) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("size", &format!("{0}x{0}", self.size))
            .append_pair("format", self.format.as_str())
            .append_pair("data", data);
        url.into()
    }
}

/// Produces QR images for arbitrary text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QrRenderer: Send + Sync {
    /// Public URL a client can load to display the image
    fn image_url(&self, data: &str) -> String;

    fn mime_type(&self) -> &'static str;

    /// Image bytes
    async fn render(&self, data: &str) -> AppResult<Vec<u8>>;
}

/// Renderer backed by the remote QR service
pub struct RemoteQrRenderer {
    urls: QrImageUrl,
    client: reqwest::Client,
}

impl RemoteQrRenderer {
    pub fn new(urls: QrImageUrl, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("campuslib-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { urls, client })
    }

    pub fn from_config(config: &TicketsConfig) -> AppResult<Self> {
        Self::new(
            QrImageUrl::from_config(config)?,
            Duration::from_secs(config.qr_timeout_seconds),
        )
    }
}

#[async_trait]
impl QrRenderer for RemoteQrRenderer {
    fn image_url(&self, data: &str) -> String {
        self.urls.url_for(data)
    }

    fn mime_type(&self) -> &'static str {
        self.urls.format().mime_type()
    }

    async fn render(&self, data: &str) -> AppResult<Vec<u8>> {
        let url = self.urls.url_for(data);
        tracing::debug!(%url, "Fetching QR image");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("QR request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Upstream(format!("QR service error: {}", e)))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("QR body read failed: {}", e)))?;

        if bytes.is_empty() {
            return Err(AppError::Upstream("QR service returned an empty image".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Render and wrap the image in a `data:` URI
pub async fn data_uri(renderer: &dyn QrRenderer, data: &str) -> AppResult<String> {
    let bytes = renderer.render(data).await?;
    Ok(format!(
        "data:{};base64,{}",
        renderer.mime_type(),
        STANDARD.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_json_payload() {
        let urls = QrImageUrl::new(
            "https://api.qrserver.com/v1/create-qr-code/",
            300,
            QrFormat::Png,
        )
        .unwrap();

        let url = urls.url_for(r#"{"type":"copy","copy_id":3}"#);
        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=300x300&format=png&data="));
        assert!(url.ends_with("%7B%22type%22%3A%22copy%22%2C%22copy_id%22%3A3%7D"));

        let parsed = Url::parse(&url).unwrap();
        let data = parsed
            .query_pairs()
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(data, r#"{"type":"copy","copy_id":3}"#);
    }

    #[test]
    fn test_token_characters_survive_encoding() {
        let urls = QrImageUrl::new("https://qr.example/render", 150, QrFormat::Svg).unwrap();
        let token = "eyJhbGciOiJIUzI1NiJ9.eyJ2IjoxfQ.abc-_def";
        let parsed = Url::parse(&urls.url_for(token)).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("size".to_string(), "150x150".to_string()));
        assert_eq!(pairs[1], ("format".to_string(), "svg".to_string()));
        assert_eq!(pairs[2], ("data".to_string(), token.to_string()));
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(QrImageUrl::new("not a url", 300, QrFormat::Png).is_err());
        assert!(QrImageUrl::new("https://qr.example", 0, QrFormat::Png).is_err());
        assert!("gif".parse::<QrFormat>().is_err());
    }

    #[test]
    fn test_data_uri_uses_renderer_output() {
        let mut renderer = MockQrRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .returning(|_| Ok(vec![0x89, b'P', b'N', b'G']));
        renderer.expect_mime_type().return_const("image/png");

        let uri = tokio_test::block_on(data_uri(&renderer, "hello")).unwrap();
        assert_eq!(uri, "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_data_uri_propagates_upstream_failure() {
        let mut renderer = MockQrRenderer::new();
        renderer
            .expect_render()
            .returning(|_| Err(AppError::Upstream("timeout".to_string())));

        let result = tokio_test::block_on(data_uri(&renderer, "hello"));
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }
}
