//! Image byte loading

use async_trait::async_trait;
use networking::{HttpClient, HttpClientConfig, NetworkError};
use std::time::Duration;
use url::Url;

/// Fetches the bytes behind an image `src`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Load the image at `src`, which may be relative to the page
    async fn load(&self, src: &str) -> Result<Vec<u8>, NetworkError>;
}

/// Loads images over HTTP, resolving relative sources against the page URL
pub struct HttpImageLoader {
    client: HttpClient,
    page_url: Url,
}

impl HttpImageLoader {
    /// Create a loader for a page
    pub fn new(page_url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let page = Url::parse(page_url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", page_url, e)))?;
        let client = HttpClient::new(HttpClientConfig::new(page.as_str()).with_timeout(timeout))?;
        Ok(Self {
            client,
            page_url: page,
        })
    }

    /// Resolve `src` to an absolute URL
    pub fn resolve(&self, src: &str) -> Result<Url, NetworkError> {
        self.page_url
            .join(src)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", src, e)))
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, src: &str) -> Result<Vec<u8>, NetworkError> {
        let url = self.resolve(src)?;
        match url.scheme() {
            "http" | "https" => self.client.get_bytes(url.as_str()).await,
            other => Err(NetworkError::InvalidUrl(format!(
                "unsupported image scheme '{}' for {}",
                other, src
            ))),
        }
    }
}
