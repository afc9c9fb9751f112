//! Client for the RGB-D capture service (raw frames plus calibration JSON).

use std::time::Duration;

use serde_json::Value;

use crate::error::{RemoteError, Result};

pub const DEFAULT_CAMERA_HOST: &str = "192.168.0.197";
pub const DEFAULT_CAMERA_PORT: u16 = 51000;
pub const DEFAULT_CAMERA_TIMEOUT: Duration = Duration::from_secs(10);

const SERVICE: &str = "camera";

/// Explicit `base` wins; otherwise `http://{host}:{port}` with the given fallbacks.
pub fn resolve_base_url(
    base: Option<&str>,
    host: Option<&str>,
    port: Option<u16>,
    default_host: &str,
    default_port: u16,
) -> String {
    match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => {
            let host = host.map(str::trim).filter(|h| !h.is_empty()).unwrap_or(default_host);
            format!("http://{}:{}", host, port.unwrap_or(default_port))
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CameraClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(url = %url, "Fetching from camera");
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::protocol(SERVICE, status, &body));
        }
        Ok(response)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.get(path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, self.timeout, e))?;
        Ok(bytes.to_vec())
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let text = self
            .get(path)
            .await?
            .text()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, self.timeout, e))?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode {
            service: SERVICE.to_string(),
            message: format!("{}: {}", path, e),
        })
    }

    pub async fn calibration(&self) -> Result<Value> {
        self.get_json("camera/calibration").await
    }

    pub async fn status(&self) -> Result<Value> {
        self.get_json("camera/status").await
    }

    /// Packed BGR8 color frame.
    pub async fn color_raw(&self) -> Result<Vec<u8>> {
        self.get_bytes("streams/color_raw").await
    }

    /// Packed little-endian u16 depth frame.
    pub async fn depth_raw(&self) -> Result<Vec<u8>> {
        self.get_bytes("streams/depth_raw").await
    }

    pub async fn color_jpeg(&self) -> Result<Vec<u8>> {
        self.get_bytes("streams/color_jpeg").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base_url() {
        assert_eq!(resolve_base_url(Some("http://cam:9/"), Some("x"), Some(1), "h", 2), "http://cam:9");
        assert_eq!(resolve_base_url(None, Some("10.0.0.2"), None, "h", 51000), "http://10.0.0.2:51000");
        assert_eq!(resolve_base_url(Some("  "), None, Some(8080), "h", 2), "http://h:8080");
        assert_eq!(
            resolve_base_url(None, None, None, DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT),
            "http://192.168.0.197:51000"
        );
    }
}
