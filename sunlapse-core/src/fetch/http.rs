use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sunlapse_config::FetchConfig;
use sunlapse_model::SourceSpec;
use tracing::trace;

use super::{FetchError, SourceFetcher};
use crate::error::{PipelineError, Result};

/// Production transport against the upstream screenshot endpoint.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: String,
    timeout: std::time::Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                PipelineError::Internal(format!(
                    "failed to build HTTP client: {err}"
                ))
            })?;

        Ok(Self {
            client,
            base: config.upstream_base.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
        })
    }

    fn screenshot_url(&self) -> String {
        format!("{}/v2/takeScreenshot/", self.base)
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_at(
        &self,
        spec: &SourceSpec,
        time: DateTime<Utc>,
    ) -> Result<Vec<u8>, FetchError> {
        // The upstream rejects fractional seconds; the planner only ever
        // produces whole-second instants, so formatting drops nothing.
        let date = time.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let layers = format!("[{},1,100]", spec.layer_id);

        trace!(kind = %spec.kind, %date, "requesting upstream screenshot");

        let response = self
            .client
            .get(self.screenshot_url())
            .query(&[
                ("date", date.as_str()),
                ("layers", layers.as_str()),
                ("imageScale", &spec.image_scale.to_string()),
                ("width", &spec.width.to_string()),
                ("height", &spec.height.to_string()),
                ("x0", "0"),
                ("y0", "0"),
                ("display", "true"),
                ("watermark", "false"),
            ])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Unavailable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unavailable(format!("HTTP {status}")));
        }

        let expected_len = response.content_length();
        let bytes = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Unavailable(format!("body read failed: {err}"))
            }
        })?;

        if let Some(content_len) = expected_len
            && bytes.len() as u64 != content_len
        {
            return Err(FetchError::InvalidImage(format!(
                "body size mismatch: got {} bytes, expected {content_len}",
                bytes.len()
            )));
        }

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let config = FetchConfig {
            upstream_base: "https://example.org/api/".to_string(),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(
            fetcher.screenshot_url(),
            "https://example.org/api/v2/takeScreenshot/"
        );
    }
}
