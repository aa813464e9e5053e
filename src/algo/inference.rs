//! HTTP client for the external HMM inference service, with a uniform
//! fallback when the service is unreachable or errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
struct InferRequest<'a> {
    symbol: &'a str,
    features: &'a [f64],
    ts: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferResponse {
    pub state: i32,
    pub probs: Vec<f64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl InferResponse {
    /// Uniform-probability fallback used whenever the inference call fails.
    pub fn fallback() -> Self {
        let probs = vec![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
        let confidence = probs.iter().cloned().fold(f64::MIN, f64::max);
        Self {
            state: 1,
            probs,
            action: None,
            confidence,
        }
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, symbol: &str, features: &[f64], ts: f64) -> anyhow::Result<InferResponse>;
}

pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInferenceClient {
    /// Builds the client with a bounded request timeout — `reqwest` has no
    /// default one, unlike the original's `httpx.AsyncClient`, and without
    /// it a hung `/infer` call blocks the algo queue consumer forever
    /// instead of tripping the uniform fallback in `AlgoService::handle_tick`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(&self, symbol: &str, features: &[f64], ts: f64) -> anyhow::Result<InferResponse> {
        let resp = self
            .client
            .post(format!("{}/infer", self.base_url))
            .json(&InferRequest { symbol, features, ts })
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<InferResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_uniform_and_reports_max_as_confidence() {
        let fb = InferResponse::fallback();
        assert_eq!(fb.probs.len(), 3);
        assert!((fb.confidence - 1.0 / 3.0).abs() < 1e-9);
    }
}
