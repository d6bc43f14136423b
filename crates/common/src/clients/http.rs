//! HTTP client for the planning, keyword and analysis services

use super::{
    keywords_from_envelopes, AnalysisRequest, AnalysisResponse, AnalysisService,
    KeywordEnvelope, KeywordExtractor, KeywordRequest, PlanningRequest, PlanningResponse,
    SectionPlanner, ANALYSIS_SERVICE, KEYWORD_SERVICE, PLANNER_SERVICE,
};
use crate::config::ServicesConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// JSON-over-HTTP client shared by all three services
pub struct HttpServiceClient {
    client: reqwest::Client,
    config: ServicesConfig,
}

impl HttpServiceClient {
    pub fn new(config: ServicesConfig) -> Result<Self> {
        // Per-request timeouts are set in `post`; this is only the connect bound
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    async fn post<Req, Resp>(
        &self,
        service: &'static str,
        url: &str,
        timeout: Duration,
        body: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.send(service, url, timeout, body).await;
        metrics::record_service_call(service, start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn send<Req, Resp>(
        &self,
        service: &'static str,
        url: &str,
        timeout: Duration,
        body: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut request = self.client.post(url).timeout(timeout).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| AppError::Network {
            service: service.to_string(),
            message: format!("Request failed: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(AppError::Network {
                    service: service.to_string(),
                    message: format!("status {}: {}", status, text),
                });
            }
            return Err(AppError::Upstream {
                service: service.to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        let bytes = response.bytes().await.map_err(|e| AppError::Network {
            service: service.to_string(),
            message: format!("Failed to read response body: {}", e),
        })?;

        serde_json::from_slice(&bytes).map_err(|e| AppError::SchemaValidation {
            service: service.to_string(),
            message: e.to_string(),
        })
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl SectionPlanner for HttpServiceClient {
    async fn plan(&self, request: &PlanningRequest) -> Result<PlanningResponse> {
        self.post(
            PLANNER_SERVICE,
            &self.config.planner_url,
            self.call_timeout(),
            request,
        )
        .await
    }
}

#[async_trait]
impl KeywordExtractor for HttpServiceClient {
    async fn extract_keywords(&self, query: &str) -> Result<Vec<String>> {
        let request = KeywordRequest {
            query: query.to_string(),
        };
        let envelopes: Vec<KeywordEnvelope> = self
            .post(
                KEYWORD_SERVICE,
                &self.config.keywords_url,
                self.call_timeout(),
                &request,
            )
            .await?;

        keywords_from_envelopes(envelopes)
    }
}

#[async_trait]
impl AnalysisService for HttpServiceClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        self.post(
            ANALYSIS_SERVICE,
            &self.config.analysis_url,
            Duration::from_secs(self.config.analysis_timeout_secs),
            request,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = ServicesConfig {
            planner_url: "http://127.0.0.1:9/plan".into(),
            timeout_secs: 1,
            ..ServicesConfig::default()
        };
        let client = HttpServiceClient::new(config).unwrap();
        let request = PlanningRequest {
            query: "anything".into(),
            available_papers: vec![],
        };

        let err = client.plan(&request).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
