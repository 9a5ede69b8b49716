use std::time::Duration;

use djt_core::{
    CreateJobResponse, Emptiness, HealthReport, JobCreate, JobId, PipelineId,
    PipelineStatusUpdate, PipelineView, RetryPolicy, RunStatus,
};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TrackingClient {
    base_url: Url,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl TrackingClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Self::with_http_client(base_url, http)
    }

    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            http,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run status for a run; `None` when the run does not exist.
    pub async fn get_job_pipelines(&self, run_id: &JobId) -> Result<Option<RunStatus>, ClientError> {
        let url = self.url(&["pipeline", run_id.as_str()]);
        self.retry
            .run_if(
                "get_job_pipelines",
                || {
                    let url = url.clone();
                    async move {
                        match self.call::<RunStatus, ()>(Method::GET, url, None).await {
                            Ok(run) => Ok(Some(run)),
                            Err(ClientError::NotFound(_)) => Ok(None),
                            Err(err) => Err(err),
                        }
                    }
                },
                ClientError::is_retryable,
            )
            .await
    }

    pub async fn pipeline_status_update(
        &self,
        run_id: &JobId,
        pipeline_id: &PipelineId,
        update: &PipelineStatusUpdate,
    ) -> Result<PipelineView, ClientError> {
        let url = self.url(&["pipeline", run_id.as_str(), pipeline_id.as_str(), "status"]);
        self.request("pipeline_status_update", Method::POST, url, Some(update))
            .await
    }

    /// Create `job_id` from `request`; an existing job is returned unchanged.
    pub async fn create_job(&self, job_id: &JobId, mut request: JobCreate) -> Result<CreateJobResponse, ClientError> {
        request.id = Some(job_id.clone());
        let url = self.url(&["jobs"]);
        self.request("create_job", Method::POST, url, Some(&request)).await
    }

    /// Store health. An unhealthy report (503) is returned, not raised.
    pub async fn health_check(&self) -> Result<HealthReport, ClientError> {
        let url = self.url(&["tracking", "health"]);
        self.retry
            .run_if(
                "health_check",
                || {
                    let url = url.clone();
                    async move {
                        match self.call::<HealthReport, ()>(Method::GET, url, None).await {
                            Err(ClientError::Server { status: 503, body }) => serde_json::from_str(&body)
                                .map_err(|_| ClientError::Server { status: 503, body }),
                            other => other,
                        }
                    }
                },
                ClientError::is_retryable,
            )
            .await
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in the constructor.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request<T, B>(&self, operation: &str, method: Method, url: Url, body: Option<&B>) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Emptiness,
        B: Serialize + ?Sized,
    {
        self.retry
            .run_if(
                operation,
                || self.call(method.clone(), url.clone(), body),
                ClientError::is_retryable,
            )
            .await
    }

    async fn call<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(%method, %url, "tracking api call");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::from_status(status, text));
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_escape_segments_and_keep_base_path() {
        let client = TrackingClient::new("http://tracker:8080/api/").unwrap();
        let url = client.url(&["pipeline", "run#1", "p/2", "status"]);
        assert_eq!(url.as_str(), "http://tracker:8080/api/pipeline/run%231/p%2F2/status");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(TrackingClient::new("not a url"), Err(ClientError::InvalidBaseUrl(_))));
        assert!(matches!(TrackingClient::new("mailto:ops@example.com"), Err(ClientError::InvalidBaseUrl(_))));
    }

    #[test]
    fn default_retry_policy() {
        let client = TrackingClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.retry_policy().max_retries, 3);
        assert_eq!(client.retry_policy().initial_delay, Duration::from_secs(1));
    }
}
