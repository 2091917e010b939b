use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::auth::TokenSigner;
use super::wire;
use super::{StatusProber, VideoService};
use crate::config::Config;
use crate::error::{ConfigError, ProbeError, SubmissionError};
use crate::params::{ExtensionParams, GenerationParams};
use crate::task::{Job, OperationKind, StatusSnapshot};

/// HTTP client for the Kling video API. Cloning is cheap; clones share the
/// connection pool and the token cache.
#[derive(Debug, Clone)]
pub struct KlingClient {
    http: Client,
    base_url: String,
    signer: Arc<TokenSigner>,
}

impl KlingClient {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(ConfigError::Client)?;
        Self::with_client(http, cfg)
    }

    pub fn with_client(http: Client, cfg: &Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            signer: Arc::new(TokenSigner::new(&cfg.access_key, &cfg.secret_key)),
        })
    }

    fn task_url(&self, kind: OperationKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }

    async fn post_task<B: Serialize + Sync>(
        &self,
        kind: OperationKind,
        body: &B,
    ) -> Result<Job, SubmissionError> {
        let url = self.task_url(kind);
        let token = self.signer.bearer()?;

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;
        let job = wire::decode_job(status, &raw, kind)?;
        info!(task_id = %job.id, operation = %kind, "task submitted");
        Ok(job)
    }
}

#[async_trait]
impl StatusProber for KlingClient {
    async fn probe(&self, job: &Job) -> Result<StatusSnapshot, ProbeError> {
        let url = format!("{}/{}", self.task_url(job.kind), job.id);
        let token = self
            .signer
            .bearer()
            .map_err(|err| ProbeError::Fatal(err.to_string()))?;

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ProbeError::Transient(format!("status request failed: {err}")))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|err| ProbeError::Transient(format!("status body read failed: {err}")))?;
        debug!(task_id = %job.id, http_status = status.as_u16(), "status response");

        wire::decode_snapshot(status, &raw, job)
    }
}

#[async_trait]
impl VideoService for KlingClient {
    async fn submit_creation(&self, params: &GenerationParams) -> Result<Job, SubmissionError> {
        params.validate()?;
        self.post_task(OperationKind::Creation, params).await
    }

    async fn submit_extension(&self, params: &ExtensionParams) -> Result<Job, SubmissionError> {
        params.validate()?;
        self.post_task(OperationKind::Extension, params).await
    }
}
