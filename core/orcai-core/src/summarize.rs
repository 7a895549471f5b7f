//! Handoff of a finished capture to the summarization service.
//!
//! One blocking chat-completions request per capture. No retries: a failed handoff is
//! reported to the user and the transcript is persisted so it can be re-sent later.

use crate::config::OrcaiConfig;
use crate::error::{OrcaiError, Result};
use orcai_protocol::{parse_chat_response, CaptureReport, ChatRequest};
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a capture report into a textual artifact (the generated playbook).
pub trait Summarizer {
    fn summarize(&self, report: &CaptureReport) -> Result<String>;
}

/// How many times a handoff is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// One request; every failure is final.
    #[default]
    BestEffortSingleAttempt,
}

impl RetryPolicy {
    pub fn max_attempts(self) -> u32 {
        match self {
            RetryPolicy::BestEffortSingleAttempt => 1,
        }
    }
}

/// OpenAI-style chat-completions client.
pub struct HttpSummarizer {
    config: OrcaiConfig,
    policy: RetryPolicy,
    timeout: Duration,
}

impl HttpSummarizer {
    pub fn new(config: OrcaiConfig) -> Self {
        Self {
            config,
            policy: RetryPolicy::default(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn send(&self, endpoint: &str, api_key: &str, report: &CaptureReport) -> Result<String> {
        let request = ChatRequest::for_report(
            report,
            self.config.model(),
            self.config.context_length(),
        );

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| OrcaiError::TransportFailed(e.to_string()))?;

        debug!(
            endpoint,
            model = %request.model,
            max_tokens = request.max_tokens,
            "Sending capture for summarization"
        );
        let response = client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(|e| OrcaiError::TransportFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| OrcaiError::TransportFailed(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(OrcaiError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        parse_chat_response(&body).map_err(|info| OrcaiError::UpstreamError {
            status: status.as_u16(),
            body: info.to_string(),
        })
    }
}

impl Summarizer for HttpSummarizer {
    fn summarize(&self, report: &CaptureReport) -> Result<String> {
        let (Some(endpoint), Some(api_key)) = (self.config.endpoint(), self.config.credential())
        else {
            return Err(OrcaiError::PreconditionFailed(
                self.config.missing_fields().join(", "),
            ));
        };

        // BestEffortSingleAttempt: the one request's outcome is final.
        match self.send(endpoint, api_key, report) {
            Ok(artifact) => {
                info!(bytes = artifact.len(), "Summarization succeeded");
                Ok(artifact)
            }
            Err(err) => {
                warn!(policy = ?self.policy, error = %err, "Summarization failed");
                Err(err)
            }
        }
    }
}
