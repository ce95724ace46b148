use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::error::SessionError;
use crate::types::{ResumeStreamRequest, RunRequest};
use crate::util::{is_local_endpoint_url, join_endpoint};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SessionError>> + Send>>;

const RUN_PATH: &str = "run";
const RESUME_PATH: &str = "resume";

/// A request that opens a frame stream.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StreamRequest {
    Run(RunRequest),
    Resume(ResumeStreamRequest),
}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, request: &StreamRequest) -> Result<ByteStream, SessionError>;
}

#[derive(Clone)]
pub struct PipelineClient {
    http: reqwest::Client,
    run_url: String,
    resume_url: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl PipelineClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            run_url: join_endpoint(&config.api_url, RUN_PATH),
            resume_url: join_endpoint(&config.api_url, RESUME_PATH),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            run_url: "http://localhost:3000/api/run".to_string(),
            resume_url: "http://localhost:3000/api/resume".to_string(),
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn run_url(&self) -> &str {
        &self.run_url
    }

    pub fn resume_url(&self) -> &str {
        &self.resume_url
    }

    /// `POST /run`; the response body is the session's frame stream.
    pub async fn create_run_stream(&self, request: &RunRequest) -> Result<ByteStream, SessionError> {
        self.open_stream(StreamRequest::Run(request.clone())).await
    }

    /// `POST /resume`; continues a paused thread on a fresh stream.
    pub async fn create_resume_stream(&self, thread_id: &str) -> Result<ByteStream, SessionError> {
        self.open_stream(StreamRequest::Resume(ResumeStreamRequest {
            thread_id: thread_id.to_string(),
        }))
        .await
    }

    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream, SessionError> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(&request);
            }
        }

        let request_url = match &request {
            StreamRequest::Run(_) => self.run_url.clone(),
            StreamRequest::Resume(_) => self.resume_url.clone(),
        };

        if debug_payload_enabled() {
            if let Ok(payload) = serde_json::to_value(&request) {
                emit_debug_payload(&request_url, &payload);
            }
        }

        let response = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HttpStatus {
                url: request_url,
                status: status.as_u16(),
            });
        }
        if response.content_length() == Some(0) {
            return Err(SessionError::MissingBody { url: request_url });
        }

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

pub(crate) fn map_request_error(error: reqwest::Error, request_url: &str) -> SessionError {
    let message = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!("cannot reach local endpoint: {error}. Start the pipeline server or update GRAPHRUN_API_URL.")
    } else if error.is_connect() {
        format!("cannot reach endpoint: {error}")
    } else if error.is_timeout() {
        format!("timed out: {error}")
    } else if let Some(status) = error.status() {
        return SessionError::HttpStatus {
            url: request_url.to_string(),
            status: status.as_u16(),
        };
    } else {
        error.to_string()
    };

    SessionError::Transport {
        url: request_url.to_string(),
        message,
    }
}
