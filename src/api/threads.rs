use super::client::map_request_error;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::error::SessionError;
use crate::types::{ThreadState, ThreadStateUpdate};
use reqwest::Url;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
pub trait MockThreadBackend: Send + Sync {
    fn get_state(&self, thread_id: &str) -> Result<ThreadState, SessionError>;
    fn update_state(&self, thread_id: &str, update: &ThreadStateUpdate)
        -> Result<(), SessionError>;
}

/// Client for the backend's thread state API
/// (`GET`/`POST {base}/threads/{id}/state`).
#[derive(Clone)]
pub struct ThreadStateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    #[cfg(test)]
    mock_backend: Option<Arc<dyn MockThreadBackend>>,
}

impl ThreadStateClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.threads_api_url.clone(),
            api_key: config.api_key.clone(),
            #[cfg(test)]
            mock_backend: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(backend: Arc<dyn MockThreadBackend>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "http://localhost:8123".to_string(),
            api_key: None,
            mock_backend: Some(backend),
        }
    }

    pub async fn get_state(&self, thread_id: &str) -> Result<ThreadState, SessionError> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.get_state(thread_id);
            }
        }

        let url = self.state_url(thread_id)?;
        let mut request = self.http.get(url.clone());
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, url.as_str()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<ThreadState>()
            .await
            .map_err(|error| SessionError::ThreadState {
                thread_id: thread_id.to_string(),
                message: format!("unreadable state: {error}"),
            })
    }

    pub async fn update_state(
        &self,
        thread_id: &str,
        update: &ThreadStateUpdate,
    ) -> Result<(), SessionError> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.update_state(thread_id, update);
            }
        }

        let url = self.state_url(thread_id)?;
        if debug_payload_enabled() {
            if let Ok(payload) = serde_json::to_value(update) {
                emit_debug_payload(url.as_str(), &payload);
            }
        }

        let mut request = self
            .http
            .post(url.clone())
            .header("content-type", "application/json")
            .json(update);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, url.as_str()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn state_url(&self, thread_id: &str) -> Result<Url, SessionError> {
        let invalid = |message: &str| SessionError::ThreadState {
            thread_id: thread_id.to_string(),
            message: message.to_string(),
        };

        if thread_id.trim().is_empty() {
            return Err(invalid("empty thread id"));
        }
        let mut url = Url::parse(self.base_url.trim())
            .map_err(|error| invalid(&format!("invalid thread API url: {error}")))?;
        url.path_segments_mut()
            .map_err(|_| invalid("thread API url cannot be a base"))?
            .pop_if_empty()
            .extend(["threads", thread_id, "state"]);
        Ok(url)
    }
}
