use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::HUMAN_CHOICE_REQUIRED;
use crate::util::{is_http_url, is_local_endpoint_url};

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_THREADS_API_URL: &str = "http://localhost:8123";
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;
const MAX_IDLE_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_RESUME_AS_NODE: &str = "human_choice_node";

/// How the pipeline continues once a human decision has been submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Frames keep arriving on the stream that raised the interrupt.
    Continue,
    /// The driver opens a new stream for the thread after resuming.
    NewStream,
}

impl ResumeMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" | "same" | "same_stream" | "open" => Some(ResumeMode::Continue),
            "new" | "new_stream" | "restart" | "reopen" => Some(ResumeMode::NewStream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub threads_api_url: String,
    pub api_key: Option<String>,
    pub upload_url: Option<String>,
    pub idle_timeout: Duration,
    pub resume_mode: ResumeMode,
    pub resume_as_node: String,
    pub interrupt_message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            threads_api_url: DEFAULT_THREADS_API_URL.to_string(),
            api_key: None,
            upload_url: None,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            resume_mode: ResumeMode::Continue,
            resume_as_node: DEFAULT_RESUME_AS_NODE.to_string(),
            interrupt_message: HUMAN_CHOICE_REQUIRED.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let api_url = non_empty_env("GRAPHRUN_API_URL").unwrap_or(defaults.api_url);
        let threads_api_url =
            non_empty_env("LANGGRAPH_API_URL").unwrap_or(defaults.threads_api_url);
        let api_key = non_empty_env("LANGSMITH_API_KEY");
        let upload_url = non_empty_env("SQLITE_URL");

        let idle_timeout = match non_empty_env("GRAPHRUN_IDLE_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => bail!("Invalid GRAPHRUN_IDLE_TIMEOUT_SECS '{raw}': expected seconds"),
            },
            None => defaults.idle_timeout,
        };

        let resume_mode = match non_empty_env("GRAPHRUN_RESUME_MODE") {
            Some(raw) => match ResumeMode::parse(&raw) {
                Some(mode) => mode,
                None => bail!(
                    "Invalid GRAPHRUN_RESUME_MODE '{raw}': expected 'continue' or 'new_stream'"
                ),
            },
            None => defaults.resume_mode,
        };

        let resume_as_node =
            non_empty_env("GRAPHRUN_RESUME_AS_NODE").unwrap_or(defaults.resume_as_node);
        let interrupt_message =
            std::env::var("GRAPHRUN_INTERRUPT_MESSAGE").unwrap_or(defaults.interrupt_message);

        Ok(Self {
            api_url,
            threads_api_url,
            api_key,
            upload_url,
            idle_timeout,
            resume_mode,
            resume_as_node,
            interrupt_message,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_url) {
            bail!(
                "Invalid GRAPHRUN_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !is_http_url(&self.threads_api_url) {
            bail!(
                "Invalid LANGGRAPH_API_URL '{}': expected http:// or https:// URL",
                self.threads_api_url
            );
        }

        if let Some(upload_url) = &self.upload_url {
            if !is_http_url(upload_url) {
                bail!("Invalid SQLITE_URL '{upload_url}': expected http:// or https:// URL");
            }
        }

        if !is_local_endpoint_url(&self.threads_api_url) && self.api_key.is_none() {
            bail!(
                "LANGSMITH_API_KEY must be set for non-local thread APIs (url: '{}')",
                self.threads_api_url
            );
        }

        let idle_secs = self.idle_timeout.as_secs();
        if self.idle_timeout.is_zero() || idle_secs > MAX_IDLE_TIMEOUT_SECS {
            bail!(
                "Invalid idle timeout {}s: expected 1..={MAX_IDLE_TIMEOUT_SECS} seconds",
                idle_secs
            );
        }

        if self.resume_as_node.trim().is_empty() {
            bail!("GRAPHRUN_RESUME_AS_NODE must not be empty");
        }

        if self.interrupt_message.trim().is_empty() {
            bail!("GRAPHRUN_INTERRUPT_MESSAGE must not be empty");
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        if v.trim().is_empty() {
            None
        } else {
            Some(v.trim().to_string())
        }
    })
}
