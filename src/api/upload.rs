use super::client::map_request_error;
use crate::config::Config;
use crate::error::SessionError;
use crate::types::UploadResponse;
use crate::util::join_endpoint;
use reqwest::multipart::{Form, Part};
use std::path::Path;

const UPLOAD_PATH: &str = "upload-file";
const DEFAULT_FILE_NAME: &str = "database";

/// Multipart upload of a `.sqlite`/`.csv` file; the returned uuid is passed to
/// the pipeline as `databaseReference`.
#[derive(Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    upload_url: String,
}

impl UploadClient {
    pub fn new(config: &Config) -> Result<Self, SessionError> {
        let base = config
            .upload_url
            .as_deref()
            .ok_or_else(|| SessionError::Upload("SQLITE_URL is not configured".to_string()))?;
        Ok(Self::with_base_url(base))
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_url: join_endpoint(base_url, UPLOAD_PATH),
        }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub async fn upload_file(&self, path: &Path) -> Result<String, SessionError> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name));

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|error| map_request_error(error, &self.upload_url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HttpStatus {
                url: self.upload_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|error| SessionError::Upload(format!("unreadable response: {error}")))?;
        let uuid = body.uuid.trim();
        if uuid.is_empty() {
            return Err(SessionError::Upload("response carried an empty uuid".to_string()));
        }
        Ok(uuid.to_string())
    }
}
