use super::transport::FineTuningTransport;
use crate::config::OpenAiSettings;
use crate::core::dataset::Message;
use crate::core::job::{CreateJobRequest, FileSummary, FineTuningJob, JobSummary};
use crate::error::FineTuneResult;
use crate::utils::lib::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio::time::Duration;

const FINE_TUNE_PURPOSE: &str = "fine-tune";

/// OpenAI REST implementation of [`FineTuningTransport`].
pub struct OpenAI {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    delay: Duration,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

impl OpenAI {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }

    pub fn from_settings(settings: &OpenAiSettings) -> FineTuneResult<Self> {
        let api_key = settings.resolve_api_key()?;
        Ok(Self::new(api_key, settings.base_url()).with_retries(settings.max_retries))
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn generate_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .context("Failed to create Authorization header")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn generate_chat_body(&self, model: &str, messages: &[Message]) -> Value {
        json!({
            "model": model,
            "messages": messages,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self.client.get(self.url(path))
            .headers(self.generate_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        let response = ensure_success(response, what).await?;
        response.json::<T>().await
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

/// Passes 2xx responses through; anything else becomes an error carrying the body.
async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await
        .with_context(|| format!("Failed to get error text from {} response", what))?;
    error!("{} failed ({}): {}", what, status, error_text);
    anyhow::bail!("{} failed ({}): {}", what, status, error_text)
}

#[async_trait]
impl FineTuningTransport for OpenAI {
    async fn upload_file(&self, path: &Path) -> Result<String> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;

        let file_name = path.file_name()
            .and_then(|n| n.to_str())
            .context("Failed to get file name")?
            .to_string();

        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str("application/json")
            .context("Failed to set MIME type")?;

        let form = Form::new()
            .part("file", part)
            .text("purpose", FINE_TUNE_PURPOSE);

        let response = self.client.post(self.url("files"))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .context("Failed to send file upload request")?;

        let created: Created = ensure_success(response, "File upload").await?
            .json()
            .await
            .context("Failed to parse upload response as JSON")?;
        info!("File uploaded successfully: {}", created.id);
        Ok(created.id)
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<String> {
        debug!("Fine-tuning job request: {:?}", request);
        let response = self.client.post(self.url("fine_tuning/jobs"))
            .headers(self.generate_headers()?)
            .json(request)
            .send()
            .await
            .context("Failed to send fine-tuning job request")?;

        let created: Created = ensure_success(response, "Fine-tuning job creation").await?
            .json()
            .await
            .context("Failed to parse fine-tuning job response as JSON")?;
        info!("Fine-tuning job created successfully: {}", created.id);
        Ok(created.id)
    }

    async fn get_job(&self, job_id: &str) -> Result<FineTuningJob> {
        self.get_json(&format!("fine_tuning/jobs/{}", job_id), "Fine-tuning job retrieval").await
    }

    async fn list_files(&self, limit: usize) -> Result<Vec<FileSummary>> {
        let page: Page<FileSummary> = self
            .get_json(&format!("files?limit={}", limit), "File listing")
            .await?;
        Ok(page.data.into_iter().take(limit).collect())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobSummary>> {
        let page: Page<JobSummary> = self
            .get_json(&format!("fine_tuning/jobs?limit={}", limit), "Fine-tuning job listing")
            .await?;
        Ok(page.data.into_iter().take(limit).collect())
    }

    async fn download_file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.url(&format!("files/{}/content", file_id)))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("Failed to send file content request")?;

        let bytes = ensure_success(response, "File download").await?
            .bytes()
            .await
            .context("Failed to read file content")?;
        debug!("Downloaded {} bytes for {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }

    async fn chat_completion(&self, model: &str, messages: &[Message]) -> Result<String> {
        retry(self.max_retries, self.delay, || async {
            let body = self.generate_chat_body(model, messages);
            let response = self.client.post(self.url("chat/completions"))
                .headers(self.generate_headers()?)
                .json(&body)
                .send()
                .await
                .context("Failed to send request to OpenAI API")?;

            let response_value = ensure_success(response, "OpenAI API request").await?
                .json::<Value>()
                .await
                .context("Failed to parse OpenAI API response as JSON")?;
            let content = response_value["choices"][0]["message"]["content"]
                .as_str()
                .context("Failed to extract content from OpenAI API response")?
                .to_string();
            info!("OpenAI API request successful for model {}", model);
            debug!("Response: {:?}", response_value);
            Ok(content)
        }).await
    }
}
