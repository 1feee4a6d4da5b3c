use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, error};

use crate::cli::config::UploaderSettings;
use crate::storage::{ImageUploader, UploadResponse};

/// File name sent with every multipart upload
const UPLOAD_FILE_NAME: &str = "uploaded_image.jpg";

/// Posts images to a remote endpoint as multipart form data
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    upload_url: String,
    authorization: String,
}

impl HttpUploader {
    pub fn new(settings: &UploaderSettings) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: &UploaderSettings) -> Self {
        Self {
            client,
            upload_url: settings.upload_url.clone(),
            authorization: settings.authorization.clone(),
        }
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, bytes: Vec<u8>) -> Result<UploadResponse> {
        let part = Part::bytes(bytes).file_name(UPLOAD_FILE_NAME);
        let form = Form::new().part("file", part);

        let response = self.client.post(&self.upload_url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .multipart(form)
            .send()
            .await
            .context(format!("Failed to reach upload endpoint: {}", self.upload_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Upload failed with status {}: {}", status, body);
            anyhow::bail!("Upload failed with status code {}: {}", status, body);
        }

        let reply = response.json::<UploadResponse>()
            .await
            .context("Upload endpoint returned malformed JSON")?;
        debug!("Upload answered with code {}", reply.code);
        Ok(reply)
    }
}
