pub mod local;
pub mod queue;
pub mod uploader;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::crawler::task::ArticleRecord;

// Re-export common types
pub use local::LocalPersistence;
pub use queue::{DedupPolicy, QueueError, TaskQueues};
pub use uploader::HttpUploader;

/// Status code an upload endpoint returns on success
pub const UPLOAD_OK: u16 = 200;

/// Reply from an image upload, `{code, message, data: {url}}` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub code: u16,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub data: UploadData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    #[serde(default)]
    pub url: Option<String>,
}

impl UploadResponse {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            code: UPLOAD_OK,
            message: "uploaded".to_string(),
            data: UploadData { url: Some(url.into()) },
        }
    }

    /// Mirrored URL, only when the upload succeeded
    pub fn mirrored_url(&self) -> Option<&str> {
        if self.code == UPLOAD_OK {
            self.data.url.as_deref()
        } else {
            None
        }
    }
}

/// Where a saved article ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub id: u64,
    pub location: String,
}

/// Sends image blobs somewhere they can be served from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>) -> Result<UploadResponse>;
}

/// Article storage backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store an article and report where it went
    async fn save_article(&self, record: &ArticleRecord) -> Result<SaveReceipt>;

    /// Store an image alongside the articles
    async fn upload_image(&self, bytes: Vec<u8>) -> Result<UploadResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_wire_format() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"code": 200, "message": "ok", "data": {"url": "https://cdn.test/a.png"}}"#,
        ).unwrap();
        assert_eq!(response.mirrored_url(), Some("https://cdn.test/a.png"));

        let rejected: UploadResponse = serde_json::from_str(
            r#"{"code": 500, "message": "bad file", "data": {}}"#,
        ).unwrap();
        assert_eq!(rejected.mirrored_url(), None);

        let bare: UploadResponse = serde_json::from_str(r#"{"code": 200}"#).unwrap();
        assert_eq!(bare.mirrored_url(), None);
    }
}
