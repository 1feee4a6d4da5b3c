use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A single unit of work routed by task type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// URL to process
    url: String,

    /// Name of the queue partition this task belongs to
    task_type: String,
}

impl Task {
    pub fn new(url: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            task_type: task_type.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }
}

/// Structured article produced by a successful processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Article title
    pub title: String,

    /// Mirrored URL of the first image, if that image could be mirrored
    pub cover: Option<String>,

    /// Article body HTML with image sources rewritten
    pub html: String,

    /// Short plain-text summary
    pub brief: String,

    /// Final image sources in document order
    pub image_urls: Vec<String>,

    /// Category the article is filed under
    pub category: String,
}

/// Failure while processing a single URL
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Transport or HTTP status failure after all retries
    #[error("failed to fetch {url} after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The page does not have the expected layout
    #[error("failed to parse {url}: {reason}")]
    Parse {
        url: String,
        reason: String,
    },

    /// The article could not be stored
    #[error("failed to persist article from {url}: {source}")]
    Persist {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// An image blob could not be uploaded
    #[error("failed to upload image: {0}")]
    Upload(String),
}

impl ProcessError {
    /// Short category label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::Fetch { .. } => "fetch",
            ProcessError::Parse { .. } => "parse",
            ProcessError::Persist { .. } => "persist",
            ProcessError::Upload(_) => "upload",
        }
    }
}
