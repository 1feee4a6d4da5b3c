use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crawler::task::ArticleRecord;
use crate::storage::{Persistence, SaveReceipt, UploadResponse};

/// Row stored in `db.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: u64,
    pub title: String,
    pub cover: Option<String>,
    pub content: String,
    pub category: String,
    pub brief: String,
    pub urls: Vec<String>,
    pub created_at: String,
}

/// File-backed persistence. Each instance writes into a fresh work directory:
///
/// ```text
/// <data_dir>/local-persistence/<timestamp>-<suffix>/
///     db.json
///     html/<id>.html
///     img/<uuid>.png
/// ```
pub struct LocalPersistence {
    work_dir: PathBuf,
    html_dir: PathBuf,
    img_dir: PathBuf,
    db_path: PathBuf,
    // Serializes the read-modify-write of db.json across consumers
    db_lock: Mutex<()>,
}

impl LocalPersistence {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}", Local::now().format("%Y%m%d%H%M%S"), &suffix[..8]);
        let work_dir = data_dir.join("local-persistence").join(name);
        let html_dir = work_dir.join("html");
        let img_dir = work_dir.join("img");

        for dir in [&html_dir, &img_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .context(format!("Failed to create directory: {}", dir.display()))?;
        }

        let work_dir = tokio::fs::canonicalize(&work_dir)
            .await
            .context(format!("Failed to resolve work directory: {}", work_dir.display()))?;
        let html_dir = work_dir.join("html");
        let img_dir = work_dir.join("img");
        let db_path = work_dir.join("db.json");

        tokio::fs::write(&db_path, "[]")
            .await
            .context(format!("Failed to create database file: {}", db_path.display()))?;

        info!("Local persistence ready at {}", work_dir.display());

        Ok(Self {
            work_dir,
            html_dir,
            img_dir,
            db_path,
            db_lock: Mutex::new(()),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// All stored articles
    pub async fn articles(&self) -> Result<Vec<StoredArticle>> {
        let _guard = self.db_lock.lock().await;
        self.read_db().await
    }

    async fn read_db(&self) -> Result<Vec<StoredArticle>> {
        let raw = tokio::fs::read_to_string(&self.db_path)
            .await
            .context(format!("Failed to read database file: {}", self.db_path.display()))?;

        serde_json::from_str(&raw)
            .context(format!("Failed to parse database file: {}", self.db_path.display()))
    }

    /// Point images stored in the work directory at paths relative to `html/`
    fn relativize_images(&self, content: &str, urls: &[String]) -> String {
        let mut content = content.to_string();
        for url in urls {
            if let Ok(rel) = Path::new(url).strip_prefix(&self.work_dir) {
                let rel = rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                content = content.replace(url.as_str(), &format!("../{}", rel));
            }
        }
        content
    }
}

#[async_trait]
impl Persistence for LocalPersistence {
    async fn save_article(&self, record: &ArticleRecord) -> Result<SaveReceipt> {
        let _guard = self.db_lock.lock().await;

        let mut articles = self.read_db().await?;
        let id = articles.len() as u64 + 1;
        articles.push(StoredArticle {
            id,
            title: record.title.clone(),
            cover: record.cover.clone(),
            content: record.html.clone(),
            category: record.category.clone(),
            brief: record.brief.clone(),
            urls: record.image_urls.clone(),
            created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });

        let serialized = serde_json::to_string_pretty(&articles)
            .context("Failed to serialize articles")?;
        tokio::fs::write(&self.db_path, serialized)
            .await
            .context(format!("Failed to write database file: {}", self.db_path.display()))?;

        let html_path = self.html_dir.join(format!("{}.html", id));
        let content = self.relativize_images(&record.html, &record.image_urls);
        tokio::fs::write(&html_path, render_page(&record.title, &content))
            .await
            .context(format!("Failed to write article page: {}", html_path.display()))?;

        debug!("Saved article {} '{}' to {}", id, record.title, html_path.display());

        Ok(SaveReceipt {
            id,
            location: html_path.to_string_lossy().into_owned(),
        })
    }

    async fn upload_image(&self, bytes: Vec<u8>) -> Result<UploadResponse> {
        let path = self.img_dir.join(format!("{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, &bytes)
            .await
            .context(format!("Failed to write image: {}", path.display()))?;

        Ok(UploadResponse::ok(path.to_string_lossy()))
    }
}

fn render_page(title: &str, content: &str) -> String {
    let title = html_escape::encode_text(title);
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; margin: 0; padding: 0; background-color: #f4f4f4; }}
        header {{ background-color: #333; color: white; padding: 10px 0; text-align: center; }}
        main {{ max-width: 900px; margin: 20px auto; padding: 20px; background-color: white; box-shadow: 0 4px 8px rgba(0, 0, 0, 0.1); }}
        img {{ max-width: 100%; height: auto; display: block; margin: 0 auto; }}
    </style>
</head>
<body>
    <header>
        <h1>{title}</h1>
    </header>
    <main>
        {content}
    </main>
</body>
</html>
"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, html: String, image_urls: Vec<String>) -> ArticleRecord {
        ArticleRecord {
            title: title.to_string(),
            cover: image_urls.first().cloned(),
            html,
            brief: "brief".to_string(),
            image_urls,
            category: "Programming".to_string(),
        }
    }

    #[tokio::test]
    async fn test_layout_created() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LocalPersistence::new(dir.path()).await.unwrap();

        let work_dir = persistence.work_dir();
        assert!(work_dir.join("html").is_dir());
        assert!(work_dir.join("img").is_dir());
        assert!(persistence.articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_increment() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LocalPersistence::new(dir.path()).await.unwrap();

        let first = persistence.save_article(&record("One", "<p>1</p>".to_string(), vec![])).await.unwrap();
        let second = persistence.save_article(&record("Two", "<p>2</p>".to_string(), vec![])).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let articles = persistence.articles().await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].title, "Two");
        assert_eq!(articles[1].category, "Programming");

        let page = std::fs::read_to_string(&second.location).unwrap();
        assert!(page.contains("<h1>Two</h1>"));
        assert!(page.contains("<p>2</p>"));
    }

    #[tokio::test]
    async fn test_uploaded_images_linked_relatively() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LocalPersistence::new(dir.path()).await.unwrap();

        let reply = persistence.upload_image(vec![1, 2, 3]).await.unwrap();
        let stored = reply.mirrored_url().unwrap().to_string();
        assert_eq!(std::fs::read(&stored).unwrap(), vec![1, 2, 3]);

        let html = format!("<img src=\"{}\">", stored);
        let receipt = persistence.save_article(&record("Pics", html, vec![stored.clone()])).await.unwrap();

        let file_name = Path::new(&stored).file_name().unwrap().to_string_lossy().into_owned();
        let page = std::fs::read_to_string(&receipt.location).unwrap();
        assert!(page.contains(&format!("src=\"../img/{}\"", file_name)));

        // db.json keeps the absolute path
        assert_eq!(persistence.articles().await.unwrap()[0].urls, vec![stored]);
    }

    #[tokio::test]
    async fn test_corrupt_database_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = LocalPersistence::new(dir.path()).await.unwrap();
        let db_path = persistence.work_dir().join("db.json");
        std::fs::write(&db_path, "{not json").unwrap();

        let err = persistence.save_article(&record("One", "<p>1</p>".to_string(), vec![])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse database file"));
        assert_eq!(std::fs::read_to_string(&db_path).unwrap(), "{not json");
        assert!(!persistence.work_dir().join("html").join("1.html").exists());
    }
}
