use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cli::config::DownloaderSettings;
use crate::crawler::consumer::Processor;
use crate::crawler::task::{ArticleRecord, ProcessError};
use crate::fetch::{HtmlDownloader, ImageDownloader};
use crate::parser::{ArticleParser, ImageRef};
use crate::storage::{ImageUploader, Persistence};

/// Download, parse, mirror images, then store
pub struct ArticleProcessor {
    html: HtmlDownloader,
    images: ImageDownloader,
    parser: ArticleParser,
    persistence: Arc<dyn Persistence>,
    uploader: Option<Arc<dyn ImageUploader>>,
    category: String,
}

impl ArticleProcessor {
    pub fn new(
        settings: &DownloaderSettings,
        persistence: Arc<dyn Persistence>,
        category: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            html: HtmlDownloader::new(settings)?,
            images: ImageDownloader::new(settings)?,
            parser: ArticleParser::new(),
            persistence,
            uploader: None,
            category: category.into(),
        })
    }

    /// Send images to a dedicated uploader instead of the persistence backend
    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Mirrored URL for one image, or `None` if any step failed
    async fn mirror_image(&self, image: &ImageRef) -> Option<String> {
        let bytes = match self.images.download_image(&image.resolved, None).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Keeping original image {}: {:#}", image.original, e);
                return None;
            }
        };

        let reply = match &self.uploader {
            Some(uploader) => uploader.upload(bytes).await,
            None => self.persistence.upload_image(bytes).await,
        };

        match reply {
            Ok(reply) => {
                let mirrored = reply.mirrored_url().map(str::to_string);
                if mirrored.is_none() {
                    warn!("Upload of {} answered {} ({}), keeping original", image.resolved, reply.code, reply.message);
                }
                mirrored
            }
            Err(e) => {
                warn!("Upload of {} failed, keeping original: {:#}", image.resolved, e);
                None
            }
        }
    }
}

#[async_trait]
impl Processor for ArticleProcessor {
    async fn process(&self, url: &str) -> Result<ArticleRecord, ProcessError> {
        let page = self.html.download(url).await?;
        let article = self.parser.parse(&page, url)?;

        let mut html = article.full_html();
        let mut image_urls = Vec::with_capacity(article.images.len());
        let mut cover = None;
        let mut mirrored_count = 0;

        for (index, image) in article.images.iter().enumerate() {
            match self.mirror_image(image).await {
                Some(mirrored) => {
                    mirrored_count += 1;
                    html = replace_src(&html, &image.original, &mirrored);
                    if index == 0 {
                        cover = Some(mirrored.clone());
                    }
                    image_urls.push(mirrored);
                }
                None => image_urls.push(image.original.clone()),
            }
        }

        debug!("Mirrored {}/{} image(s) for {}", mirrored_count, article.images.len(), url);

        let record = ArticleRecord {
            title: article.title,
            cover,
            html,
            brief: article.brief,
            image_urls,
            category: self.category.clone(),
        };

        let receipt = self.persistence.save_article(&record)
            .await
            .map_err(|source| ProcessError::Persist {
                url: url.to_string(),
                source,
            })?;

        info!("Stored '{}' as article {} at {}", record.title, receipt.id, receipt.location);
        Ok(record)
    }
}

/// Swap an image source in serialized HTML. Attribute values come out of the
/// serializer with `&`, `"` and non-breaking spaces escaped.
fn replace_src(html: &str, original: &str, replacement: &str) -> String {
    let serialized = original
        .replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('"', "&quot;");

    html.replace(
        &format!("src=\"{}\"", serialized),
        &format!("src=\"{}\"", html_escape::encode_double_quoted_attribute(replacement)),
    )
}
