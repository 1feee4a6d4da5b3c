use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::crawler::task::ProcessError;

/// Number of characters of body text kept as the brief
const BRIEF_LENGTH: usize = 100;

/// An `<img>` in the article body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// The `src` attribute as written in the page
    pub original: String,

    /// `original` resolved against the page URL
    pub resolved: String,
}

/// Content extracted from an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArticle {
    pub title: String,
    pub content_html: String,
    pub brief: String,
    pub images: Vec<ImageRef>,
    pub repost_notice: Option<String>,
}

impl ParsedArticle {
    /// Body HTML with the repost notice appended
    pub fn full_html(&self) -> String {
        match &self.repost_notice {
            Some(notice) => format!("{}{}", self.content_html, notice),
            None => self.content_html.clone(),
        }
    }
}

/// Extracts articles from blog pages laid out with a `#content_views` body
#[derive(Debug, Clone)]
pub struct ArticleParser {
    content: Selector,
    title: Selector,
    page_title: Selector,
    image: Selector,
    copyright: Selector,
    link: Selector,
    license: Selector,
}

impl Default for ArticleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleParser {
    pub fn new() -> Self {
        Self {
            content: Selector::parse("#content_views").expect("valid #content_views selector"),
            title: Selector::parse("#articleContentId").expect("valid #articleContentId selector"),
            page_title: Selector::parse("title").expect("valid title selector"),
            image: Selector::parse("img[src]").expect("valid img selector"),
            copyright: Selector::parse(".article-copyright").expect("valid .article-copyright selector"),
            link: Selector::parse("a[href]").expect("valid a[href] selector"),
            license: Selector::parse(".creativecommons").expect("valid .creativecommons selector"),
        }
    }

    /// Parse an article page fetched from `url`
    pub fn parse(&self, html: &str, url: &str) -> Result<ParsedArticle, ProcessError> {
        let document = Html::parse_document(html);

        let content = document.select(&self.content).next()
            .ok_or_else(|| ProcessError::Parse {
                url: url.to_string(),
                reason: "no element with id 'content_views'".to_string(),
            })?;

        let title = self.extract_title(&document);
        // Raw text, leading whitespace included
        let brief = content.text().collect::<String>()
            .chars()
            .take(BRIEF_LENGTH)
            .collect();
        let images = self.extract_images(content, url);
        let repost_notice = self.build_repost_notice(&document);

        debug!("Parsed '{}' from {} with {} image(s)", title, url, images.len());

        Ok(ParsedArticle {
            title,
            content_html: content.inner_html(),
            brief,
            images,
            repost_notice,
        })
    }

    fn extract_title(&self, document: &Html) -> String {
        document.select(&self.title).next()
            .or_else(|| document.select(&self.page_title).next())
            .map(|element| element.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    fn extract_images(&self, content: ElementRef<'_>, page_url: &str) -> Vec<ImageRef> {
        let base = Url::parse(page_url).ok();

        content.select(&self.image)
            .filter_map(|element| element.value().attr("src"))
            .filter(|src| !src.trim().is_empty())
            .map(|src| {
                let resolved = base.as_ref()
                    .and_then(|base| base.join(src).ok())
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| src.to_string());
                ImageRef {
                    original: src.to_string(),
                    resolved,
                }
            })
            .collect()
    }

    /// Build the "reposted from" block from the page's copyright box
    fn build_repost_notice(&self, document: &Html) -> Option<String> {
        let Some(copyright) = document.select(&self.copyright).next() else {
            warn!("No copyright block found, skipping repost notice");
            return None;
        };

        let link = copyright.select(&self.link).next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or("#");

        let license = copyright.select(&self.license).next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "No license information provided".to_string());

        Some(format!(
            "<p>Reposted from: <a href=\"{href}\" target=\"_blank\">{text}</a></p><p>Copyright: {license}</p>",
            href = html_escape::encode_double_quoted_attribute(link),
            text = html_escape::encode_text(link),
            license = html_escape::encode_text(&license),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title>Fallback title</title></head>
          <body>
            <h1 id="articleContentId">  Rust ownership explained </h1>
            <div id="content_views">
              <p>Ownership is Rust's most unique feature.</p>
              <img src="/images/one.png">
              <img src="https://cdn.example.com/two.png?a=1&amp;b=2">
              <img src="">
            </div>
            <div class="article-copyright">
              <div class="creativecommons">CC BY-SA 4.0</div>
              <a href="https://blog.example.com/post/1">link</a>
            </div>
          </body>
        </html>
    "#;

    #[test]
    fn test_parse_extracts_article() {
        let parser = ArticleParser::new();
        let article = parser.parse(PAGE, "https://blog.example.com/post/1").unwrap();

        assert_eq!(article.title, "Rust ownership explained");
        assert!(article.brief.starts_with('\n'));
        assert!(article.brief.trim_start().starts_with("Ownership is Rust's most unique feature."));
        assert!(article.content_html.contains("<p>Ownership"));
        assert_eq!(article.images, vec![
            ImageRef {
                original: "/images/one.png".to_string(),
                resolved: "https://blog.example.com/images/one.png".to_string(),
            },
            ImageRef {
                original: "https://cdn.example.com/two.png?a=1&b=2".to_string(),
                resolved: "https://cdn.example.com/two.png?a=1&b=2".to_string(),
            },
        ]);

        let notice = article.repost_notice.as_deref().unwrap();
        assert!(notice.contains("href=\"https://blog.example.com/post/1\""));
        assert!(notice.contains("CC BY-SA 4.0"));
        assert!(article.full_html().ends_with(notice));
    }

    #[test]
    fn test_missing_content_is_parse_error() {
        let parser = ArticleParser::new();
        let err = parser.parse("<html><body><p>nothing</p></body></html>", "https://x.test").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_title_falls_back_and_brief_is_bounded() {
        let long_text = "a".repeat(500);
        let page = format!(
            "<html><head><title>Page</title></head><body><div id=\"content_views\">{}</div></body></html>",
            long_text
        );

        let article = ArticleParser::new().parse(&page, "https://x.test").unwrap();
        assert_eq!(article.title, "Page");
        assert_eq!(article.brief.chars().count(), BRIEF_LENGTH);
        assert!(article.repost_notice.is_none());
        assert_eq!(article.full_html(), article.content_html);
    }
}
