use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

/// Supplies URLs to a producer
pub trait UrlSource: Send {
    /// Next URL to crawl, or `None` once the source is exhausted
    fn next_url(&mut self) -> Option<String>;

    /// Lets a producer stop right after the final emission instead of
    /// waiting one more round for `next_url` to return `None`.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Fixed list of URLs emitted in order
#[derive(Debug, Clone, Default)]
pub struct StaticUrlSource {
    urls: Vec<String>,
    index: usize,
}

impl StaticUrlSource {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            index: 0,
        }
    }

    /// Load one URL per line; blank lines are skipped.
    /// A missing file yields an empty source.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("URL list not found: {}, nothing to crawl from it", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read URL list: {}", path.display()))?;

        let source = Self::new(
            contents.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        );
        info!("Loaded {} URL(s) from {}", source.len(), path.display());
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Every URL in the list, including ones already emitted
    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }

    /// Append more URLs behind the ones already loaded
    pub fn extend<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls.extend(urls.into_iter().map(Into::into));
    }
}

impl UrlSource for StaticUrlSource {
    fn next_url(&mut self) -> Option<String> {
        let url = self.urls.get(self.index).cloned()?;
        self.index += 1;
        Some(url)
    }

    fn is_exhausted(&self) -> bool {
        self.index >= self.urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_source_emits_in_order() {
        let mut source = StaticUrlSource::new(["a", "b"]);
        assert!(!source.is_exhausted());
        assert_eq!(source.next_url().as_deref(), Some("a"));
        assert_eq!(source.next_url().as_deref(), Some("b"));
        assert!(source.is_exhausted());
        assert_eq!(source.next_url(), None);
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "https://example.com/1\n\n  https://example.com/2  \n").unwrap();

        let mut source = StaticUrlSource::from_file(file.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_url().as_deref(), Some("https://example.com/1"));
        assert_eq!(source.next_url().as_deref(), Some("https://example.com/2"));
    }

    #[test]
    fn test_from_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticUrlSource::from_file(&dir.path().join("nope.txt")).unwrap();
        assert!(source.is_empty());
        assert!(source.is_exhausted());
    }
}
