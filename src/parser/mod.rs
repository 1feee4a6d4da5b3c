pub mod article;

// Re-export common types
pub use article::{ArticleParser, ImageRef, ParsedArticle};
