pub mod article;
pub mod consumer;
pub mod controller;
pub mod producer;
pub mod scheduler;
pub mod source;
pub mod task;
pub mod worker;

// Re-export common types
pub use article::ArticleProcessor;
pub use consumer::{Consumer, ConsumerReport, Processor};
pub use controller::{CrawlReport, CrawlerController, Pipeline};
pub use producer::{Producer, ProducerReport};
pub use scheduler::Scheduler;
pub use source::{StaticUrlSource, UrlSource};
pub use task::{ArticleRecord, ProcessError, Task};
pub use worker::{WorkerHandle, WorkerRole, WorkerState};
