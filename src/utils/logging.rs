use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use std::path::PathBuf;
use std::fs;

/// Initialize the logging system
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("{}={}", env!("CARGO_CRATE_NAME"), level).parse()?)
        .add_directive("warn".parse()?);

    let fmt_layer = fmt::layer()
        .with_target(true);

    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create log directory: {}", parent.display()))?;
        }

        // Append so several runs on the same day share one file
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context(format!("Failed to open log file: {}", log_file.display()))?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Default log file: `logs/app_<date>.log` under the project data directory
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "article-crawler", "article-crawler") {
        proj_dirs.data_dir().join("logs")
    } else {
        PathBuf::from("./logs")
    };

    path.push(format!("app_{}.log", Local::now().format("%Y-%m-%d")));
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_file_is_dated() {
        let path = default_log_file();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("app_{}.log", Local::now().format("%Y-%m-%d")));
        assert_eq!(path.parent().unwrap().file_name().unwrap(), "logs");
    }
}
