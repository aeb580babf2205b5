use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::LoggingConfig;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Console output filtered by `RUST_LOG`, plus whatever log files are configured
pub fn init(config: &LoggingConfig) -> Result<()> {
    let files = file_layers(config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatwarden=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(files)
        .init();
    Ok(())
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// JSON file layers: everything to `file`, errors only to `error_file`
pub fn file_layers<S>(config: &LoggingConfig) -> Result<Vec<BoxedLayer<S>>>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let mut layers = Vec::new();

    if let Some(path) = &config.file {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(open_append(path)?))
                .boxed(),
        );
    }

    if let Some(path) = &config.error_file {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(open_append(path)?))
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        );
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_file_only_receives_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().join("logs").join("combined.log")),
            error_file: Some(dir.path().join("logs").join("error.log")),
        };

        let subscriber = tracing_subscriber::registry().with(file_layers(&config).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("cached media for msg-628");
            tracing::error!("send to audit chat failed");
        });

        let combined = std::fs::read_to_string(dir.path().join("logs/combined.log")).unwrap();
        assert!(combined.contains("cached media for msg-628"));
        assert!(combined.contains("send to audit chat failed"));

        let errors = std::fs::read_to_string(dir.path().join("logs/error.log")).unwrap();
        assert!(errors.contains("send to audit chat failed"));
        assert!(!errors.contains("cached media"));
        assert_eq!(errors.lines().count(), 1);
    }

    #[test]
    fn test_no_files_configured() {
        let layers =
            file_layers::<tracing_subscriber::Registry>(&LoggingConfig::default()).unwrap();
        assert!(layers.is_empty());
    }
}
