use std::path::PathBuf;

/// Failures raised while handling chat events.
///
/// Only `DuplicateName` is allowed to stop the process (it can only happen while
/// the registry is built at startup). Everything else is logged at the event
/// boundary and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("command name already registered: {0}")]
    DuplicateName(String),

    #[error("no file extension known for MIME type: {0}")]
    UnknownMimeType(String),

    #[error("failed to write media to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("contact number is not a plain digit string: {0:?}")]
    InvalidContact(String),

    #[error("no cached media for {0}")]
    MissingMedia(String),

    #[error("command {command} failed: {cause:#}")]
    Action {
        command: String,
        cause: anyhow::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),
}
