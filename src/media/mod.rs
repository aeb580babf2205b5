pub mod mime;

use anyhow::{Context, Result};
use base64::Engine;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::BotError;
use crate::platform::MediaPayload;

/// Key under which a sender's latest attachment is cached.
///
/// The key ends up in a file name, so only plain digit strings are accepted.
pub fn sender_key(number: &str) -> Result<String, BotError> {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BotError::InvalidContact(number.to_string()));
    }
    Ok(format!("msg-{}", number))
}

/// Where the sender → file association lives
#[derive(Debug, Clone)]
enum Backing {
    File(PathBuf),
    InMemory,
}

/// Cache of the most recent attachment received from each sender.
///
/// Raw bytes land in `<root>/<mime type>/<sender key>.<ext>`; the sender key →
/// file path association is kept in SQLite so it survives restarts. The
/// database is opened on first use.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
    backing: Backing,
    conn: Arc<OnceCell<Arc<Mutex<Connection>>>>,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backing: Backing::File(database_path.into()),
            conn: Arc::new(OnceCell::new()),
        }
    }

    /// Media files under `root`, associations in an in-memory database (for testing)
    pub fn in_memory(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backing: Backing::InMemory,
            conn: Arc::new(OnceCell::new()),
        }
    }

    async fn connection(&self) -> Result<&Arc<Mutex<Connection>>> {
        self.conn
            .get_or_try_init(|| async { Self::open(&self.backing).map(|c| Arc::new(Mutex::new(c))) })
            .await
    }

    fn open(backing: &Backing) -> Result<Connection> {
        let conn = match backing {
            Backing::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {}", parent.display())
                    })?;
                }
                let conn = Connection::open(path)
                    .with_context(|| format!("Failed to open database: {}", path.display()))?;
                // journal_mode PRAGMA returns the resulting mode, so use query_row
                let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
                info!("Media cache index opened at: {}", path.display());
                conn
            }
            Backing::InMemory => Connection::open_in_memory()?,
        };

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS media_cache (
                sender_key TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );
            ",
        )
        .context("Failed to create media_cache table")?;

        Ok(conn)
    }

    /// Persist an attachment for `key`, replacing whatever was cached for it before.
    pub async fn put(&self, key: &str, media: &MediaPayload) -> Result<PathBuf> {
        let mime_type = mime::essence(&media.mime_type);
        let extension = mime::extension_for(&mime_type)
            .ok_or_else(|| BotError::UnknownMimeType(media.mime_type.clone()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(media.data.trim())
            .context("Attachment data is not valid base64")?;

        let dir = self.root.join(&mime_type);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| BotError::Write {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(format!("{}.{}", key, extension));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| BotError::Write {
                path: path.clone(),
                source,
            })?;

        let path_str = path.to_string_lossy().to_string();
        let conn = self.connection().await?.lock().await;
        conn.execute(
            "INSERT INTO media_cache (sender_key, file_path, mime_type, cached_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sender_key) DO UPDATE SET
                file_path = excluded.file_path,
                mime_type = excluded.mime_type,
                cached_at = excluded.cached_at",
            rusqlite::params![key, &path_str, &mime_type, chrono::Utc::now().to_rfc3339()],
        )
        .context("Failed to record cached media")?;

        debug!("Cached {} bytes for {} at {}", bytes.len(), key, path_str);
        Ok(path)
    }

    /// Path of the media last cached for `key`. Never touches the media files.
    pub async fn get(&self, key: &str) -> Result<Option<PathBuf>> {
        let conn = self.connection().await?.lock().await;
        let path: Option<String> = conn
            .query_row(
                "SELECT file_path FROM media_cache WHERE sender_key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up cached media")?;
        Ok(path.map(PathBuf::from))
    }

    /// Number of senders with cached media
    pub async fn count(&self) -> Result<usize> {
        let conn = self.connection().await?.lock().await;
        let count: i64 = conn
            .query_row("SELECT count(*) FROM media_cache", [], |row| row.get(0))
            .context("Failed to count cached media")?;
        Ok(count as usize)
    }
}

impl MediaStore {
    /// Delete cached files that no sender key points to any more.
    ///
    /// A sender whose attachment type changes leaves the previous file behind in
    /// another `<mime>` directory. Returns the number of files removed.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let known: HashSet<PathBuf> = {
            let conn = self.connection().await?.lock().await;
            let mut stmt = conn.prepare("SELECT file_path FROM media_cache")?;
            let paths = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list cached media")?;
            paths.into_iter().map(PathBuf::from).collect()
        };

        let mut removed = 0;
        for type_dir in list_dirs(&self.root).await? {
            for subtype_dir in list_dirs(&type_dir).await? {
                let mut entries = tokio::fs::read_dir(&subtype_dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    let cached_name = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.starts_with("msg-"));
                    if !cached_name || !entry.file_type().await?.is_file() || known.contains(&path) {
                        continue;
                    }
                    tokio::fs::remove_file(&path)
                        .await
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                    debug!("Removed orphaned media {}", path.display());
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

async fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Load a cached file back into an outbound attachment
pub async fn load_from_path(path: &Path) -> Result<MediaPayload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read cached media: {}", path.display()))?;
    let mime_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime::mime_for_extension)
        .unwrap_or("application/octet-stream");

    let mut payload = MediaPayload::from_base64(
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes),
    );
    payload.filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    Ok(payload)
}
