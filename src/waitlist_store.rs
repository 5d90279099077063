use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::value::RawValue;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{WaitlistEmail, WaitlistEntry};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to create the waitlist directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read the waitlist file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse the waitlist file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize the waitlist")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write the waitlist file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct WaitlistStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl WaitlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(
        name = "Appending a waitlist entry",
        skip(self, email),
        fields(waitlist_email = %email)
    )]
    pub async fn append(&self, email: &WaitlistEmail) -> Result<WaitlistEntry, PersistenceError> {
        let _guard = self.write_lock.lock().await;

        self.ensure_parent_dir().await?;
        // Stored elements are written back verbatim, whatever their shape.
        let mut elements = self.load().await?;

        let entry = WaitlistEntry::new(email, Utc::now());
        elements.push(to_raw_element(&entry).map_err(PersistenceError::Serialize)?);
        self.save(&elements).await?;

        tracing::info!(total_entries = elements.len(), "Waitlist entry persisted");
        Ok(entry)
    }

    pub async fn entries(&self) -> Result<Vec<WaitlistEntry>, PersistenceError> {
        self.load()
            .await?
            .iter()
            .map(|element| {
                serde_json::from_str(element.get()).map_err(|source| PersistenceError::Parse {
                    path: self.path.clone(),
                    source,
                })
            })
            .collect()
    }

    async fn ensure_parent_dir(&self) -> Result<(), PersistenceError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|source| PersistenceError::CreateDir {
                        path: dir.to_path_buf(),
                        source,
                    })
            }
            _ => Ok(()),
        }
    }

    async fn load(&self) -> Result<Vec<Box<RawValue>>, PersistenceError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let parse_error = |source| PersistenceError::Parse {
            path: self.path.clone(),
            source,
        };

        let document: Box<RawValue> = serde_json::from_slice(&raw).map_err(parse_error)?;
        if !document.get().starts_with('[') {
            tracing::warn!(
                path = %self.path.display(),
                "Waitlist file does not hold a JSON array, starting from an empty waitlist"
            );
            return Ok(Vec::new());
        }

        serde_json::from_str(document.get()).map_err(parse_error)
    }

    async fn save(&self, elements: &[Box<RawValue>]) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec_pretty(elements).map_err(PersistenceError::Serialize)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "waitlist.json".to_string());
        let temp_path = self
            .path
            .with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4()));

        let result = match write_temp_file(&temp_path, &data).await {
            Ok(()) => fs::rename(&temp_path, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(PersistenceError::Write {
                path: self.path.clone(),
                source,
            });
        }

        Ok(())
    }
}

// Indented one level to line up inside the pretty-printed array.
fn to_raw_element(entry: &WaitlistEntry) -> Result<Box<RawValue>, serde_json::Error> {
    let pretty = serde_json::to_string_pretty(entry)?;
    RawValue::from_string(pretty.replace('\n', "\n  "))
}

async fn write_temp_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await
}
