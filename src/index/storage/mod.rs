
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexEntry, VectorIndex};
use crate::documents::Document;
use crate::{Result, RetrievalError};

pub const FORMAT_VERSION: u32 = 1;

/// On-disk layout, written from borrowed entries.
#[derive(Serialize)]
struct StoredIndexRef<'a> {
    format_version: u32,
    dimension: usize,
    count: usize,
    model: Option<&'a str>,
    created_at: DateTime<Utc>,
    entries: Vec<StoredEntryRef<'a>>,
}

#[derive(Serialize)]
struct StoredEntryRef<'a> {
    id: usize,
    content: &'a str,
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct StoredIndex {
    format_version: u32,
    dimension: usize,
    count: usize,
    model: Option<String>,
    created_at: DateTime<Utc>,
    entries: Vec<StoredEntry>,
}

#[derive(Deserialize)]
struct StoredEntry {
    id: usize,
    content: String,
    vector: Vec<f32>,
}

impl VectorIndex {
    /// Persist the whole index to `path`.
    ///
    /// The data is written to a temporary file next to `path`, flushed to
    /// disk and then renamed over `path`, so readers see either the previous
    /// file or the complete new one.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file_name = path.file_name().ok_or_else(|| {
            RetrievalError::InvalidArgument(format!(
                "Index path has no file name: {}",
                path.display()
            ))
        })?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(&parent)?;

        let temp_path = parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4()
        ));

        let stored = StoredIndexRef {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            count: self.entries.len(),
            model: self.model.as_deref(),
            created_at: self.created_at,
            entries: self
                .entries
                .iter()
                .map(|entry| StoredEntryRef {
                    id: entry.document.id,
                    content: &entry.document.content,
                    vector: &entry.vector,
                })
                .collect(),
        };

        debug!("Writing index to temporary file {}", temp_path.display());

        let written =
            write_synced(&temp_path, &stored).and_then(|()| fs::rename(&temp_path, path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                warn!(
                    "Failed to remove temporary index file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(e.into());
        }

        sync_dir(&parent);

        info!(
            "Saved index with {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Load an index written by [`VectorIndex::save`].
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let stored: StoredIndex = serde_json::from_slice(&bytes).map_err(|e| {
            RetrievalError::CorruptIndex(format!("{}: {}", path.display(), e))
        })?;

        let index = Self::from_stored(stored)?;

        info!(
            "Loaded index with {} entries of dimension {} from {}",
            index.entries.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }

    fn from_stored(stored: StoredIndex) -> Result<Self> {
        let corrupt = |message: String| Err(RetrievalError::CorruptIndex(message));

        if stored.format_version != FORMAT_VERSION {
            return corrupt(format!(
                "Unsupported format version {} (expected {})",
                stored.format_version, FORMAT_VERSION
            ));
        }

        if stored.count != stored.entries.len() {
            return corrupt(format!(
                "Header declares {} entries but {} are stored",
                stored.count,
                stored.entries.len()
            ));
        }

        if stored.entries.is_empty() || stored.dimension == 0 {
            return corrupt("Index has no entries".to_string());
        }

        let mut entries = Vec::with_capacity(stored.entries.len());
        for (position, entry) in stored.entries.into_iter().enumerate() {
            if entry.id != position {
                return corrupt(format!(
                    "Entry at position {} has id {}",
                    position, entry.id
                ));
            }
            if entry.vector.len() != stored.dimension {
                return corrupt(format!(
                    "Entry {} has dimension {} but the index declares {}",
                    entry.id,
                    entry.vector.len(),
                    stored.dimension
                ));
            }
            entries.push(IndexEntry {
                document: Document {
                    id: entry.id,
                    content: entry.content,
                },
                vector: entry.vector,
            });
        }

        Ok(Self {
            dimension: stored.dimension,
            model: stored.model,
            created_at: stored.created_at,
            entries,
        })
    }
}

fn write_synced<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Makes the rename itself durable.
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("Could not sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
