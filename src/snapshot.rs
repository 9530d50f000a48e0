//! On-disk persistence for the vector index.
//!
//! Two artifacts live in the configured index directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.bin` | `FOLIOIDX` magic, format version (u32), dimension (u32), count (u64), then `count × dimension` little-endian f32 |
//! | `metadata.json` | ordered list of `{vector_id, document_id, chunk_index}`, position = `vector_id` |
//!
//! Saves write both files to temporary siblings, fsync them, and only then
//! rename them over the targets (index first, metadata last). The previous
//! `index.bin` is linked to `index.bin.bak` for the duration of the swap
//! and restored if the metadata rename fails, so a failed save leaves the
//! previous pair in place. The loader cross-checks the vector count in
//! `index.bin` against the metadata list and falls back to the backup when
//! only the index was swapped.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use folio_core::embedding::{blob_to_vec, vec_to_blob};
use folio_core::error::{IndexError, IndexResult};
use folio_core::index::{IndexPersistence, IndexSnapshot};
use folio_core::models::EmbeddingRecord;

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const INDEX_BACKUP_FILE: &str = "index.bin.bak";

const MAGIC: &[u8; 8] = b"FOLIOIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;

/// File-backed [`IndexPersistence`].
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    dir: PathBuf,
}

impl FileSnapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Combined size of both artifacts in bytes (0 for missing files).
    pub fn size_on_disk(&self) -> u64 {
        [self.index_path(), self.metadata_path()]
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }
}

impl IndexPersistence for FileSnapshot {
    fn load(&self) -> IndexResult<Option<IndexSnapshot>> {
        let index_path = self.index_path();
        let metadata_path = self.metadata_path();

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => return Ok(None),
            (true, true) => {}
            (has_index, _) => {
                let missing = if has_index { METADATA_FILE } else { INDEX_FILE };
                return Err(IndexError::CorruptSnapshot(format!(
                    "{} is missing from {}",
                    missing,
                    self.dir.display()
                )));
            }
        }

        let bytes = fs::read(&index_path).map_err(|e| {
            IndexError::CorruptSnapshot(format!("reading {}: {}", index_path.display(), e))
        })?;
        let (dimension, vectors) = decode_index(&bytes)?;

        let json = fs::read(&metadata_path).map_err(|e| {
            IndexError::CorruptSnapshot(format!("reading {}: {}", metadata_path.display(), e))
        })?;
        let records: Vec<EmbeddingRecord> = serde_json::from_slice(&json).map_err(|e| {
            IndexError::CorruptSnapshot(format!("parsing {}: {}", metadata_path.display(), e))
        })?;

        let (dimension, vectors) = if records.len() * dimension == vectors.len() {
            (dimension, vectors)
        } else if let Some(recovered) = self.recover_from_backup(&records) {
            tracing::warn!(
                dir = %self.dir.display(),
                "{} does not match {}; using {}",
                INDEX_FILE,
                METADATA_FILE,
                INDEX_BACKUP_FILE
            );
            recovered
        } else {
            return Err(IndexError::CorruptSnapshot(format!(
                "{} holds {} vectors but {} lists {} records",
                INDEX_FILE,
                vectors.len() / dimension.max(1),
                METADATA_FILE,
                records.len()
            )));
        };

        tracing::debug!(
            dir = %self.dir.display(),
            vectors = records.len(),
            dimension,
            "read index snapshot"
        );
        Ok(Some(IndexSnapshot {
            dimension,
            vectors,
            records,
        }))
    }

    fn save(&self, snapshot: &IndexSnapshot) -> IndexResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| persistence_error(&self.dir, e))?;

        let index_bytes = encode_index(snapshot);
        let metadata_bytes = serde_json::to_vec(&snapshot.records)
            .map_err(|e| IndexError::PersistenceFailure(format!("encoding metadata: {}", e)))?;

        let index_tmp = write_temp(&self.index_path(), &index_bytes)?;
        let metadata_tmp = match write_temp(&self.metadata_path(), &metadata_bytes) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&index_tmp);
                return Err(e);
            }
        };

        self.commit(&index_tmp, &metadata_tmp, |from, to| fs::rename(from, to))?;
        sync_dir(&self.dir);

        tracing::debug!(
            dir = %self.dir.display(),
            vectors = snapshot.records.len(),
            "saved index snapshot"
        );
        Ok(())
    }
}

impl FileSnapshot {
    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(INDEX_BACKUP_FILE)
    }

    /// Move both staged files into place, index first.
    ///
    /// The previous `index.bin` is kept as `index.bin.bak` until the
    /// metadata rename lands, and is moved back if that rename fails.
    fn commit<R>(&self, index_tmp: &Path, metadata_tmp: &Path, rename: R) -> IndexResult<()>
    where
        R: Fn(&Path, &Path) -> std::io::Result<()>,
    {
        let index_path = self.index_path();
        let metadata_path = self.metadata_path();
        let backup_path = self.backup_path();

        let discard_temps = || {
            let _ = fs::remove_file(index_tmp);
            let _ = fs::remove_file(metadata_tmp);
        };

        let _ = fs::remove_file(&backup_path);
        let has_previous = index_path.exists();
        if has_previous {
            if let Err(e) = fs::hard_link(&index_path, &backup_path)
                .or_else(|_| fs::copy(&index_path, &backup_path).map(|_| ()))
            {
                discard_temps();
                return Err(persistence_error(&backup_path, e));
            }
        }

        if let Err(e) = rename(index_tmp, &index_path) {
            discard_temps();
            let _ = fs::remove_file(&backup_path);
            return Err(persistence_error(&index_path, e));
        }

        if let Err(e) = rename(metadata_tmp, &metadata_path) {
            let _ = fs::remove_file(metadata_tmp);
            let restored = if has_previous {
                rename(&backup_path, &index_path)
            } else {
                fs::remove_file(&index_path)
            };
            if let Err(restore) = restored {
                tracing::error!(
                    dir = %self.dir.display(),
                    error = %restore,
                    "failed to restore previous index after metadata rename failed"
                );
            }
            return Err(persistence_error(&metadata_path, e));
        }

        let _ = fs::remove_file(&backup_path);
        Ok(())
    }

    /// Pair the backed-up index with the current metadata, if they match.
    fn recover_from_backup(&self, records: &[EmbeddingRecord]) -> Option<(usize, Vec<f32>)> {
        let bytes = fs::read(self.backup_path()).ok()?;
        let (dimension, vectors) = decode_index(&bytes).ok()?;
        (records.len() * dimension == vectors.len()).then_some((dimension, vectors))
    }
}

fn persistence_error(path: &Path, e: std::io::Error) -> IndexError {
    IndexError::PersistenceFailure(format!("{}: {}", path.display(), e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(os)
}

/// Write `bytes` to a synced temporary sibling of `path` and return its path.
fn write_temp(path: &Path, bytes: &[u8]) -> IndexResult<PathBuf> {
    let tmp = temp_path(path);
    let result = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    match result {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(persistence_error(&tmp, e))
        }
    }
}

fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

pub fn encode_index(snapshot: &IndexSnapshot) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + snapshot.vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(snapshot.dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(snapshot.records.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&vec_to_blob(&snapshot.vectors));
    bytes
}

/// Decode `index.bin`, returning the dimension and the flat vector buffer.
pub fn decode_index(bytes: &[u8]) -> IndexResult<(usize, Vec<f32>)> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(IndexError::CorruptSnapshot(format!(
            "{} is not a folio index",
            INDEX_FILE
        )));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != FORMAT_VERSION {
        return Err(IndexError::CorruptSnapshot(format!(
            "unsupported index format version {}",
            version
        )));
    }
    let dimension = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[16..24]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| IndexError::CorruptSnapshot("index header overflows".into()))?;
    if body.len() != expected {
        return Err(IndexError::CorruptSnapshot(format!(
            "{} declares {} vectors of dimension {} but holds {} bytes",
            INDEX_FILE,
            count,
            dimension,
            body.len()
        )));
    }
    Ok((dimension, blob_to_vec(body)))
}
