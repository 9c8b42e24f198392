//! Enumeration of saved images.

use crate::store::{ImageRecord, METADATA_EXTENSION, load_record};
use replicate_mcp_common::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read-only view over the images directory.
pub struct Catalog {
    dir: PathBuf,
}

impl Catalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All valid records, oldest first.
    ///
    /// Entries whose sidecar is unreadable, whose id does not match the file
    /// name, or whose binary is missing are skipped with a warning. Only a
    /// failure to read the directory itself is an error.
    pub async fn list(&self) -> Result<Vec<ImageRecord>, Error> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::storage(&self.dir, e))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&self.dir, e))?
        {
            let path = entry.path();
            if !is_metadata_file(&path) {
                continue;
            }

            match load_record(&self.dir, &path).await {
                Ok(record) => records.push(record),
                Err(reason) => {
                    skipped += 1;
                    warn!(path = %path.display(), reason = %reason, "Skipping catalog entry");
                }
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!(count = records.len(), skipped, "Catalog listed");
        Ok(records)
    }
}

/// Visible `*.json` files. Hidden names cover in-flight `.part` files.
fn is_metadata_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.')
        && path.extension().and_then(|e| e.to_str()) == Some(METADATA_EXTENSION)
}
