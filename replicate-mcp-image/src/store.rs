//! Local image library.
//!
//! Every saved image is a pair of files in the images directory: the binary
//! (`<file_name>`, usually `<id>.png`) and a JSON sidecar `<id>.json`
//! describing it. Both are written to hidden `.part` files, flushed, and
//! linked into place without replacing existing files. Publishing the
//! sidecar is the commit point: a record is visible exactly when its sidecar
//! exists, and the binary is always published before it.

use chrono::{DateTime, Utc};
use replicate_mcp_common::config::Config;
use replicate_mcp_common::error::Error;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// MIME type of stored images.
pub const IMAGE_MIME_TYPE: &str = "image/png";

/// Extension of stored image binaries.
pub const IMAGE_EXTENSION: &str = "png";

/// Extension of metadata sidecars.
pub const METADATA_EXTENSION: &str = "json";

/// Maximum length of an id or file name.
pub const MAX_NAME_LENGTH: usize = 128;

const TEMP_SUFFIX: &str = ".part";

/// Metadata of one saved image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Stable identifier, also the sidecar file stem
    pub id: String,
    /// Prompt the image was generated from
    pub prompt: String,
    /// When the record was committed
    pub created_at: DateTime<Utc>,
    /// Binary file name inside the images directory
    pub file_name: String,
    pub mime_type: String,
    /// URL the binary was fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Absolute location of the binary, resolved on load
    #[serde(skip)]
    pub binary_path: PathBuf,
}

impl ImageRecord {
    /// `image://<id>` resource URI.
    pub fn uri(&self) -> String {
        crate::resources::image_uri(&self.id)
    }
}

/// Optional knobs for [`ImageStore::save`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Name for the binary instead of `<id>.png`
    pub custom_filename: Option<String>,
}

/// Why a sidecar could not be turned into a record.
#[derive(Debug)]
pub(crate) enum EntryError {
    Missing,
    Corrupt(String),
    Io(io::Error),
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryError::Missing => write!(f, "missing"),
            EntryError::Corrupt(reason) => write!(f, "corrupt: {}", reason),
            EntryError::Io(e) => write!(f, "unreadable: {}", e),
        }
    }
}

/// Whether `name` may be used as an id or file name in the images directory.
///
/// Allows ASCII letters, digits, `.`, `_` and `-`, up to [`MAX_NAME_LENGTH`],
/// and rejects hidden names. This keeps every name a single path component.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Parse and check an image source URL.
pub fn validate_image_url(image_url: &str) -> Result<Url, Error> {
    let url = Url::parse(image_url.trim())
        .map_err(|e| Error::validation(format!("image_url is not a valid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::validation(format!(
            "image_url must use http or https, got '{}'",
            other
        ))),
    }
}

/// Turn a user-supplied file name into the binary name.
///
/// A trailing `.png` is optional; it is always present in the result.
pub fn normalize_custom_filename(name: &str) -> Result<String, Error> {
    let name = name.trim();
    let stem = match name.len().checked_sub(4) {
        Some(split) if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".png") => {
            &name[..split]
        }
        _ => name,
    };
    let file_name = format!("{}.{}", stem, IMAGE_EXTENSION);

    if stem.is_empty() || !is_valid_name(&file_name) {
        return Err(Error::validation(format!(
            "custom_filename '{}' must be 1-{} characters of letters, digits, '.', '_' or '-' and must not start with '.'",
            name,
            MAX_NAME_LENGTH - IMAGE_EXTENSION.len() - 1
        )));
    }
    Ok(file_name)
}

/// Persistent store of generated images.
pub struct ImageStore {
    dir: PathBuf,
    http: reqwest::Client,
    request_timeout_secs: u64,
    max_download_bytes: u64,
}

impl ImageStore {
    /// Open the store described by `config`, creating its directory.
    pub async fn open(config: &Config, http: reqwest::Client) -> Result<Self, Error> {
        Self::open_dir(
            &config.images_dir,
            http,
            config.request_timeout_secs,
            config.max_download_bytes,
        )
        .await
    }

    /// Open a store rooted at `dir`.
    pub async fn open_dir(
        dir: impl Into<PathBuf>,
        http: reqwest::Client,
        request_timeout_secs: u64,
        max_download_bytes: u64,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(&dir, e))?;
        debug!(dir = %dir.display(), "Image store opened");

        Ok(Self {
            dir,
            http,
            request_timeout_secs,
            max_download_bytes,
        })
    }

    /// Directory holding binaries and sidecars.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Catalog over this store's directory.
    pub fn catalog(&self) -> crate::catalog::Catalog {
        crate::catalog::Catalog::new(self.dir.clone())
    }

    /// Download `image_url` and persist it with `prompt` as a new record.
    ///
    /// Nothing becomes visible unless the whole save succeeds. If the future
    /// is dropped mid-way, partially written files are removed.
    #[instrument(level = "info", name = "store_save", skip(self, prompt, options), fields(url = %image_url))]
    pub async fn save(
        &self,
        image_url: &str,
        prompt: &str,
        options: SaveOptions,
    ) -> Result<ImageRecord, Error> {
        let url = validate_image_url(image_url)?;
        if prompt.trim().is_empty() {
            return Err(Error::validation("prompt cannot be empty"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let file_name = match options.custom_filename.as_deref() {
            Some(name) => {
                let file_name = normalize_custom_filename(name)?;
                if file_exists(&self.dir.join(&file_name)).await? {
                    return Err(Error::validation(format!(
                        "an image named '{}' already exists",
                        file_name
                    )));
                }
                file_name
            }
            None => format!("{}.{}", id, IMAGE_EXTENSION),
        };

        let bytes = self.fetch(&url).await?;
        debug!(id = %id, bytes = bytes.len(), "Image downloaded");

        let binary_path = write_atomically(&self.dir, &file_name, &bytes).await?;
        let mut binary_guard = RemoveOnDrop::new(binary_path.clone());

        let record = ImageRecord {
            id: id.clone(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
            file_name,
            mime_type: IMAGE_MIME_TYPE.to_string(),
            source_url: Some(url.to_string()),
            size_bytes: bytes.len() as u64,
            binary_path,
        };

        let sidecar = serde_json::to_vec_pretty(&record)
            .map_err(|e| Error::storage(&self.dir, format!("Failed to encode metadata: {}", e)))?;
        write_atomically(&self.dir, &metadata_file_name(&id), &sidecar).await?;
        binary_guard.disarm();
        sync_dir(&self.dir).await;

        info!(id = %record.id, file = %record.file_name, size_bytes = record.size_bytes, "Image saved");
        Ok(record)
    }

    /// Download an image, bounded by the request timeout and the size limit.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let timeout_secs = self.request_timeout_secs;
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::timeout(timeout_secs)
            } else {
                Error::fetch(url.as_str(), e.status().map(|s| s.as_u16()), e.to_string())
            }
        };

        let mut response = self
            .http
            .get(url.clone())
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                url.as_str(),
                Some(status.as_u16()),
                format!("server returned {}", status),
            ));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_download_bytes {
                return Err(self.too_large(url));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_err)? {
            if (bytes.len() + chunk.len()) as u64 > self.max_download_bytes {
                return Err(self.too_large(url));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(Error::fetch(url.as_str(), Some(status.as_u16()), "empty response body"));
        }
        Ok(bytes)
    }

    fn too_large(&self, url: &Url) -> Error {
        Error::fetch(
            url.as_str(),
            None,
            format!("image exceeds {} bytes", self.max_download_bytes),
        )
    }

    /// Metadata of a saved image.
    ///
    /// Malformed ids, missing or corrupt sidecars and missing binaries are
    /// all reported as not found.
    pub async fn record(&self, id: &str) -> Result<ImageRecord, Error> {
        if !is_valid_name(id) {
            return Err(Error::not_found(id));
        }
        let path = self.dir.join(metadata_file_name(id));
        match load_record(&self.dir, &path).await {
            Ok(record) => Ok(record),
            Err(EntryError::Io(e)) => Err(Error::storage(&path, e)),
            Err(reason) => {
                debug!(id = %id, reason = %reason, "Record not readable");
                Err(Error::not_found(id))
            }
        }
    }

    /// Binary content of a saved image.
    pub async fn read(&self, id: &str) -> Result<(ImageRecord, Vec<u8>), Error> {
        let record = self.record(id).await?;
        match tokio::fs::read(&record.binary_path).await {
            Ok(bytes) => Ok((record, bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::not_found(id)),
            Err(e) => Err(Error::storage(&record.binary_path, e)),
        }
    }
}

pub(crate) fn metadata_file_name(id: &str) -> String {
    format!("{}.{}", id, METADATA_EXTENSION)
}

/// Load and check the record stored in `metadata_path`.
pub(crate) async fn load_record(dir: &Path, metadata_path: &Path) -> Result<ImageRecord, EntryError> {
    let raw = match tokio::fs::read(metadata_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(EntryError::Missing),
        Err(e) => return Err(EntryError::Io(e)),
    };

    let mut record: ImageRecord =
        serde_json::from_slice(&raw).map_err(|e| EntryError::Corrupt(e.to_string()))?;

    let stem = metadata_path.file_stem().and_then(|s| s.to_str());
    if stem != Some(record.id.as_str()) {
        return Err(EntryError::Corrupt(format!(
            "id '{}' does not match file name",
            record.id
        )));
    }
    if !is_valid_name(&record.file_name) {
        return Err(EntryError::Corrupt(format!(
            "invalid file_name '{}'",
            record.file_name
        )));
    }

    let binary_path = dir.join(&record.file_name);
    match tokio::fs::metadata(&binary_path).await {
        Ok(meta) if meta.is_file() => record.size_bytes = meta.len(),
        Ok(_) => return Err(EntryError::Corrupt("binary is not a file".to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EntryError::Corrupt(format!(
                "binary '{}' is missing",
                record.file_name
            )));
        }
        Err(e) => return Err(EntryError::Io(e)),
    }
    record.binary_path = binary_path;

    Ok(record)
}

async fn file_exists(path: &Path) -> Result<bool, Error> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::storage(path, e))
}

/// Write `bytes` to `dir/<name>` through a hidden temporary file.
///
/// The final name is published with a hard link, which never replaces an
/// existing file. A name that is already taken is a validation error and the
/// existing file is left untouched.
async fn write_atomically(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
    let final_path = dir.join(name);
    let temp_path = dir.join(format!(
        ".{}.{}{}",
        name,
        uuid::Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ));

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await
        .map_err(|e| Error::storage(&temp_path, e))?;
    let _temp_guard = RemoveOnDrop::new(temp_path.clone());

    file.write_all(bytes)
        .await
        .map_err(|e| Error::storage(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| Error::storage(&temp_path, e))?;
    drop(file);

    match tokio::fs::hard_link(&temp_path, &final_path).await {
        Ok(()) => Ok(final_path),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::validation(format!(
            "an image named '{}' already exists",
            name
        ))),
        Err(e) => Err(Error::storage(&final_path, e)),
    }
}

/// Flush directory entries so new links survive a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    let result = match tokio::fs::File::open(dir).await {
        Ok(handle) => handle.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(dir = %dir.display(), error = %e, "Failed to sync images directory");
    }
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) {}

/// Removes a file when dropped unless disarmed.
///
/// Covers both error returns and cancellation of the owning future.
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove partial file");
                }
            }
        }
    }
}
