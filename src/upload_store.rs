use std::cell::RefCell;
use std::collections::HashMap;

use worker::{Cache, Response};

use crate::error::ApiError;
use crate::models::{UPLOAD_KEY_PREFIX, UploadedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Scratch storage for uploaded documents.
///
/// Handles are derived from the client filename, so a second upload with the
/// same name replaces the first.
#[allow(async_fn_in_trait)]
pub trait UploadStore {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<UploadedFile, ApiError>;

    /// `Ok(None)` when nothing is stored under `handle`.
    async fn load(&self, handle: &str) -> Result<Option<StoredUpload>, ApiError>;
}

/// Builds the handle for a client-supplied filename, keeping only its final
/// path component.
pub fn upload_handle(name: &str) -> Result<UploadedFile, ApiError> {
    let filename = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(ApiError::BadRequest(format!(
            "invalid upload filename: {name:?}"
        )));
    }

    Ok(UploadedFile {
        file_path: format!("{UPLOAD_KEY_PREFIX}{filename}"),
        filename,
    })
}

pub fn filename_from_handle(handle: &str) -> Option<&str> {
    handle
        .strip_prefix(UPLOAD_KEY_PREFIX)
        .filter(|filename| !filename.is_empty() && !filename.contains(['/', '\\']))
}

/// Synthetic origin for upload entries; the Cache API only accepts URL keys.
const CACHE_ORIGIN: &str = "https://uploads.cache.internal/";

/// Uploads kept in the Workers Cache API for `ttl_seconds`.
///
/// The Cache API silently drops writes on `*.workers.dev` hosts, so uploads
/// only survive when the worker is served from a custom domain.
#[derive(Debug, Clone)]
pub struct CacheUploadStore {
    ttl_seconds: u32,
}

impl CacheUploadStore {
    pub fn new(ttl_seconds: u32) -> Self {
        Self { ttl_seconds }
    }

    fn entry(&self, bytes: &[u8]) -> Result<Response, ApiError> {
        let mut response = Response::from_bytes(bytes.to_vec())?;
        let headers = response.headers_mut();
        headers.set("Cache-Control", &format!("public, max-age={}", self.ttl_seconds))?;
        headers.set("Content-Type", "application/octet-stream")?;
        Ok(response)
    }
}

fn entry_url(handle: &str) -> String {
    format!("{CACHE_ORIGIN}{}", urlencoding::encode(handle))
}

impl UploadStore for CacheUploadStore {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<UploadedFile, ApiError> {
        let uploaded = upload_handle(name)?;
        Cache::default()
            .put(entry_url(&uploaded.file_path), self.entry(bytes)?)
            .await?;
        Ok(uploaded)
    }

    async fn load(&self, handle: &str) -> Result<Option<StoredUpload>, ApiError> {
        let Some(filename) = filename_from_handle(handle) else {
            return Ok(None);
        };
        let Some(mut response) = Cache::default().get(entry_url(handle), true).await? else {
            return Ok(None);
        };
        Ok(Some(StoredUpload {
            filename: filename.to_string(),
            bytes: response.bytes().await?,
        }))
    }
}

/// Process-local store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryUploadStore {
    entries: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, handle: &str) -> bool {
        self.entries.borrow_mut().remove(handle).is_some()
    }
}

impl UploadStore for MemoryUploadStore {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<UploadedFile, ApiError> {
        let uploaded = upload_handle(name)?;
        self.entries
            .borrow_mut()
            .insert(uploaded.file_path.clone(), bytes.to_vec());
        Ok(uploaded)
    }

    async fn load(&self, handle: &str) -> Result<Option<StoredUpload>, ApiError> {
        let Some(filename) = filename_from_handle(handle) else {
            return Ok(None);
        };
        Ok(self
            .entries
            .borrow()
            .get(handle)
            .map(|bytes| StoredUpload {
                filename: filename.to_string(),
                bytes: bytes.clone(),
            }))
    }
}
