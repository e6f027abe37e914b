//! Preview image cache with single-flight fetches.
//!
//! Thumbnails are keyed by file identity (path + mtime + size) and size
//! class, never by backend plate id. Concurrent requests for the same key
//! share one backend fetch; a missing or failed image yields a synthesized
//! placeholder with a short TTL so the next consumer retries soon, while a
//! real image is never replaced by a placeholder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tokio::sync::broadcast;
use tokio::time::Instant;

use orion_backend::{BackendClient, BackendError};
use orion_model::{FileRef, ItemLocation, ThumbnailSize};

/// Placeholder entries expire quickly so transient fetch failures recover.
const PLACEHOLDER_TTL: Duration = Duration::from_secs(5);
/// Listing tiles churn as the user browses; keep them briefly.
const SMALL_TTL: Duration = Duration::from_secs(30);
/// The status backdrop is stable for the length of a print.
const LARGE_TTL: Duration = Duration::from_secs(120);

/// A decoded-enough preview: PNG bytes plus the dimensions they were
/// requested at. Cloning is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Arc<Vec<u8>>,
    /// True when these bytes are a synthesized fill-in, not backend data.
    pub placeholder: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThumbKey {
    location: ItemLocation,
    path: String,
    modified_at: Option<i64>,
    size: Option<u64>,
    width: u32,
    height: u32,
}

impl ThumbKey {
    fn new(file: &FileRef, size: ThumbnailSize) -> Self {
        let (width, height) = size.dimensions();
        Self {
            location: file.location,
            path: file
                .path
                .trim_start_matches('/')
                .to_ascii_lowercase(),
            modified_at: file.modified_at,
            size: file.size,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    thumb: Thumbnail,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, size: ThumbnailSize) -> bool {
        let ttl = if self.thumb.placeholder {
            PLACEHOLDER_TTL
        } else {
            match size {
                ThumbnailSize::Small => SMALL_TTL,
                ThumbnailSize::Large => LARGE_TTL,
            }
        };
        self.fetched_at.elapsed() < ttl
    }
}

/// Shared thumbnail cache over one backend.
#[derive(Debug)]
pub struct ThumbnailCache {
    backend: Arc<dyn BackendClient>,
    entries: DashMap<ThumbKey, CacheEntry>,
    pending: Mutex<HashMap<ThumbKey, broadcast::Sender<Thumbnail>>>,
}

impl ThumbnailCache {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            entries: DashMap::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a thumbnail for a file named by listing coordinates.
    ///
    /// When `file` is provided it is used directly; otherwise the file is
    /// resolved from a fresh listing of `subdirectory` (falling back to the
    /// location root) by case-insensitive name match. Resolution failure
    /// still returns a placeholder so callers always get drawable bytes.
    pub async fn get_thumbnail(
        &self,
        location: ItemLocation,
        subdirectory: &str,
        file_name: &str,
        file: Option<&FileRef>,
        size: ThumbnailSize,
        force_refresh: bool,
    ) -> Thumbnail {
        let record = match file {
            Some(record) => record.clone(),
            None => match self
                .resolve_record(location, subdirectory, file_name)
                .await
            {
                Some(record) => record,
                None => {
                    log::debug!(
                        "[ThumbnailCache] could not resolve {}:{}/{}",
                        location.as_str(),
                        subdirectory,
                        file_name
                    );
                    return placeholder_thumbnail(size);
                }
            },
        };
        self.get_for_file(&record, size, force_refresh).await
    }

    /// Fetch a thumbnail for an already-resolved file reference.
    pub async fn get_for_file(
        &self,
        file: &FileRef,
        size: ThumbnailSize,
        force_refresh: bool,
    ) -> Thumbnail {
        let key = ThumbKey::new(file, size);
        loop {
            if !force_refresh {
                if let Some(entry) = self.entries.get(&key) {
                    if entry.is_fresh(size) {
                        return entry.thumb.clone();
                    }
                }
            }

            // Single flight: the first caller for a key fetches, the rest
            // wait on its broadcast.
            let waiter = {
                let mut pending = match self.pending.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match pending.get(&key) {
                    Some(tx) => Some(tx.subscribe()),
                    None => {
                        let (tx, _rx) = broadcast::channel(4);
                        pending.insert(key.clone(), tx);
                        None
                    }
                }
            };

            match waiter {
                Some(mut rx) => match rx.recv().await {
                    Ok(thumb) => return thumb,
                    // Leader dropped or we lagged; take another lap.
                    Err(_) => continue,
                },
                None => {
                    let thumb = self.fetch_and_store(file, &key, size).await;
                    let tx = {
                        let mut pending = match self.pending.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        pending.remove(&key)
                    };
                    if let Some(tx) = tx {
                        let _ = tx.send(thumb.clone());
                    }
                    return thumb;
                }
            }
        }
    }

    async fn fetch_and_store(
        &self,
        file: &FileRef,
        key: &ThumbKey,
        size: ThumbnailSize,
    ) -> Thumbnail {
        let fetched = if file.has_thumbnail {
            self.backend.get_file_thumbnail(file).await
        } else {
            Err(BackendError::Unsupported("file has no preview image"))
        };

        let thumb = match fetched {
            Ok(bytes) if !bytes.is_empty() => {
                let (width, height) = size.dimensions();
                Thumbnail {
                    bytes: Arc::new(bytes),
                    placeholder: false,
                    width,
                    height,
                }
            }
            other => {
                if let Err(err) = &other {
                    log::debug!(
                        "[ThumbnailCache] fetch failed for {}: {}",
                        file.path,
                        err
                    );
                }
                // Never downgrade: a stale real image beats a placeholder.
                if let Some(existing) = self.entries.get(key) {
                    if !existing.thumb.placeholder {
                        let thumb = existing.thumb.clone();
                        drop(existing);
                        self.entries.insert(
                            key.clone(),
                            CacheEntry {
                                thumb: thumb.clone(),
                                fetched_at: Instant::now(),
                            },
                        );
                        return thumb;
                    }
                }
                placeholder_thumbnail(size)
            }
        };

        self.entries.insert(
            key.clone(),
            CacheEntry {
                thumb: thumb.clone(),
                fetched_at: Instant::now(),
            },
        );
        thumb
    }

    async fn resolve_record(
        &self,
        location: ItemLocation,
        subdirectory: &str,
        file_name: &str,
    ) -> Option<FileRef> {
        let wanted = file_name.to_ascii_lowercase();
        for dir in listing_candidates(subdirectory) {
            let items = match self.backend.list_items(location, &dir).await {
                Ok(items) => items,
                Err(err) => {
                    log::debug!(
                        "[ThumbnailCache] listing {}:{} failed: {}",
                        location.as_str(),
                        dir,
                        err
                    );
                    continue;
                }
            };
            let hit = items.into_iter().find(|item| {
                item.name.to_ascii_lowercase() == wanted
                    || item
                        .path_candidates()
                        .iter()
                        .any(|c| c.to_ascii_lowercase() == wanted)
            });
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

fn listing_candidates(subdirectory: &str) -> Vec<String> {
    let trimmed = subdirectory.trim_matches('/');
    if trimmed.is_empty() {
        vec![String::new()]
    } else {
        vec![trimmed.to_string(), String::new()]
    }
}

/// Synthesize a dark PNG fill-in at the requested dimensions.
pub fn placeholder_thumbnail(size: ThumbnailSize) -> Thumbnail {
    let (width, height) = size.dimensions();
    let canvas = RgbaImage::from_pixel(width, height, Rgba([26, 26, 30, 255]));
    let mut bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
    if let Err(err) = encoder.write_image(
        canvas.as_raw(),
        width,
        height,
        ExtendedColorType::Rgba8,
    ) {
        log::warn!("[ThumbnailCache] placeholder encode failed: {err}");
        bytes.clear();
    }
    Thumbnail {
        bytes: Arc::new(bytes),
        placeholder: true,
        width,
        height,
    }
}
