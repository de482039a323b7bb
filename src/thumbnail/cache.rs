//! Thumbnail cache
//!
//! Bounded first-in first-out cache of rendered thumbnails. Keys include the
//! source's size and modification time, so an edited source never hits a
//! stale entry.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::storage::VirtualPath;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: VirtualPath,
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CachedThumbnail {
    pub content_type: &'static str,
    pub body: Bytes,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CachedThumbnail>,
    order: VecDeque<CacheKey>,
}

pub struct ThumbnailCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ThumbnailCache {
    /// A capacity of zero disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedThumbnail> {
        if self.capacity == 0 {
            return None;
        }
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.entries.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, value: CachedThumbnail) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.entries.insert(key.clone(), value).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.entries.len()
    }
}
