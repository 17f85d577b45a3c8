use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::discovery::{DiscoveredFile, DiscoveredLink, DiscoveredPage};
use crate::probe::CourseApiAvailability;

/// How a course content index was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Api,
    Web,
    Hybrid,
    Cached,
}

impl std::fmt::Display for ExtractionMethod {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ExtractionMethod::Api => write!(f, "api"),
            ExtractionMethod::Web => write!(f, "web"),
            ExtractionMethod::Hybrid => write!(f, "hybrid"),
            ExtractionMethod::Cached => write!(f, "cached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub total_files: usize,
    pub total_pages: usize,
    pub has_restricted_apis: bool,
    pub method: ExtractionMethod,
}

/// The merged, single-source-of-truth view of one course's content.
/// Replaced wholesale on refresh, never merged in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseContentIndex {
    pub course_id: i64,
    pub last_scanned_at: DateTime<Utc>,
    pub api_availability: CourseApiAvailability,
    pub pages: Vec<DiscoveredPage>,
    pub files: Vec<DiscoveredFile>,
    pub links: Vec<DiscoveredLink>,
    pub searchable_text: String,
    pub metadata: IndexMetadata,
}

#[derive(Debug)]
struct CachedIndex {
    index: CourseContentIndex,
    cached_at: Instant,
}

/// TTL-bounded cache of course content indexes, one live entry per course.
/// Consulted first by every higher-level operation; entries are replaced
/// wholesale, so no fine-grained locking is needed.
#[derive(Debug)]
pub struct CourseIndexCache {
    entries: Mutex<HashMap<i64, CachedIndex>>,
    ttl: Duration,
}

impl CourseIndexCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached index for a course if it is younger than the TTL.
    /// An expired entry is dropped on the way out.
    #[inline]
    pub async fn get(&self, course_id: i64) -> Option<CourseContentIndex> {
        let mut entries = self.entries.lock().await;
        match entries.get(&course_id) {
            Some(cached) if cached.cached_at.elapsed() < self.ttl => {
                debug!("Index cache hit for course {}", course_id);
                Some(cached.index.clone())
            }
            Some(_) => {
                debug!("Index cache entry expired for course {}", course_id);
                entries.remove(&course_id);
                None
            }
            None => None,
        }
    }

    /// Store a freshly built index, replacing any previous entry for the
    /// course wholesale.
    #[inline]
    pub async fn put(&self, index: CourseContentIndex) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            index.course_id,
            CachedIndex {
                index,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop one course's entry, or everything when `course_id` is `None`.
    #[inline]
    pub async fn clear(&self, course_id: Option<i64>) {
        let mut entries = self.entries.lock().await;
        match course_id {
            Some(id) => {
                entries.remove(&id);
            }
            None => entries.clear(),
        }
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
