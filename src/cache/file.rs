use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::CacheConfig;

const TRUNCATION_NOTICE: &str = "\n\n[Content truncated]";

/// Composite cache key: the same file requested with a different freshness
/// tag, size or output format is a distinct entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileCacheKey {
    pub file_id: i64,
    pub revalidation_tag: String,
    pub size_hint: u64,
    pub format: String,
}

impl FileCacheKey {
    #[inline]
    pub fn new(file_id: i64, revalidation_tag: Option<&str>, size_hint: u64, format: &str) -> Self {
        Self {
            file_id,
            revalidation_tag: revalidation_tag.unwrap_or("none").to_string(),
            size_hint,
            format: format.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCacheEntry {
    pub full_content: String,
    pub preview: String,
    pub revalidation_tag: Option<String>,
    pub size_hint: Option<u64>,
    pub cached_at: Instant,
    pub last_accessed_at: Instant,
    pub parse_time_ms: u64,
    pub format: String,
}

/// LRU+TTL cache of parsed file content sitting strictly in front of the
/// document parser. Entries past the revalidation window are still served
/// but flagged for a freshness check; entries past the TTL are never served.
#[derive(Debug)]
pub struct FileContentCache {
    entries: Mutex<HashMap<FileCacheKey, FileCacheEntry>>,
    max_entries: usize,
    max_content_bytes: usize,
    preview_max_chars: usize,
    ttl: Duration,
    revalidate_after: Duration,
    sweep_interval: Duration,
}

/// Handle for the background expiry sweep; dropping it does not stop the
/// task, `stop()` does.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    #[inline]
    pub fn stop(self) {
        self.task.abort();
    }
}

impl FileContentCache {
    #[inline]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.file_max_entries,
            max_content_bytes: config.file_max_content_bytes,
            preview_max_chars: config.preview_max_chars,
            ttl: Duration::from_secs(config.file_ttl_seconds),
            revalidate_after: Duration::from_secs(config.file_revalidate_seconds),
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds),
        }
    }

    /// Look up an entry, refreshing its access time. TTL-expired entries are
    /// treated as absent and dropped.
    #[inline]
    pub async fn get(&self, key: &FileCacheKey) -> Option<FileCacheEntry> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                entry.last_accessed_at = Instant::now();
                debug!("File cache hit for file {} ({})", key.file_id, key.format);
                Some(entry.clone())
            }
            Some(_) => {
                debug!("File cache entry expired for file {}", key.file_id);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert parsed content. Content over the size ceiling is declined
    /// (returns false) rather than cached or erroring; the caller still owns
    /// the content and its source metadata.
    #[inline]
    pub async fn put(&self, key: FileCacheKey, content: String, parse_time_ms: u64) -> bool {
        if content.len() > self.max_content_bytes {
            info!(
                "Declining to cache file {}: {} bytes exceeds ceiling of {}",
                key.file_id,
                content.len(),
                self.max_content_bytes
            );
            return false;
        }

        let preview = build_preview(&content, self.preview_max_chars);
        let now = Instant::now();
        let entry = FileCacheEntry {
            full_content: content,
            preview,
            revalidation_tag: (key.revalidation_tag != "none")
                .then(|| key.revalidation_tag.clone()),
            size_hint: Some(key.size_hint),
            cached_at: now,
            last_accessed_at: now,
            parse_time_ms,
            format: key.format.clone(),
        };

        let mut entries = self.entries.lock().await;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            evict_oldest_locked(&mut entries);
        }
        entries.insert(key, entry);
        true
    }

    /// True once an entry is older than the revalidation window: still safe
    /// to serve, but its freshness signal should be re-checked soon. Distinct
    /// from TTL expiry, which means "must not serve".
    #[inline]
    pub fn should_revalidate(&self, entry: &FileCacheEntry) -> bool {
        entry.cached_at.elapsed() >= self.revalidate_after
    }

    /// Evict the least-recently-accessed entry, if any.
    #[inline]
    pub async fn evict_oldest(&self) {
        let mut entries = self.entries.lock().await;
        evict_oldest_locked(&mut entries);
    }

    /// Drop all entries for one file, or everything when `file_id` is `None`.
    #[inline]
    pub async fn clear(&self, file_id: Option<i64>) {
        let mut entries = self.entries.lock().await;
        match file_id {
            Some(id) => entries.retain(|key, _| key.file_id != id),
            None => entries.clear(),
        }
    }

    /// Remove entries older than the TTL. Called periodically by the
    /// sweeper task; tests call it directly.
    #[inline]
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Sweep removed {} expired file cache entries", removed);
        }
        removed
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Start the periodic expiry sweep. The task is owned by the returned
    /// handle; callers that never start it (tests) drive `sweep()` manually.
    #[inline]
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let cache = Arc::clone(self);
        let interval = self.sweep_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        });
        SweeperHandle { task }
    }
}

fn evict_oldest_locked(entries: &mut HashMap<FileCacheKey, FileCacheEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_accessed_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        debug!("Evicting least-recently-accessed file cache entry {:?}", key);
        entries.remove(&key);
    }
}

/// Build a bounded preview of parsed content.
///
/// Content within the limit is returned verbatim. Otherwise blank-line runs
/// and repeated horizontal whitespace are collapsed first; if the result is
/// still over the limit it is truncated near a paragraph boundary when one
/// falls after 70% of the limit, else near a sentence boundary after 80%,
/// else hard-truncated, with a truncation notice appended.
#[inline]
pub fn build_preview(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }

    let collapsed = collapse_excess_whitespace(content);
    let chars: Vec<char> = collapsed.chars().collect();
    if chars.len() <= limit {
        return collapsed;
    }

    let window: String = chars[..limit].iter().collect();
    let paragraph_floor = limit * 7 / 10;
    let sentence_floor = limit * 8 / 10;

    let cut = find_boundary(&window, "\n\n", paragraph_floor)
        .or_else(|| find_sentence_boundary(&window, sentence_floor))
        .unwrap_or(window.len());

    let mut preview = window[..cut].trim_end().to_string();
    preview.push_str(TRUNCATION_NOTICE);
    preview
}

// Byte offset of the last paragraph break whose char position is at or past
// the floor, if any.
fn find_boundary(window: &str, pattern: &str, char_floor: usize) -> Option<usize> {
    let byte_floor = window
        .char_indices()
        .nth(char_floor)
        .map_or(window.len(), |(i, _)| i);
    window.rfind(pattern).filter(|&i| i >= byte_floor)
}

fn find_sentence_boundary(window: &str, char_floor: usize) -> Option<usize> {
    let byte_floor = window
        .char_indices()
        .nth(char_floor)
        .map_or(window.len(), |(i, _)| i);

    [". ", "! ", "? "]
        .iter()
        .filter_map(|p| window.rfind(p).map(|i| i + 1))
        .filter(|&i| i >= byte_floor)
        .max()
}

fn collapse_excess_whitespace(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut blank_run = 0usize;

    for line in content.lines() {
        let collapsed_line = collapse_horizontal(line);
        if collapsed_line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(&collapsed_line);
            out.push('\n');
        }
    }

    // lines() drops the final newline; keep the text shape stable
    if !content.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    out
}

fn collapse_horizontal(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}
