// Process-local caches. Both are explicit objects with injected
// configuration and lifecycle, passed by reference to the components that
// need them; neither survives process restart.

pub mod file;
pub mod index;

pub use file::{FileCacheEntry, FileCacheKey, FileContentCache, SweeperHandle};
pub use index::{CourseContentIndex, CourseIndexCache, ExtractionMethod, IndexMetadata};
