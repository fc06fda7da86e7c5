//! Default size constants, carried from `original_source/include/configure/Default.h`
//! and `include/data/Size.h`.

/// Default transfer buffer / part size (4 MiB).
pub const DEFAULT_TRANSFER_BUFFER_SIZE: u64 = 4 * 1024 * 1024;

/// Below this size, uploads go through a single `PUT` instead of multipart.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 20 * 1024 * 1024;

/// Smallest part size the object store will accept for a non-final part.
pub const MULTIPART_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part size the object store will accept for one part.
pub const MULTIPART_MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default in-memory cache capacity (100 MiB).
pub const DEFAULT_CACHE_CAPACITY: u64 = 100 * 1024 * 1024;

/// Default metadata entry cap.
pub const DEFAULT_MAX_METADATA_ENTRIES: usize = 1_000_000;

/// Default worker pool size.
pub const DEFAULT_TRANSFER_POOL_SIZE: usize = 5;

/// Default request retry cap.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Block size reported by `statfs`/`stat`.
pub const BLOCK_SIZE: u32 = 4096;

/// Fixed maximum file name length reported by `statfs`.
pub const NAME_MAX: u32 = 255;

/// MIME type used to mark an object as a directory placeholder.
pub const DIRECTORY_MIME_TYPE: &str = "application/x-directory";

/// MIME type used to mark an object as a symlink whose body is the target.
pub const SYMLINK_MIME_TYPE: &str = "application/x-symlink";

/// Threshold, in bytes, above which a disk-backed page keeps its tail on
/// disk rather than pulling it fully into memory on refresh.
pub const PAGE_MEMORY_THRESHOLD: usize = 4 * 1024 * 1024;
