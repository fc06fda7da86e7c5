//! The multi-part transfer engine (spec §4.G–§4.H): parts, handles, the
//! engine that drives them across the worker pool, the buffer pool, and the
//! retry strategy.

mod bufferpool;
mod engine;
mod handle;
mod part;
mod retry;

pub use bufferpool::BufferPool;
pub use engine::{DownloadSink, TransferEngine, UploadSource};
pub use handle::{TransferDirection, TransferHandle, TransferStatus};
pub use part::Part;
pub use retry::RetryStrategy;
