//! qsfs: a FUSE filesystem backed by a remote object store.
//!
//! The crate is organized around the three subsystems that hold the real
//! engineering: the paged [`cache`], the [`tree`]/[`metadata`] directory
//! manager, and the [`transfer`] engine. [`drive`] glues them together and
//! implements [`fuser::Filesystem`] against the host callback surface.

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod defaults;
pub mod drive;
pub mod errors;
pub mod logging;
pub mod metadata;
pub mod mime;
pub mod tree;
pub mod transfer;
pub mod workerpool;
