//! Transfer handle state machine (spec §3 TransferHandle / §4.G), grounded
//! on `original_source/include/client/TransferHandle.h`'s part-bucket and
//! status-condvar shape.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use super::part::Part;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    NotStarted,
    InProgress,
    Cancelled,
    Failed,
    Completed,
    Aborted,
}

impl TransferStatus {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Failed | TransferStatus::Completed | TransferStatus::Aborted
        )
    }

    /// Whether `self -> next` is a legal transition (spec §3/§8: statuses
    /// are monotonic except the `Cancelled -> Aborted` escape).
    fn can_transition_to(self, next: TransferStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (TransferStatus::Cancelled, TransferStatus::Aborted) => true,
            (s, _) if s.is_terminal() => false,
            _ => true,
        }
    }
}

#[derive(Default)]
struct PartBuckets {
    queued: BTreeMap<u16, Part>,
    pending: BTreeMap<u16, Part>,
    failed: BTreeMap<u16, Part>,
    completed: BTreeMap<u16, Part>,
}

/// One in-flight (or finished) upload or download, tracking its parts and
/// status independently under two locks plus a shutdown-friendly condvar.
pub struct TransferHandle {
    pub key: String,
    pub direction: TransferDirection,
    pub total_size: u64,
    pub multipart_id: Mutex<Option<String>>,
    pub local_path: Option<std::path::PathBuf>,

    parts: Mutex<PartBuckets>,
    status: Mutex<TransferStatus>,
    status_condvar: Condvar,
    cancel: AtomicBool,
    bytes_transferred: AtomicU64,
}

impl TransferHandle {
    pub fn new(key: impl Into<String>, direction: TransferDirection, total_size: u64) -> Self {
        TransferHandle {
            key: key.into(),
            direction,
            total_size,
            multipart_id: Mutex::new(None),
            local_path: None,
            parts: Mutex::new(PartBuckets::default()),
            status: Mutex::new(TransferStatus::NotStarted),
            status_condvar: Condvar::new(),
            cancel: AtomicBool::new(false),
            bytes_transferred: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> TransferStatus {
        *self.status.lock().unwrap()
    }

    pub fn should_continue(&self) -> bool {
        !self.cancel.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        self.update_status(TransferStatus::Cancelled);
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    pub fn add_bytes_transferred(&self, amount: u64) {
        self.bytes_transferred.fetch_add(amount, Ordering::Relaxed);
    }

    /// Set a new status if the transition is legal; terminal statuses don't
    /// regress, except `Cancelled -> Aborted`.
    pub fn update_status(&self, next: TransferStatus) {
        let mut status = self.status.lock().unwrap();
        if status.can_transition_to(next) {
            *status = next;
            self.status_condvar.notify_all();
        }
    }

    /// Blocks until the status is terminal and no part remains pending.
    pub fn wait_until_finished(&self) {
        let mut status = self.status.lock().unwrap();
        loop {
            if status.is_terminal() && !self.has_pending_parts() {
                return;
            }
            status = self.status_condvar.wait(status).unwrap();
        }
    }

    pub fn add_queued_part(&self, part: Part) {
        self.parts.lock().unwrap().queued.insert(part.part_number, part);
    }

    pub fn take_queued_part(&self) -> Option<Part> {
        let mut parts = self.parts.lock().unwrap();
        let key = *parts.queued.keys().next()?;
        parts.queued.remove(&key)
    }

    pub fn add_pending_part(&self, part: Part) {
        self.parts.lock().unwrap().pending.insert(part.part_number, part);
    }

    pub fn has_pending_parts(&self) -> bool {
        !self.parts.lock().unwrap().pending.is_empty()
    }

    pub fn has_queued_parts(&self) -> bool {
        !self.parts.lock().unwrap().queued.is_empty()
    }

    pub fn change_part_to_failed(&self, part_number: u16) {
        let mut parts = self.parts.lock().unwrap();
        if let Some(part) = parts.pending.remove(&part_number) {
            parts.failed.insert(part_number, part);
        }
    }

    pub fn change_part_to_completed(&self, part_number: u16, etag: Option<String>) {
        let mut parts = self.parts.lock().unwrap();
        if let Some(mut part) = parts.pending.remove(&part_number) {
            part.etag = etag;
            parts.completed.insert(part_number, part);
        }
    }

    pub fn requeue_failed_part(&self, part_number: u16) -> Option<Part> {
        let mut parts = self.parts.lock().unwrap();
        let part = parts.failed.remove(&part_number)?;
        parts.queued.insert(part_number, part.clone());
        Some(part)
    }

    /// All parts completed and none remain queued, pending, or failed
    /// (spec §4.G `done_transfer()`).
    pub fn done_transfer(&self) -> bool {
        let parts = self.parts.lock().unwrap();
        parts.queued.is_empty() && parts.pending.is_empty() && parts.failed.is_empty() && !parts.completed.is_empty()
    }

    /// Completed parts in ascending part-number order, for multipart
    /// completion (spec §6 "parts are numbered 1..N; completion submits
    /// parts in ascending number order with their etags").
    pub fn sorted_completed_parts(&self) -> Vec<Part> {
        self.parts.lock().unwrap().completed.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_can_still_escape_to_aborted() {
        let h = TransferHandle::new("/k", TransferDirection::Upload, 100);
        h.update_status(TransferStatus::InProgress);
        h.cancel();
        assert_eq!(h.status(), TransferStatus::Cancelled);
        h.update_status(TransferStatus::Aborted);
        assert_eq!(h.status(), TransferStatus::Aborted);
    }

    #[test]
    fn terminal_status_does_not_regress() {
        let h = TransferHandle::new("/k", TransferDirection::Download, 100);
        h.update_status(TransferStatus::Completed);
        h.update_status(TransferStatus::InProgress);
        assert_eq!(h.status(), TransferStatus::Completed);
    }

    #[test]
    fn wait_until_finished_unblocks_on_terminal_status() {
        let h = std::sync::Arc::new(TransferHandle::new("/k", TransferDirection::Download, 10));
        h.update_status(TransferStatus::InProgress);
        let h2 = h.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            h2.update_status(TransferStatus::Completed);
        });
        h.wait_until_finished();
        handle.join().unwrap();
        assert_eq!(h.status(), TransferStatus::Completed);
    }
}
