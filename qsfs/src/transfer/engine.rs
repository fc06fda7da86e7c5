//! Splits a transfer into parts, farms them out to the worker pool, and
//! retries failed parts, grounded on `original_source/src/client/QSTransferManager.cpp`'s
//! `DoMultiPartUpload`/`DownloadFile` shape.

use std::sync::Arc;

use log::{debug, warn};

use crate::client::{GetObjectRequest, ObjectStoreClient};
use crate::defaults::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_TRANSFER_BUFFER_SIZE};
use crate::errors::{ClientError, QsfsError};
use crate::workerpool::WorkerPool;

use super::bufferpool::BufferPool;
use super::handle::{TransferDirection, TransferHandle, TransferStatus};
use super::part::Part;
use super::retry::RetryStrategy;

/// Callback the engine writes downloaded bytes into; typically
/// `Cache::write` bound to a specific key.
pub type DownloadSink = dyn Fn(u64, &[u8]) + Send + Sync;
/// Callback the engine reads upload bytes from at a given `(offset, len)`.
pub type UploadSource = dyn Fn(u64, usize) -> Vec<u8> + Send + Sync;

/// Owns the worker pool, buffer pool, and retry strategy shared by every
/// transfer and drives individual part downloads/uploads against an
/// [`ObjectStoreClient`].
pub struct TransferEngine {
    client: Arc<dyn ObjectStoreClient>,
    pool: WorkerPool,
    buffer_pool: BufferPool,
    retry: RetryStrategy,
    part_size: u64,
    multipart_threshold: u64,
}

impl TransferEngine {
    pub fn new(client: Arc<dyn ObjectStoreClient>, pool_size: usize, buffer_heap_size: u64, max_retries: u32) -> Self {
        let part_size = DEFAULT_TRANSFER_BUFFER_SIZE;
        TransferEngine {
            client,
            pool: WorkerPool::new(pool_size),
            buffer_pool: BufferPool::new(buffer_heap_size, part_size as usize),
            retry: RetryStrategy::new(max_retries),
            part_size,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }

    fn split_into_parts(&self, total_size: u64) -> Vec<Part> {
        if total_size == 0 {
            return vec![Part::new(1, 0, 0)];
        }
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut number = 1u16;
        while offset < total_size {
            let size = self.part_size.min(total_size - offset);
            parts.push(Part::new(number, offset, size));
            offset += size;
            number += 1;
        }
        parts
    }

    /// Downloads `key` (`total_size` bytes known ahead of time, e.g. from a
    /// prior `head_object`) in parts, calling `sink` with each part's bytes
    /// as it lands. A download splits on `part_size`, not the (larger)
    /// upload multipart threshold: `size <= part_size` produces a single
    /// part, otherwise `part_count = ceil(size / part_size)` (spec §4.H).
    pub fn download_file(self: &Arc<Self>, key: &str, total_size: u64, sink: Arc<DownloadSink>) -> Arc<TransferHandle> {
        let handle = Arc::new(TransferHandle::new(key, TransferDirection::Download, total_size));
        if total_size <= self.part_size {
            let engine = Arc::clone(self);
            let key = key.to_string();
            let handle2 = Arc::clone(&handle);
            handle.update_status(TransferStatus::InProgress);
            handle.add_pending_part(Part::new(1, 0, total_size));
            self.pool.submit(move || {
                engine.run_download_part(&key, Part::new(1, 0, total_size), &handle2, &sink);
                engine.finish_if_done(&handle2);
            });
            return handle;
        }

        handle.update_status(TransferStatus::InProgress);
        let parts = self.split_into_parts(total_size);
        for part in &parts {
            handle.add_pending_part(part.clone());
        }
        for part in parts {
            let engine = Arc::clone(self);
            let key = key.to_string();
            let handle2 = Arc::clone(&handle);
            let sink = Arc::clone(&sink);
            self.pool.submit(move || {
                engine.run_download_part(&key, part, &handle2, &sink);
                engine.finish_if_done(&handle2);
            });
        }
        handle
    }

    fn run_download_part(&self, key: &str, part: Part, handle: &Arc<TransferHandle>, sink: &Arc<DownloadSink>) {
        if !handle.should_continue() {
            return;
        }
        let buffer = self.buffer_pool.acquire();
        let mut attempt = 0;
        loop {
            let range = if part.size == 0 {
                None
            } else {
                Some(crate::client::ByteRange::Closed(part.range_begin, part.range_end().saturating_sub(1)))
            };
            let result = self.client.get_object(GetObjectRequest { key: key.to_string(), range });
            match result {
                Ok(response) => {
                    sink(part.range_begin, &response.body);
                    handle.add_bytes_transferred(response.body.len() as u64);
                    handle.change_part_to_completed(part.part_number, response.etag);
                    self.buffer_pool.release(buffer);
                    return;
                }
                Err(err) => {
                    if self.retry_or_fail(&err, attempt, handle, part.part_number) {
                        attempt += 1;
                        continue;
                    }
                    self.buffer_pool.release(buffer);
                    return;
                }
            }
        }
    }

    /// Uploads bytes read from `source` under `key`, choosing a single
    /// `put_object` or a full multipart sequence depending on `total_size`.
    pub fn upload_file(self: &Arc<Self>, key: &str, total_size: u64, source: Arc<UploadSource>) -> Arc<TransferHandle> {
        let handle = Arc::new(TransferHandle::new(key, TransferDirection::Upload, total_size));
        handle.update_status(TransferStatus::InProgress);

        if total_size < self.multipart_threshold {
            let engine = Arc::clone(self);
            let key = key.to_string();
            let handle2 = Arc::clone(&handle);
            self.pool.submit(move || {
                let body = source(0, total_size as usize);
                let result = engine.client.put_object(crate::client::PutObjectRequest {
                    key: key.clone(),
                    body,
                    content_type: None,
                });
                match result {
                    Ok(()) => {
                        handle2.add_bytes_transferred(total_size);
                        handle2.add_pending_part(Part::new(1, 0, total_size));
                        handle2.change_part_to_completed(1, None);
                    }
                    Err(err) => {
                        warn!("single-put upload of {key} failed: {err}");
                        handle2.update_status(TransferStatus::Failed);
                    }
                }
                engine.finish_if_done(&handle2);
            });
            return handle;
        }

        let engine = Arc::clone(self);
        let key_owned = key.to_string();
        let parts = self.split_into_parts(total_size);
        for part in &parts {
            handle.add_pending_part(part.clone());
        }
        let handle2 = Arc::clone(&handle);
        self.pool.submit(move || {
            let upload_id = match engine.client.initiate_multipart_upload(&key_owned) {
                Ok(id) => id,
                Err(err) => {
                    warn!("initiate_multipart_upload({key_owned}) failed: {err}");
                    handle2.update_status(TransferStatus::Failed);
                    return;
                }
            };
            *handle2.multipart_id.lock().unwrap() = Some(upload_id.clone());

            for part in &parts {
                let engine = Arc::clone(&engine);
                let key = key_owned.clone();
                let upload_id = upload_id.clone();
                let handle3 = Arc::clone(&handle2);
                let source = Arc::clone(&source);
                let part = part.clone();
                engine.pool.submit(move || {
                    engine.run_upload_part(&key, &upload_id, part, &handle3, &source);
                    engine.finish_multipart_upload_if_done(&key, &upload_id, &handle3);
                });
            }
        });
        handle
    }

    fn run_upload_part(&self, key: &str, upload_id: &str, part: Part, handle: &Arc<TransferHandle>, source: &Arc<UploadSource>) {
        if !handle.should_continue() {
            return;
        }
        let buffer = self.buffer_pool.acquire();
        let body = source(part.range_begin, part.size as usize);
        let mut attempt = 0;
        loop {
            match self.client.upload_part(key, upload_id, part.part_number, &body) {
                Ok(etag) => {
                    handle.add_bytes_transferred(body.len() as u64);
                    handle.change_part_to_completed(part.part_number, Some(etag));
                    self.buffer_pool.release(buffer);
                    return;
                }
                Err(err) => {
                    if self.retry_or_fail(&err, attempt, handle, part.part_number) {
                        attempt += 1;
                        continue;
                    }
                    self.buffer_pool.release(buffer);
                    return;
                }
            }
        }
    }

    /// Synchronously fetches one byte range on the calling thread, applying
    /// the engine's retry policy. Used by `Drive` to fill a single cache
    /// gap reported by `Cache::read` without paying for the full
    /// multipart/worker-pool machinery of [`download_file`](Self::download_file).
    pub fn fetch_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>, ClientError> {
        let mut attempt = 0;
        loop {
            let range = crate::client::ByteRange::Closed(offset, offset + len.saturating_sub(1));
            match self.client.get_object(GetObjectRequest { key: key.to_string(), range: Some(range) }) {
                Ok(response) => return Ok(response.body),
                Err(err) => {
                    if self.retry.should_retry(attempt, &err) {
                        self.retry.retry_request_sleep(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Applies the retry policy to a failed part; returns whether the
    /// caller should retry in place.
    fn retry_or_fail(&self, err: &ClientError, attempt: u32, handle: &Arc<TransferHandle>, part_number: u16) -> bool {
        if handle.should_continue() && self.retry.should_retry(attempt, err) {
            debug!("retrying part {part_number}: {err}");
            self.retry.retry_request_sleep(attempt);
            true
        } else {
            warn!("part {part_number} failed permanently: {err}");
            handle.change_part_to_failed(part_number);
            handle.update_status(TransferStatus::Failed);
            false
        }
    }

    fn finish_if_done(&self, handle: &Arc<TransferHandle>) {
        if handle.done_transfer() {
            handle.update_status(TransferStatus::Completed);
        }
    }

    fn finish_multipart_upload_if_done(&self, key: &str, upload_id: &str, handle: &Arc<TransferHandle>) {
        if !handle.done_transfer() {
            return;
        }
        let parts: Vec<(u16, String)> = handle
            .sorted_completed_parts()
            .into_iter()
            .filter_map(|p| p.etag.map(|etag| (p.part_number, etag)))
            .collect();
        match self.client.complete_multipart_upload(key, upload_id, &parts) {
            Ok(()) => handle.update_status(TransferStatus::Completed),
            Err(err) => {
                warn!("complete_multipart_upload({key}) failed: {err}");
                let _ = self.client.abort_multipart_upload(key, upload_id);
                handle.update_status(TransferStatus::Failed);
            }
        }
    }
}

impl Drop for TransferEngine {
    /// Wakes any worker parked in `retry_request_sleep` before `pool`'s own
    /// `Drop` joins the worker threads, so shutdown doesn't wait out the
    /// remainder of a backoff sleep.
    fn drop(&mut self) {
        self.retry.notify_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        GetObjectResponse, HeadObjectResponse, ListObjectsRequest, ListObjectsResponse, PutObjectRequest,
    };
    use crate::errors::Outcome;
    use std::sync::Mutex as StdMutex;

    struct FakeClient {
        objects: StdMutex<std::collections::HashMap<String, Vec<u8>>>,
    }

    impl ObjectStoreClient for FakeClient {
        fn head_object(&self, key: &str) -> Outcome<HeadObjectResponse> {
            let objects = self.objects.lock().unwrap();
            let body = objects.get(key).cloned().unwrap_or_default();
            Ok(HeadObjectResponse { size: body.len() as u64, etag: None, content_type: None, last_modified: None })
        }

        fn get_object(&self, req: GetObjectRequest) -> Outcome<GetObjectResponse> {
            let objects = self.objects.lock().unwrap();
            let body = objects.get(&req.key).cloned().unwrap_or_default();
            let sliced = match req.range {
                Some(crate::client::ByteRange::Closed(start, end)) => {
                    body[start as usize..=(end as usize).min(body.len() - 1)].to_vec()
                }
                _ => body,
            };
            Ok(GetObjectResponse { body: sliced, content_range: None, etag: Some("etag".into()), content_type: None, last_modified: None })
        }

        fn put_object(&self, req: PutObjectRequest) -> Outcome<()> {
            self.objects.lock().unwrap().insert(req.key, req.body);
            Ok(())
        }

        fn delete_object(&self, key: &str) -> Outcome<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        fn list_objects(&self, _req: ListObjectsRequest) -> Outcome<ListObjectsResponse> {
            Ok(ListObjectsResponse { objects: vec![], common_prefixes: vec![], is_truncated: false, next_marker: None })
        }

        fn initiate_multipart_upload(&self, _key: &str) -> Outcome<String> {
            Ok("upload-1".to_string())
        }

        fn upload_part(&self, _key: &str, _upload_id: &str, part_number: u16, data: &[u8]) -> Outcome<String> {
            Ok(format!("etag-{part_number}-{}", data.len()))
        }

        fn complete_multipart_upload(&self, key: &str, _upload_id: &str, parts: &[(u16, String)]) -> Outcome<()> {
            let mut combined = Vec::new();
            for _ in parts {
                combined.extend_from_slice(b"x");
            }
            self.objects.lock().unwrap().insert(key.to_string(), combined);
            Ok(())
        }

        fn abort_multipart_upload(&self, _key: &str, _upload_id: &str) -> Outcome<()> {
            Ok(())
        }
    }

    #[test]
    fn small_download_bypasses_multipart_and_completes() {
        let mut objects = std::collections::HashMap::new();
        objects.insert("/f".to_string(), b"hello world".to_vec());
        let client = Arc::new(FakeClient { objects: StdMutex::new(objects) });
        let engine = Arc::new(TransferEngine::new(client, 2, 8 * 1024 * 1024, 1));

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let sink: Arc<DownloadSink> = Arc::new(move |offset, data| {
            received2.lock().unwrap().push((offset, data.to_vec()));
        });

        let handle = engine.download_file("/f", 11, sink);
        handle.wait_until_finished();
        assert_eq!(handle.status(), TransferStatus::Completed);
        let got = received.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0], (0, b"hello world".to_vec()));
    }

    #[test]
    fn large_upload_splits_into_parts_and_completes_via_multipart() {
        let client = Arc::new(FakeClient { objects: StdMutex::new(std::collections::HashMap::new()) });
        let total_size = DEFAULT_MULTIPART_THRESHOLD + 1024;
        let engine = Arc::new(TransferEngine::new(client, 4, 32 * 1024 * 1024, 1));

        let data = Arc::new(vec![7u8; total_size as usize]);
        let data2 = Arc::clone(&data);
        let source: Arc<UploadSource> = Arc::new(move |offset, len| data2[offset as usize..offset as usize + len].to_vec());

        let handle = engine.upload_file("/big", total_size, source);
        handle.wait_until_finished();
        assert_eq!(handle.status(), TransferStatus::Completed);
        assert!(handle.multipart_id.lock().unwrap().is_some());
    }

    #[test]
    fn download_in_part_size_to_multipart_threshold_range_still_splits() {
        let total_size = 10 * 1024 * 1024u64;
        let mut objects = std::collections::HashMap::new();
        objects.insert("/f".to_string(), vec![9u8; total_size as usize]);
        let client = Arc::new(FakeClient { objects: StdMutex::new(objects) });
        let engine = Arc::new(TransferEngine::new(client, 4, 32 * 1024 * 1024, 1));

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let sink: Arc<DownloadSink> = Arc::new(move |offset, data| {
            received2.lock().unwrap().push((offset, data.len()));
        });

        let handle = engine.download_file("/f", total_size, sink);
        handle.wait_until_finished();
        assert_eq!(handle.status(), TransferStatus::Completed);

        let mut got = received.lock().unwrap().clone();
        got.sort_by_key(|(offset, _)| *offset);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], (0, DEFAULT_TRANSFER_BUFFER_SIZE as usize));
        assert_eq!(got[1], (DEFAULT_TRANSFER_BUFFER_SIZE, DEFAULT_TRANSFER_BUFFER_SIZE as usize));
        assert_eq!(got[2], (2 * DEFAULT_TRANSFER_BUFFER_SIZE, (total_size - 2 * DEFAULT_TRANSFER_BUFFER_SIZE) as usize));
    }

    #[test]
    fn cancelling_a_transfer_stops_it_from_completing() {
        let mut objects = std::collections::HashMap::new();
        objects.insert("/f".to_string(), vec![1u8; 1024]);
        let client = Arc::new(FakeClient { objects: StdMutex::new(objects) });
        let engine = Arc::new(TransferEngine::new(client, 1, 8 * 1024 * 1024, 1));

        let sink: Arc<DownloadSink> = Arc::new(|_offset, _data| {});
        let handle = engine.download_file("/f", 1024, sink);
        handle.cancel();
        assert_eq!(handle.status(), TransferStatus::Cancelled);
    }
}
