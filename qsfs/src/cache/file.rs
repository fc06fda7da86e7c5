//! Cache representation of one key: an ordered, non-overlapping page set
//! plus mtime (spec §4.B / §3 File).

use std::path::PathBuf;
use std::time::SystemTime;

use log::warn;

use super::page::Page;
use crate::errors::QsfsError;

/// A contiguous range with no page coverage, reported by `read`/`unloaded_ranges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub len: u64,
}

/// One key's page set. Pages are kept sorted by offset and never overlap
/// (spec §3 File invariants).
pub struct File {
    pages: Vec<Page>,
    mtime: SystemTime,
    /// When set, new pages created by `write` are disk-backed rather than
    /// memory-backed (`Cache` flips this under memory pressure).
    disk_backed: bool,
    disk_dir: Option<PathBuf>,
    key: String,
}

impl File {
    pub fn new(key: impl Into<String>) -> Self {
        File {
            pages: Vec::new(),
            mtime: SystemTime::UNIX_EPOCH,
            disk_backed: false,
            disk_dir: None,
            key: key.into(),
        }
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    pub fn set_disk_backed(&mut self, disk_dir: PathBuf) {
        self.disk_backed = true;
        self.disk_dir = Some(disk_dir);
    }

    pub fn is_disk_backed(&self) -> bool {
        self.disk_backed
    }

    /// Sum of sizes of memory-resident pages.
    pub fn cached_size(&self) -> u64 {
        self.pages.iter().map(Page::memory_bytes).sum()
    }

    /// Sum of sizes of all pages, memory- or disk-backed.
    pub fn logical_size(&self) -> u64 {
        self.pages.iter().map(Page::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn page_index_at_or_after(&self, offset: u64) -> usize {
        self.pages.partition_point(|p| p.end() <= offset)
    }

    /// `(bytes_available, pages intersecting the window, missing ranges
    /// inside the window)` (spec §4.B). The `File` never performs I/O;
    /// callers fill `missing_ranges` and call `write` back in.
    pub fn read_ranges(&self, offset: u64, len: u64) -> (u64, Vec<usize>, Vec<Range>) {
        let end = offset + len;
        let mut cursor = offset;
        let mut hit_indices = Vec::new();
        let mut missing = Vec::new();
        let mut available = 0u64;

        let start_idx = self.page_index_at_or_after(offset);
        for (i, page) in self.pages.iter().enumerate().skip(start_idx) {
            if page.offset >= end {
                break;
            }
            if page.offset > cursor {
                missing.push(Range {
                    offset: cursor,
                    len: page.offset - cursor,
                });
            }
            hit_indices.push(i);
            let seg_start = cursor.max(page.offset);
            let seg_end = end.min(page.end());
            available += seg_end.saturating_sub(seg_start);
            cursor = page.end().min(end);
        }
        if cursor < end {
            missing.push(Range {
                offset: cursor,
                len: end - cursor,
            });
        }
        (available, hit_indices, missing)
    }

    /// Read available bytes for `[offset, offset+len)` into `out`, zero-filling
    /// any unloaded range. Returns the number of bytes actually covered by
    /// pages (matching `read_ranges`'s `bytes_available`).
    pub fn read(&self, offset: u64, len: u64, out: &mut [u8]) -> Result<u64, QsfsError> {
        debug_assert!(out.len() as u64 >= len);
        for b in out.iter_mut().take(len as usize) {
            *b = 0;
        }
        let (available, hit_indices, _missing) = self.read_ranges(offset, len);
        let end = offset + len;
        for i in hit_indices {
            let page = &self.pages[i];
            let seg_start = offset.max(page.offset);
            let seg_end = end.min(page.end());
            if seg_end <= seg_start {
                continue;
            }
            let seg_len = seg_end - seg_start;
            let out_off = (seg_start - offset) as usize;
            page.read(
                seg_start,
                seg_len,
                &mut out[out_off..out_off + seg_len as usize],
            )?;
        }
        Ok(available)
    }

    /// Every gap between pages, plus the trailing gap to `total_size`.
    pub fn unloaded_ranges(&self, total_size: u64) -> Vec<Range> {
        let mut ranges = Vec::new();
        let mut cursor = 0u64;
        for page in &self.pages {
            if page.offset > cursor {
                ranges.push(Range {
                    offset: cursor,
                    len: page.offset - cursor,
                });
            }
            cursor = page.end().max(cursor);
        }
        if cursor < total_size {
            ranges.push(Range {
                offset: cursor,
                len: total_size - cursor,
            });
        }
        ranges
    }

    /// Whether `[offset, offset+len)` is fully covered by pages (no gaps).
    pub fn has_data(&self, offset: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        let (available, _, missing) = self.read_ranges(offset, len);
        available == len && missing.is_empty()
    }

    /// The maximal gap-free prefix starting at offset 0.
    pub fn consecutive_range_at_front(&self) -> (u64, u64) {
        let mut end = 0u64;
        for page in &self.pages {
            if page.offset > end {
                break;
            }
            end = page.end();
        }
        (0, end)
    }

    /// Pages touching `[off1, off2)`, as a `(first, last)` index pair
    /// (inclusive), or `None` if no page intersects.
    pub fn intersecting_range(&self, off1: u64, off2: u64) -> Option<(usize, usize)> {
        let mut first = None;
        let mut last = None;
        for (i, page) in self.pages.iter().enumerate() {
            if page.offset >= off2 {
                break;
            }
            if page.end() <= off1 {
                continue;
            }
            if first.is_none() {
                first = Some(i);
            }
            last = Some(i);
        }
        first.zip(last)
    }

    /// Drop all pages (used when a write's mtime supersedes the current one).
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// For each existing page intersecting the range, refresh it in place;
    /// for each gap, insert a new page. A write whose mtime is newer than
    /// the file's clears all existing pages first (spec §3 / Open Questions:
    /// this asymmetry — newer writes clear, but newer *reads* via `Cache`
    /// also clear — is preserved as specified).
    pub fn write(&mut self, offset: u64, data: &[u8], mtime: SystemTime) -> Result<(), QsfsError> {
        if data.is_empty() {
            self.mtime = self.mtime.max(mtime);
            return Ok(());
        }
        if mtime > self.mtime {
            self.clear();
        }
        self.mtime = self.mtime.max(mtime);

        let end = offset + data.len() as u64;
        let mut cursor = offset;
        let mut new_pages = Vec::new();

        let start_idx = self.page_index_at_or_after(offset);
        for i in start_idx..self.pages.len() {
            let page_offset = self.pages[i].offset;
            let page_end = self.pages[i].end();
            if page_offset >= end {
                break;
            }
            if page_offset > cursor {
                let gap_len = page_offset - cursor;
                let rel = (cursor - offset) as usize;
                self.extend_or_insert(&mut new_pages, cursor, &data[rel..rel + gap_len as usize])?;
            }
            let seg_start = cursor.max(page_offset);
            let seg_end = end.min(page_end);
            if seg_end > seg_start {
                let rel_start = (seg_start - offset) as usize;
                let rel_end = (seg_end - offset) as usize;
                self.pages[i].refresh(seg_start, &data[rel_start..rel_end])?;
            }
            cursor = cursor.max(seg_end);
        }
        if cursor < end {
            let rel = (cursor - offset) as usize;
            self.extend_or_insert(&mut new_pages, cursor, &data[rel..])?;
        }

        self.pages.extend(new_pages);
        self.pages.sort_by_key(|p| p.offset);
        Ok(())
    }

    /// Fill a gap at `gap_start`: extend an existing page that ends exactly
    /// at `gap_start` in place, rather than creating a new touching page, so
    /// that a run of contiguous writes collapses into one page (spec §3
    /// "they may touch" plus the §4.A refresh-grows-in-place behavior).
    fn extend_or_insert(
        &mut self,
        new_pages: &mut Vec<Page>,
        gap_start: u64,
        gap_data: &[u8],
    ) -> Result<(), QsfsError> {
        if let Some(idx) = self.pages.iter().position(|p| p.end() == gap_start) {
            self.pages[idx].refresh(gap_start, gap_data)?;
            return Ok(());
        }
        new_pages.push(self.make_page(gap_start, gap_data)?);
        Ok(())
    }

    fn make_page(&self, offset: u64, data: &[u8]) -> Result<Page, QsfsError> {
        if self.disk_backed {
            let dir = self
                .disk_dir
                .as_ref()
                .expect("disk_backed implies disk_dir is set");
            Page::new_on_disk(offset, data, dir, &self.key)
        } else {
            Ok(Page::new_in_memory(offset, data))
        }
    }

    /// Erase pages strictly after `new_size`; truncate the page straddling it.
    pub fn resize(&mut self, new_size: u64) -> Result<(), QsfsError> {
        if let Some(idx) = self
            .pages
            .iter()
            .position(|p| p.offset < new_size && p.end() > new_size)
        {
            self.pages[idx].resize_smaller(new_size - self.pages[idx].offset)?;
        }
        self.pages.retain(|p| p.offset < new_size);
        Ok(())
    }

    pub fn set_mtime(&mut self, mtime: SystemTime) {
        self.mtime = mtime;
    }
}

/// Truncate a write payload shorter than the caller-declared length with a
/// warning, as spec §4.B's edge case requires.
pub fn truncate_payload_with_warning<'a>(data: &'a [u8], declared_len: u64) -> &'a [u8] {
    if (data.len() as u64) < declared_len {
        warn!(
            "write payload ({} bytes) shorter than declared length ({declared_len}); truncating",
            data.len()
        );
    }
    let n = (data.len() as u64).min(declared_len) as usize;
    &data[..n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn scenario_basic_page_ops() {
        let mut f = File::new("/k");
        f.write(0, b"012", t(1)).unwrap();
        let mut out = [0u8; 3];
        f.read(0, 3, &mut out).unwrap();
        assert_eq!(&out, b"012");

        f.write(3, b"abc", t(2)).unwrap();
        assert_eq!(f.unloaded_ranges(6), vec![]);
        assert_eq!(
            f.unloaded_ranges(7),
            vec![Range { offset: 6, len: 1 }]
        );

        f.write(16, b"ABC", t(3)).unwrap();
        assert_eq!(
            f.unloaded_ranges(19),
            vec![Range { offset: 6, len: 10 }]
        );
        assert!(f.has_data(0, 6));
        assert!(!f.has_data(0, 7));
    }

    #[test]
    fn scenario_resize() {
        let mut f = File::new("/k");
        f.write(0, b"012", t(1)).unwrap();
        f.write(3, b"abc", t(2)).unwrap();
        f.write(16, b"ABC", t(3)).unwrap();

        f.resize(19).unwrap(); // no-op
        assert_eq!(f.logical_size(), 9);

        // offset 7 straddles no page (the first ends at 6, the second starts
        // at 16), so resize just drops everything from offset 7 on, i.e. the
        // whole second page.
        f.resize(7).unwrap();
        assert_eq!(f.cached_size(), 6);

        let mut out = [0u8; 9];
        f.read(0, 9, &mut out).unwrap();
        assert_eq!(&out[0..6], b"012abc");
        assert_eq!(&out[6..9], &[0, 0, 0]);
    }

    #[test]
    fn write_zero_len_is_noop_but_updates_mtime() {
        let mut f = File::new("/k");
        f.write(0, b"", t(5)).unwrap();
        assert_eq!(f.mtime(), t(5));
        assert!(f.is_empty());
    }

    #[test]
    fn newer_mtime_write_clears_pages() {
        let mut f = File::new("/k");
        f.write(0, b"old", t(1)).unwrap();
        f.write(0, b"new", t(5)).unwrap();
        let mut out = [0u8; 3];
        f.read(0, 3, &mut out).unwrap();
        assert_eq!(&out, b"new");

        // An older-mtime write does not clear (asymmetric by design, spec §9).
        f.write(0, b"xxx", t(2)).unwrap();
        let mut out = [0u8; 3];
        f.read(0, 3, &mut out).unwrap();
        assert_eq!(&out, b"xxx");
    }
}
