//! One part of a multi-part transfer (spec §3 Part / §4.G).

/// A part's byte range within the transfer, 1-based part number, progress so
/// far, and either an upload etag or a staged download buffer.
#[derive(Debug, Clone)]
pub struct Part {
    pub part_number: u16,
    pub range_begin: u64,
    pub size: u64,
    pub best_progress: u64,
    pub etag: Option<String>,
    /// Staged bytes for a download part, spliced into the handle's sink at
    /// `range_begin` once complete.
    pub download_buffer: Option<Vec<u8>>,
}

impl Part {
    pub fn new(part_number: u16, range_begin: u64, size: u64) -> Self {
        Part {
            part_number,
            range_begin,
            size,
            best_progress: 0,
            etag: None,
            download_buffer: None,
        }
    }

    pub fn range_end(&self) -> u64 {
        self.range_begin + self.size
    }
}
