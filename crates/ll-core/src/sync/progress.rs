//! Transfer counters and the status line derived from them.

use std::time::Instant;

/// Counters for one pull. Advisory only.
#[derive(Debug, Clone)]
pub struct PullProgress {
    requested: u64,
    fetched: u64,
    metadata_requested: u64,
    metadata_fetched: u64,
    outstanding: u64,
    bytes: u64,
    scanned: u64,
    started: Instant,
}

impl Default for PullProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PullProgress {
    /// Fresh counters; the clock starts now.
    pub fn new() -> Self {
        Self {
            requested: 0,
            fetched: 0,
            metadata_requested: 0,
            metadata_fetched: 0,
            outstanding: 0,
            bytes: 0,
            scanned: 0,
            started: Instant::now(),
        }
    }

    /// A tree or commit was examined.
    pub fn scanned(&mut self) {
        self.scanned += 1;
    }

    /// Objects queued for download.
    pub fn requested(&mut self, count: u64, metadata: bool) {
        if metadata {
            self.metadata_requested += count;
        } else {
            self.requested += count;
        }
        self.outstanding += count;
    }

    /// One download finished.
    pub fn fetched(&mut self, bytes: u64, metadata: bool) {
        if metadata {
            self.metadata_fetched += 1;
        } else {
            self.fetched += 1;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        self.bytes += bytes;
    }

    /// Bytes downloaded so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Content objects downloaded so far.
    pub fn fetched_objects(&self) -> u64 {
        self.fetched
    }

    /// Content objects queued so far.
    pub fn requested_objects(&self) -> u64 {
        self.requested
    }

    /// Percentage while transferring. Capped below 100 so that only a
    /// finished pull reports completion.
    pub fn percent(&self) -> u32 {
        if self.requested == 0 {
            return 0;
        }
        u32::try_from(self.fetched.min(self.requested) * 97 / self.requested).unwrap_or(97)
    }

    /// Transfer rate in bytes per second.
    pub fn bytes_per_sec(&self) -> u64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return self.bytes;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let rate = (self.bytes as f64 / elapsed) as u64;
        rate
    }

    /// One-line human readable state.
    pub fn status_line(&self) -> String {
        if self.requested > 0 {
            format!(
                "Receiving objects: {}% ({}/{}) {}/s {}",
                self.percent(),
                self.fetched,
                self.requested,
                format_size(self.bytes_per_sec()),
                format_size(self.bytes)
            )
        } else if self.metadata_requested > 0 {
            format!("Receiving metadata objects: {}", self.metadata_fetched)
        } else {
            format!("Scanning metadata: {}", self.scanned)
        }
    }
}

/// Format bytes for human-readable display
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
