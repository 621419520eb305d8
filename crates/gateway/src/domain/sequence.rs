/// Tracks a per-connection message sequence and accumulates gaps
///
/// The counter restarts with every connection, so [`SequenceTracker::reset`]
/// must be called on each reconnect.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
    gap_count: u64,
    dropped: u64,
    needs_backfill: bool,
    /// Since the last report
    pending_gaps: u64,
    pending_dropped: u64,
}

/// Aggregate gap statistics since the last report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    pub gaps: u64,
    pub dropped: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the next observed sequence number. Returns the gap size if
    /// messages were skipped.
    pub fn observe(&mut self, sequence: u64) -> Option<u64> {
        let gap = match self.last {
            Some(last) if sequence > last + 1 => Some(sequence - last - 1),
            _ => None,
        };
        if let Some(size) = gap {
            self.gap_count += 1;
            self.dropped += size;
            self.pending_gaps += 1;
            self.pending_dropped += size;
            self.needs_backfill = true;
        }
        // Replays or reordering never move the cursor backwards
        if self.last.is_none_or(|last| sequence > last) {
            self.last = Some(sequence);
        }
        gap
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.gap_count = 0;
        self.dropped = 0;
        self.pending_gaps = 0;
        self.pending_dropped = 0;
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn gap_count(&self) -> u64 {
        self.gap_count
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn needs_backfill(&self) -> bool {
        self.needs_backfill
    }

    /// Read and clear the backfill flag
    pub fn take_needs_backfill(&mut self) -> bool {
        std::mem::take(&mut self.needs_backfill)
    }

    /// Statistics since the previous call, if any gap occurred
    pub fn take_report(&mut self) -> Option<GapReport> {
        if self.pending_gaps == 0 {
            return None;
        }
        let report = GapReport {
            gaps: self.pending_gaps,
            dropped: self.pending_dropped,
        };
        self.pending_gaps = 0;
        self.pending_dropped = 0;
        Some(report)
    }
}
