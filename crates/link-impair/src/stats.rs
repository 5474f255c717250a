//! Per-run relay counters.
//!
//! The core is single-threaded, so these are plain integers bumped in place.
//! The summary is written to the log sink when the event loop exits.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Datagrams read off the socket, before any filtering.
    pub received: u64,
    /// Datagrams delivered to a peer after passing through the pipeline.
    pub relayed: u64,
    /// Datagrams relayed verbatim because their direction is not impaired.
    pub passed_through: u64,
    /// Pipeline decisions.
    pub lost: u64,
    pub truncated: u64,
    pub corrupted: u64,
    pub delayed: u64,
    /// Ingress rejections: unknown senders and undeliverable reverse traffic.
    pub rejected: u64,
    /// Datagrams shorter than the protocol minimum.
    pub malformed: u64,
    /// Immediate sends abandoned because the send buffer was full.
    pub send_buffer_drops: u64,
}

impl RelayStats {
    pub fn log_summary(&self, residual_queue: usize) {
        tracing::info!(
            received = self.received,
            relayed = self.relayed,
            passed_through = self.passed_through,
            lost = self.lost,
            truncated = self.truncated,
            corrupted = self.corrupted,
            delayed = self.delayed,
            rejected = self.rejected,
            malformed = self.malformed,
            send_buffer_drops = self.send_buffer_drops,
            residual_queue,
            "relay summary"
        );
    }
}
