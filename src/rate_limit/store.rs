use super::types::WindowTimestamp;
use crate::error::Result;
use async_trait::async_trait;

/// One rule's window within a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub key: String,
    pub window_secs: u64,
    pub max_requests: u32,
}

/// Everything a store needs for one check-and-record transaction
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub now: WindowTimestamp,
    /// Sorted-set member recorded for this request
    pub member: String,
    pub windows: Vec<WindowSpec>,
}

/// Verdict of a check-and-record transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub limited: bool,
    /// Index into `WindowBatch::windows` of the violated window, or of the
    /// window with the least headroom when admitted
    pub binding: usize,
    pub remaining: u64,
    /// Seconds until the binding window frees a slot
    pub reset_after: u64,
}

/// Shared store holding every caller's request windows.
///
/// `check_and_record` must be atomic with respect to every other call
/// touching any of the same keys: either all windows gain the batch's
/// member or none do.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn check_and_record(&self, batch: &WindowBatch) -> Result<WindowOutcome>;

    /// Store liveness probe
    async fn ping(&self) -> Result<()>;
}
