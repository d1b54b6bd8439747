use sentinel_scan::AnomalyCount;

/// Snapshot of the loop's progress, published through a `watch` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentState {
    /// `true` between the loop's first tick and its exit.
    pub running: bool,
    /// Completed ticks.
    pub iteration: u64,
    /// Result of the latest scan; `None` before the first scan and after a
    /// failed one.
    pub last_scan_result: Option<AnomalyCount>,
}
