use std::time::Duration;

/// A node's idle-decay timeout and poll-set capacity, surfaced here so a
/// node can be built with different bounds without forking the crate.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How long a node stays Idle with no links before decaying to Suspended.
    pub idle_timeout: Duration,
    /// Maximum number of simultaneous [`crate::pollset::PollItem`]s.
    pub poll_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            idle_timeout: Duration::from_secs(3),
            poll_capacity: 16,
        }
    }
}
