/// The node's own lifecycle state, distinct from the element's
/// [`crate::element::ElementState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Suspended,
    Initializing,
    Idle,
    Running,
    Error,
}

impl Default for NodeState {
    fn default() -> NodeState {
        NodeState::Suspended
    }
}

/// Returns whether `from -> to` is a transition this crate recognizes.
/// `Node::set_state` is a blind dispatch table, not a graph with forbidden
/// edges: every state is reachable from every other, so the only illegal
/// target is one the table doesn't know about at all, which the
/// `NodeState` enum already rules out at the type level. Kept as a seam
/// for a future stricter policy.
pub fn is_valid_transition(_from: NodeState, _to: NodeState) -> bool {
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_state_is_suspended() {
        assert_eq!(NodeState::default(), NodeState::Suspended);
    }
}
