//! The "SPA node" capability set the node runtime wraps: port enumeration,
//! command dispatch, buffer push/pull, format negotiation and an optional
//! clock capability. Negotiating buffer memory layouts and parsing media
//! formats are explicitly out of scope, so [`MediaFormat`] stays an opaque
//! blob.

pub mod fake;

use std::sync::Arc;

use crate::pollset::{PollItem, PollItemId};
use crate::port::Direction;
use crate::state::NodeState;

/// Opaque format descriptor. The node never inspects the bytes; it only
/// forwards whatever the link-level format negotiator produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaFormat(pub Vec<u8>);

/// Lifecycle state the *element itself* reports, distinct from the node's
/// own [`NodeState`]. `Streaming` is the only state `HaveOutput` forwarding
/// cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Init,
    Configure,
    Paused,
    Streaming,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockFlags {
    None,
    Live,
}

/// Commands sent down to the element. `ClockUpdate` carries the composed
/// rate/ticks/monotonic-time triple plus the change mask the clock bridge
/// computes.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pause,
    Start,
    ClockUpdate {
        rate: u32,
        ticks: u64,
        monotonic_time: i64,
        scale: f64,
        state: NodeState,
        flags: ClockFlags,
        change_mask: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFlags {
    None,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushInputItem {
    pub port_id: u32,
    pub buffer_id: u32,
    pub flags: BufferFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct PulledBuffer {
    pub port_id: u32,
    pub buffer_id: u32,
    pub status: BufferStatus,
}

/// Asynchronous events the element raises back to the node. Delivered
/// through the callback installed by [`Element::set_event_callback`] and
/// dispatched by [`crate::node::Node::handle_element_event`].
pub enum ElementEvent {
    PortAdded(u32),
    PortRemoved(u32),
    StateChange(ElementState),
    AddPoll(PollItem),
    UpdatePoll(PollItem),
    RemovePoll(PollItemId),
    NeedInput,
    HaveOutput,
    ReuseBuffer { port_id: u32, buffer_id: u32 },
    RequestClockUpdate,
}

impl std::fmt::Debug for ElementEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementEvent::PortAdded(id) => f.debug_tuple("PortAdded").field(id).finish(),
            ElementEvent::PortRemoved(id) => f.debug_tuple("PortRemoved").field(id).finish(),
            ElementEvent::StateChange(s) => f.debug_tuple("StateChange").field(s).finish(),
            ElementEvent::AddPoll(item) => f.debug_tuple("AddPoll").field(&item.id()).finish(),
            ElementEvent::UpdatePoll(item) => f.debug_tuple("UpdatePoll").field(&item.id()).finish(),
            ElementEvent::RemovePoll(id) => f.debug_tuple("RemovePoll").field(id).finish(),
            ElementEvent::NeedInput => write!(f, "NeedInput"),
            ElementEvent::HaveOutput => write!(f, "HaveOutput"),
            ElementEvent::ReuseBuffer { port_id, buffer_id } => f
                .debug_struct("ReuseBuffer")
                .field("port_id", port_id)
                .field("buffer_id", buffer_id)
                .finish(),
            ElementEvent::RequestClockUpdate => write!(f, "RequestClockUpdate"),
        }
    }
}

/// A clock capability, obtained via [`Element::get_clock`]. Shared between
/// linked nodes: when an output side owns one, the input side inherits the
/// same `Arc`.
pub trait Clock: Send + Sync {
    /// `(rate, ticks, monotonic_time)`.
    fn get_time(&self) -> (u32, u64, i64);
}

/// The capability set a concrete plug-in node implementation exposes. Kept
/// small and synchronous, mirroring a direct vtable call; asynchrony lives
/// in the events delivered back through the callback. `Sync` because a
/// [`Node`](crate::node::Node) hands its `Arc<dyn Element>` to more than one
/// thread: the control thread and, while poll items are registered, the
/// Worker thread.
pub trait Element: Send + Sync {
    /// `(n_input, max_input, n_output, max_output)`.
    fn get_n_ports(&self) -> (u32, u32, u32, u32);

    /// `(input_ids, output_ids)`, each sorted ascending.
    fn get_port_ids(&self) -> (Vec<u32>, Vec<u32>);

    fn set_event_callback(&self, callback: Box<dyn Fn(ElementEvent) + Send + Sync>);

    fn send_command(&self, command: Command) -> Result<(), String>;

    fn port_set_format(
        &self,
        direction: Direction,
        port_id: u32,
        format: Option<MediaFormat>,
    ) -> Result<(), String>;

    fn port_push_input(&self, items: &[PushInputItem]) -> Vec<Result<(), String>>;

    fn port_pull_output(&self, max: usize) -> Vec<PulledBuffer>;

    fn port_reuse_buffer(&self, port_id: u32, buffer_id: u32) -> Result<(), String>;

    fn get_clock(&self) -> Option<Arc<dyn Clock>>;
}
