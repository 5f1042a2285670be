use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::clock::clock_update_command;
use crate::config::NodeConfig;
use crate::element::{
    BufferFlags, BufferStatus, Clock, Command, Element, ElementEvent, ElementState, MediaFormat,
    PushInputItem,
};
use crate::error::NodeError;
use crate::events::{NodeEvent, Subscribers};
use crate::link::{Link, LinkRegistry, LinkSnapshot};
use crate::pollset::{FdInterest, PollItem, PollItemId, PollSet};
use crate::port::{Direction, PortTable, INVALID_PORT};
use crate::state::NodeState;
use crate::sys::TimerFd;
use crate::worker::Worker;

/// Everything the Worker thread and the control thread both touch, behind
/// one lock.
pub(crate) struct NodeInner {
    pub(crate) pollset: PollSet,
    ports: PortTable,
    links: LinkRegistry,
    state: NodeState,
    error: Option<String>,
    element_state: ElementState,
    clock: Option<Arc<dyn Clock>>,
    idle_timer: TimerFd,
    idle_timer_item_id: Option<PollItemId>,
    next_item_id: PollItemId,
}

impl NodeInner {
    fn alloc_item_id(&mut self) -> PollItemId {
        let id = self.next_item_id;
        self.next_item_id += 1;
        id
    }
}

/// The node runtime: wraps one media element, owns its ports and links,
/// runs the poll-driven Worker thread, tracks lifecycle state, and mediates
/// buffer flow to linked peers.
pub struct Node {
    name: String,
    owner: Option<String>,
    properties: HashMap<String, String>,
    element: Arc<dyn Element>,
    config: NodeConfig,
    inner: Arc<Mutex<NodeInner>>,
    subscribers: Subscribers,
    worker: Mutex<Option<Worker>>,
    idle_expired: Arc<AtomicBool>,
    on_idle_timeout: Arc<dyn Fn() + Send + Sync>,
    removed: AtomicBool,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        owner: Option<String>,
        properties: HashMap<String, String>,
        element: Arc<dyn Element>,
        config: NodeConfig,
    ) -> Result<Arc<Node>, NodeError> {
        let name = name.into();

        let pollset = PollSet::new(config.poll_capacity)?;
        let idle_timer = TimerFd::new().map_err(NodeError::TimerFdCreate)?;

        let mut ports = PortTable::new();
        let (_, max_in, _, max_out) = element.get_n_ports();
        let (input_ids, output_ids) = element.get_port_ids();
        ports.refresh(max_in, max_out, input_ids, output_ids);
        let clock = element.get_clock();

        let inner = Arc::new(Mutex::new(NodeInner {
            pollset,
            ports,
            links: LinkRegistry::new(),
            state: NodeState::Suspended,
            error: None,
            element_state: ElementState::Init,
            clock,
            idle_timer,
            idle_timer_item_id: None,
            next_item_id: 1,
        }));

        let idle_expired = Arc::new(AtomicBool::new(false));

        let node = Arc::new_cyclic(|weak_self: &Weak<Node>| {
            let callback_weak = weak_self.clone();
            element.set_event_callback(Box::new(move |event| {
                if let Some(node) = callback_weak.upgrade() {
                    node.handle_element_event(event);
                }
            }));

            let idle_weak = weak_self.clone();
            let on_idle_timeout: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(node) = idle_weak.upgrade() {
                    node.on_idle_timer_fired();
                }
            });

            Node {
                name: name.clone(),
                owner,
                properties,
                element,
                config,
                inner,
                subscribers: Subscribers::new(),
                worker: Mutex::new(None),
                idle_expired,
                on_idle_timeout,
                removed: AtomicBool::new(false),
            }
        });

        debug!(node = %name, "node constructed");
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn state(&self) -> NodeState {
        self.inner.lock().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// A stable identity string for external registries. Publishing it on
    /// an object bus is an outward collaborator's job, not this crate's.
    pub fn object_path(&self) -> String {
        format!("/node/{}", self.name)
    }

    pub fn subscribe(&self, capacity: usize) -> Arc<concurrent_queue::ConcurrentQueue<NodeEvent>> {
        self.subscribers.subscribe(capacity)
    }

    pub(crate) fn element_state(&self) -> ElementState {
        self.inner.lock().element_state
    }

    pub fn free_port(&self, direction: Direction) -> u32 {
        self.inner.lock().ports.free_port(direction)
    }

    pub fn free_link_index(&self, direction: Direction) -> usize {
        self.inner.lock().links.free_slot(direction)
    }

    pub fn get_links(&self, direction: Option<Direction>) -> Vec<LinkSnapshot> {
        self.inner.lock().links.snapshot(direction)
    }

    /// Drive a lifecycle transition. Every transition cancels a pending
    /// idle-timer before running its action; the table itself is a total
    /// function over `NodeState`, so this always succeeds — the `bool`
    /// return mirrors the outward interface contract.
    pub fn set_state(&self, target: NodeState) -> bool {
        self.cancel_idle_timer();
        match target {
            NodeState::Suspended => {
                if let Err(e) = self.element.port_set_format(Direction::Output, 0, None) {
                    warn!(node = %self.name, error = %e, "port_set_format(none) failed while suspending");
                }
            }
            NodeState::Initializing => {}
            NodeState::Idle => {
                if let Err(e) = self.element.send_command(Command::Pause) {
                    warn!(node = %self.name, error = %e, "element rejected PAUSE");
                }
                self.schedule_idle_timer();
            }
            NodeState::Running => {
                self.send_clock_update();
                if let Err(e) = self.element.send_command(Command::Start) {
                    warn!(node = %self.name, error = %e, "element rejected START");
                }
            }
            NodeState::Error => {}
        }
        self.update_state(target);
        true
    }

    /// The single point that publishes a new state to observers. Idempotent
    /// when `new_state == current`.
    fn update_state(&self, new_state: NodeState) {
        let changed = {
            let mut guard = self.inner.lock();
            let changed = guard.state != new_state;
            guard.state = new_state;
            changed
        };
        if changed {
            debug!(node = %self.name, ?new_state, "state changed");
            self.subscribers.publish(NodeEvent::StateChanged(new_state));
        }
    }

    pub fn report_error(&self, diagnostic: impl Into<String>) {
        let diagnostic = diagnostic.into();
        self.cancel_idle_timer();
        {
            let mut guard = self.inner.lock();
            guard.error = Some(diagnostic.clone());
        }
        error!(node = %self.name, diagnostic = %diagnostic, "node reporting error");
        self.update_state(NodeState::Error);
    }

    /// Called when the last link is released on either direction.
    pub fn report_idle(&self) {
        self.set_state(NodeState::Idle);
    }

    pub fn report_busy(&self) {
        self.set_state(NodeState::Running);
    }

    fn cancel_idle_timer(&self) {
        let mut guard = self.inner.lock();
        if let Err(e) = guard.idle_timer.disarm() {
            warn!(node = %self.name, error = %e, "failed to disarm idle timer");
        }
        self.idle_expired.store(false, Ordering::SeqCst);
        if let Some(id) = guard.idle_timer_item_id.take() {
            guard.pollset.remove(id);
            if let Err(e) = guard.pollset.wake() {
                warn!(node = %self.name, error = %e, "failed to wake worker");
            }
        }
    }

    fn schedule_idle_timer(&self) {
        let mut guard = self.inner.lock();
        if let Err(e) = guard.idle_timer.arm_oneshot(self.config.idle_timeout) {
            error!(node = %self.name, error = %e, "failed to arm idle timer");
            return;
        }
        if guard.idle_timer_item_id.is_some() {
            return;
        }
        let id = guard.alloc_item_id();
        let timer_fd = guard.idle_timer.as_raw_fd();
        let idle_expired = self.idle_expired.clone();
        let item = PollItem::new(id)
            .with_fd(FdInterest::readable(timer_fd))
            .with_after(move |ready| {
                if ready.iter().any(|r| r.fd == timer_fd && r.revents.is_readable()) {
                    let mut buf = [0u8; 8];
                    unsafe {
                        libc::read(timer_fd, buf.as_mut_ptr() as *mut libc::c_void, 8);
                    }
                    idle_expired.store(true, Ordering::SeqCst);
                }
            });
        if let Err(e) = guard.pollset.add(item) {
            error!(node = %self.name, error = %e, "failed to add idle timer to poll set");
            return;
        }
        guard.idle_timer_item_id = Some(id);
        let was_empty = guard.pollset.len() == 1;
        if let Err(e) = guard.pollset.wake() {
            warn!(node = %self.name, error = %e, "failed to wake worker");
        }
        drop(guard);
        if was_empty {
            self.ensure_worker_running();
        }
    }

    /// Invoked (on the Worker thread, outside its lock) when the idle-timer
    /// fd reported readiness. Must never join/drop the Worker directly —
    /// that would be the thread joining itself.
    fn on_idle_timer_fired(&self) {
        self.set_state(NodeState::Suspended);
    }

    /// The clock-update command's `state` field is not the node's own
    /// lifecycle state — the source hardcodes it to "running" regardless of
    /// what's driving the update — so this always passes a fixed value, not
    /// `self.state()`.
    fn send_clock_update(&self) {
        let command = {
            let guard = self.inner.lock();
            clock_update_command(guard.clock.as_ref(), NodeState::Running)
        };
        if let Err(e) = self.element.send_command(command) {
            warn!(node = %self.name, error = %e, "element rejected CLOCK_UPDATE");
        }
    }

    fn refresh_ports(&self) {
        let (_, max_in, _, max_out) = self.element.get_n_ports();
        let (input_ids, output_ids) = self.element.get_port_ids();
        self.inner.lock().ports.refresh(max_in, max_out, input_ids, output_ids);
    }

    fn ensure_worker_running(&self) {
        let mut worker_guard = self.worker.lock();
        let needs_spawn = worker_guard.as_ref().map_or(true, Worker::is_finished);
        if needs_spawn {
            match Worker::spawn(
                self.inner.clone(),
                self.idle_expired.clone(),
                self.on_idle_timeout.clone(),
            ) {
                Ok(worker) => *worker_guard = Some(worker),
                Err(e) => error!(node = %self.name, error = %e, "failed to spawn worker"),
            }
        }
    }

    pub(crate) fn handle_element_event(&self, event: ElementEvent) {
        match event {
            ElementEvent::PortAdded(id) => {
                self.refresh_ports();
                let direction = self.inner.lock().ports.direction_of(id);
                self.subscribers.publish(NodeEvent::PortAdded { direction, id });
            }
            ElementEvent::PortRemoved(id) => {
                self.refresh_ports();
                self.subscribers.publish(NodeEvent::PortRemoved { id });
            }
            ElementEvent::StateChange(element_state) => {
                self.inner.lock().element_state = element_state;
                if element_state == ElementState::Configure {
                    self.refresh_ports();
                }
                self.subscribers
                    .publish(NodeEvent::ElementStateChanged(element_state));
            }
            ElementEvent::AddPoll(item) => self.add_poll_item(item),
            ElementEvent::UpdatePoll(item) => self.update_poll_item(item),
            ElementEvent::RemovePoll(id) => self.remove_poll_item(id),
            ElementEvent::NeedInput => {}
            ElementEvent::HaveOutput => self.forward_output(),
            ElementEvent::ReuseBuffer { port_id, buffer_id } => self.forward_reuse(port_id, buffer_id),
            ElementEvent::RequestClockUpdate => self.send_clock_update(),
        }
    }

    fn add_poll_item(&self, item: PollItem) {
        let was_empty;
        {
            let mut guard = self.inner.lock();
            was_empty = guard.pollset.is_empty();
            if let Err(e) = guard.pollset.add(item) {
                error!(node = %self.name, error = %e, "failed to add poll item");
                return;
            }
            if let Err(e) = guard.pollset.wake() {
                warn!(node = %self.name, error = %e, "failed to wake worker");
            }
        }
        if was_empty {
            self.ensure_worker_running();
        }
    }

    fn update_poll_item(&self, item: PollItem) {
        let mut guard = self.inner.lock();
        if let Err(e) = guard.pollset.update(item) {
            error!(node = %self.name, error = %e, "failed to update poll item");
            return;
        }
        if let Err(e) = guard.pollset.wake() {
            warn!(node = %self.name, error = %e, "failed to wake worker");
        }
    }

    fn remove_poll_item(&self, id: PollItemId) {
        let empty_after;
        {
            let mut guard = self.inner.lock();
            guard.pollset.remove(id);
            if let Err(e) = guard.pollset.wake() {
                warn!(node = %self.name, error = %e, "failed to wake worker");
            }
            empty_after = guard.pollset.is_empty();
        }
        if empty_after {
            if let Some(worker) = self.worker.lock().as_ref() {
                worker.signal_stop();
            }
        }
    }

    /// Pull exactly one output buffer record and push it to every linked
    /// peer whose input side is currently `Streaming`, in output-link
    /// insertion order.
    fn forward_output(&self) {
        for pulled in self.element.port_pull_output(1) {
            if pulled.status != BufferStatus::Ok {
                warn!(node = %self.name, port_id = pulled.port_id, "pulled output buffer reported error status");
                continue;
            }
            let links: Vec<Arc<Link>> = {
                let guard = self.inner.lock();
                guard
                    .links
                    .iter(Direction::Output)
                    .filter_map(|(_, weak)| weak.upgrade())
                    .filter(|link| link.output_port == pulled.port_id)
                    .collect()
            };
            for link in links {
                let Some(input_node) = link.input_node().upgrade() else { continue };
                if input_node.element_state() != ElementState::Streaming {
                    continue;
                }
                let item = PushInputItem {
                    port_id: link.input_port(),
                    buffer_id: pulled.buffer_id,
                    flags: BufferFlags::None,
                };
                for result in input_node.element.port_push_input(&[item]) {
                    if let Err(e) = result {
                        warn!(
                            node = %self.name,
                            peer = %input_node.name,
                            error = %e,
                            "buffer forward failed",
                        );
                    }
                }
            }
        }
    }

    fn forward_reuse(&self, port_id: u32, buffer_id: u32) {
        let links: Vec<Arc<Link>> = {
            let guard = self.inner.lock();
            guard
                .links
                .iter(Direction::Input)
                .filter_map(|(_, weak)| weak.upgrade())
                .filter(|link| link.input_port() == port_id)
                .collect()
        };
        for link in links {
            let Some(output_node) = link.output_node.upgrade() else { continue };
            if let Err(e) = output_node.element.port_reuse_buffer(link.output_port, buffer_id) {
                warn!(
                    node = %self.name,
                    peer = %output_node.name,
                    error = %e,
                    "reuse_buffer forward failed",
                );
            }
        }
    }

    pub(crate) fn release_link_slot(&self, direction: Direction, index: usize) {
        let became_empty = self.inner.lock().links.release_link(direction, index);
        if became_empty {
            self.report_idle();
        }
    }

    /// Publish a "remove" notification and tear the node down: stop the
    /// Worker, drain link tables, release the element.
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_idle_timer();
        if let Some(mut worker) = self.worker.lock().take() {
            worker.join();
        }
        self.subscribers.publish(NodeEvent::Removed);
    }

    /// Link the output slot `output_slot` of `output_node` to the input
    /// slot `input_slot` of `input_node`.
    pub fn link(
        output_node: &Arc<Node>,
        output_slot: usize,
        input_node: &Arc<Node>,
        input_slot: usize,
        _format_filter: Option<MediaFormat>,
        _properties: HashMap<String, String>,
    ) -> Result<Arc<Link>, NodeError> {
        let existing = output_node.inner.lock().links.find(Direction::Output, output_slot);

        if let Some(link) = existing {
            let input_port = resolve_port(input_node, Direction::Input)?;
            link.retarget_input(Arc::downgrade(input_node), input_slot as u32, input_port);
            propagate_clock(output_node, input_node);
            return Ok(link);
        }

        let output_port = resolve_port(output_node, Direction::Output)?;
        let input_port = resolve_port(input_node, Direction::Input)?;

        let link = Link::new(
            Arc::downgrade(output_node),
            output_slot as u32,
            output_port,
            Arc::downgrade(input_node),
            input_slot as u32,
            input_port,
        );

        output_node
            .inner
            .lock()
            .links
            .reserve_link(Direction::Output, output_slot, Arc::downgrade(&link));
        input_node
            .inner
            .lock()
            .links
            .reserve_link(Direction::Input, input_slot, Arc::downgrade(&link));

        propagate_clock(output_node, input_node);

        let out_weak = Arc::downgrade(output_node);
        let in_weak = Arc::downgrade(input_node);
        link.on_removed(move || {
            if let Some(node) = out_weak.upgrade() {
                node.release_link_slot(Direction::Output, output_slot);
            }
            if let Some(node) = in_weak.upgrade() {
                node.release_link_slot(Direction::Input, input_slot);
            }
        });

        Ok(link)
    }
}

/// Allocate a free port on `node`, falling back to the first existing port
/// of that direction if the table is saturated; fails only when neither is
/// available.
fn resolve_port(node: &Arc<Node>, direction: Direction) -> Result<u32, NodeError> {
    let port = node.free_port(direction);
    if port != INVALID_PORT {
        return Ok(port);
    }
    let guard = node.inner.lock();
    let fallback = match direction {
        Direction::Input => guard.ports.input_ids().first().copied(),
        Direction::Output => guard.ports.output_ids().first().copied(),
    };
    fallback.ok_or(NodeError::NoPortAvailable(direction))
}

fn propagate_clock(output_node: &Arc<Node>, input_node: &Arc<Node>) {
    let clock = output_node.inner.lock().clock.clone();
    if let Some(clock) = clock {
        input_node.inner.lock().clock = Some(clock);
    }
}
