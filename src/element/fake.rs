//! A scriptable in-process `Element` double, exercising the state machine,
//! poll set and event router without a real plug-in host.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Clock, Command, Element, ElementEvent, MediaFormat, PulledBuffer, PushInputItem};
use crate::port::Direction;

/// A clock that always reports the same fixed triple.
pub struct FakeClock {
    pub rate: u32,
    pub ticks: u64,
    pub monotonic_time: i64,
}

impl Clock for FakeClock {
    fn get_time(&self) -> (u32, u64, i64) {
        (self.rate, self.ticks, self.monotonic_time)
    }
}

#[derive(Default)]
struct Inner {
    max_input: u32,
    max_output: u32,
    input_ids: Vec<u32>,
    output_ids: Vec<u32>,
    callback: Option<Arc<dyn Fn(ElementEvent) + Send + Sync>>,
    commands: Vec<Command>,
    pending_output: VecDeque<PulledBuffer>,
    pushed: Vec<PushInputItem>,
    reused: Vec<(u32, u32)>,
    clock: Option<Arc<dyn Clock>>,
    reject_commands: bool,
    reject_format: bool,
    formats: Vec<(Direction, u32, Option<MediaFormat>)>,
}

/// Test double for [`Element`]. Script it with `queue_output`/`set_ports`/
/// `fail_commands` before handing it to [`crate::node::Node::new`], then
/// drive element-raised events with [`FakeElement::emit`].
#[derive(Default)]
pub struct FakeElement {
    inner: Mutex<Inner>,
}

impl FakeElement {
    pub fn new() -> FakeElement {
        FakeElement::default()
    }

    pub fn set_ports(&self, max_input: u32, max_output: u32, input_ids: Vec<u32>, output_ids: Vec<u32>) {
        let mut inner = self.inner.lock();
        inner.max_input = max_input;
        inner.max_output = max_output;
        inner.input_ids = input_ids;
        inner.output_ids = output_ids;
    }

    pub fn set_clock(&self, clock: Arc<dyn Clock>) {
        self.inner.lock().clock = Some(clock);
    }

    pub fn fail_commands(&self, reject: bool) {
        self.inner.lock().reject_commands = reject;
    }

    pub fn fail_format(&self, reject: bool) {
        self.inner.lock().reject_format = reject;
    }

    pub fn queue_output(&self, buffer: PulledBuffer) {
        self.inner.lock().pending_output.push_back(buffer);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.inner.lock().commands.clone()
    }

    pub fn pushed_inputs(&self) -> Vec<PushInputItem> {
        self.inner.lock().pushed.clone()
    }

    pub fn reused_buffers(&self) -> Vec<(u32, u32)> {
        self.inner.lock().reused.clone()
    }

    pub fn formats(&self) -> Vec<(Direction, u32, Option<MediaFormat>)> {
        self.inner.lock().formats.clone()
    }

    /// Simulate the element raising `event` on whatever callback the node
    /// installed via `set_event_callback`. Clones the callback out and drops
    /// the lock before invoking it — the node's handler re-enters this same
    /// `FakeElement` for several event kinds (`HaveOutput`, `PortAdded`,
    /// `StateChange`), and holding the lock across the call would deadlock.
    pub fn emit(&self, event: ElementEvent) {
        let cb = self.inner.lock().callback.clone();
        if let Some(cb) = cb {
            cb(event);
        }
    }
}

impl Element for FakeElement {
    fn get_n_ports(&self) -> (u32, u32, u32, u32) {
        let inner = self.inner.lock();
        (
            inner.input_ids.len() as u32,
            inner.max_input,
            inner.output_ids.len() as u32,
            inner.max_output,
        )
    }

    fn get_port_ids(&self) -> (Vec<u32>, Vec<u32>) {
        let inner = self.inner.lock();
        (inner.input_ids.clone(), inner.output_ids.clone())
    }

    fn set_event_callback(&self, callback: Box<dyn Fn(ElementEvent) + Send + Sync>) {
        self.inner.lock().callback = Some(Arc::from(callback));
    }

    fn send_command(&self, command: Command) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.reject_commands {
            return Err("fake element rejected command".into());
        }
        inner.commands.push(command);
        Ok(())
    }

    fn port_set_format(
        &self,
        direction: Direction,
        port_id: u32,
        format: Option<MediaFormat>,
    ) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.reject_format {
            return Err("fake element rejected format".into());
        }
        inner.formats.push((direction, port_id, format));
        Ok(())
    }

    fn port_push_input(&self, items: &[PushInputItem]) -> Vec<Result<(), String>> {
        let mut inner = self.inner.lock();
        inner.pushed.extend_from_slice(items);
        items.iter().map(|_| Ok(())).collect()
    }

    fn port_pull_output(&self, max: usize) -> Vec<PulledBuffer> {
        let mut inner = self.inner.lock();
        let n = max.min(inner.pending_output.len());
        inner.pending_output.drain(..n).collect()
    }

    fn port_reuse_buffer(&self, port_id: u32, buffer_id: u32) -> Result<(), String> {
        self.inner.lock().reused.push((port_id, buffer_id));
        Ok(())
    }

    fn get_clock(&self) -> Option<Arc<dyn Clock>> {
        self.inner.lock().clock.clone()
    }
}
