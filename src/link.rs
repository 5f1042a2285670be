use std::sync::{Arc, Mutex, Weak};

use crate::node::Node;
use crate::port::Direction;

pub type NodeHandle = Weak<Node>;

struct LinkTarget {
    input_node: NodeHandle,
    input_id: u32,
    input_port: u32,
}

/// A link between one output port of one node and one input port of
/// another. Owned by whichever external collaborator negotiated it (out of
/// scope here); the node only ever holds a [`Weak`] reference in its
/// [`LinkSlots`], and subscribes to `on_removed` to release its own slot —
/// that breaks the Node/Link reference cycle without either side owning
/// the other.
///
/// The output side is fixed at construction. The input side lives behind a
/// small lock because `Node::link` can re-target an existing link's input
/// without tearing it down.
pub struct Link {
    pub output_node: NodeHandle,
    pub output_id: u32,
    pub output_port: u32,
    target: Mutex<LinkTarget>,
    removal: Mutex<Vec<Box<dyn FnMut() + Send>>>,
}

impl Link {
    pub fn new(
        output_node: NodeHandle,
        output_id: u32,
        output_port: u32,
        input_node: NodeHandle,
        input_id: u32,
        input_port: u32,
    ) -> Arc<Link> {
        Arc::new(Link {
            output_node,
            output_id,
            output_port,
            target: Mutex::new(LinkTarget {
                input_node,
                input_id,
                input_port,
            }),
            removal: Mutex::new(Vec::new()),
        })
    }

    pub fn input_node(&self) -> NodeHandle {
        self.target.lock().unwrap().input_node.clone()
    }

    pub fn input_id(&self) -> u32 {
        self.target.lock().unwrap().input_id
    }

    pub fn input_port(&self) -> u32 {
        self.target.lock().unwrap().input_port
    }

    pub fn retarget_input(&self, input_node: NodeHandle, input_id: u32, input_port: u32) {
        let mut target = self.target.lock().unwrap();
        target.input_node = input_node;
        target.input_id = input_id;
        target.input_port = input_port;
    }

    /// Register a callback to run when [`Link::remove`] fires. Both
    /// endpoints subscribe, each to release its own slot.
    pub fn on_removed(&self, callback: impl FnMut() + Send + 'static) {
        self.removal.lock().unwrap().push(Box::new(callback));
    }

    /// Publish removal: every subscriber releases its slot.
    pub fn remove(&self) {
        for callback in self.removal.lock().unwrap().iter_mut() {
            callback();
        }
    }
}

/// A point-in-time copy of a link's endpoints, returned by
/// [`crate::node::Node::get_links`] as a real snapshot of non-empty slots.
#[derive(Debug, Clone)]
pub struct LinkSnapshot {
    pub output_id: u32,
    pub output_port: u32,
    pub input_id: u32,
    pub input_port: u32,
}

/// A single direction's sparse port-index → link table.
#[derive(Default)]
pub struct LinkSlots {
    slots: Vec<Option<Weak<Link>>>,
}

impl LinkSlots {
    pub fn new() -> LinkSlots {
        LinkSlots::default()
    }

    /// First empty slot index, or `len()` if every slot is occupied.
    pub fn free_slot(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| slot.is_none())
            .unwrap_or(self.slots.len())
    }

    pub fn reserve(&mut self, index: usize, link: Weak<Link>) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(link);
    }

    /// Clear the slot at `index`. Returns whether it had been occupied.
    pub fn release(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn used_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Weak<Link>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|link| (index, link)))
    }
}

/// Both directions' [`LinkSlots`], giving the node a single place to reserve,
/// release, and enumerate its links.
#[derive(Default)]
pub struct LinkRegistry {
    input: LinkSlots,
    output: LinkSlots,
}

impl LinkRegistry {
    pub fn new() -> LinkRegistry {
        LinkRegistry::default()
    }

    fn slots(&self, direction: Direction) -> &LinkSlots {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    fn slots_mut(&mut self, direction: Direction) -> &mut LinkSlots {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    pub fn free_slot(&self, direction: Direction) -> usize {
        self.slots(direction).free_slot()
    }

    pub fn find(&self, direction: Direction, index: usize) -> Option<Arc<Link>> {
        self.slots(direction)
            .iter()
            .find(|(idx, _)| *idx == index)
            .and_then(|(_, weak)| weak.upgrade())
    }

    pub fn reserve_link(&mut self, direction: Direction, index: usize, link: Weak<Link>) {
        self.slots_mut(direction).reserve(index, link);
    }

    /// Release the slot. Returns whether the per-direction count reached
    /// zero as a result — the caller uses this to decide whether to call
    /// `report_idle()`.
    pub fn release_link(&mut self, direction: Direction, index: usize) -> bool {
        let released = self.slots_mut(direction).release(index);
        released && self.slots(direction).used_count() == 0
    }

    pub fn used_count(&self, direction: Direction) -> usize {
        self.slots(direction).used_count()
    }

    pub fn iter(&self, direction: Direction) -> impl Iterator<Item = (usize, &Weak<Link>)> {
        self.slots(direction).iter()
    }

    pub fn snapshot(&self, direction: Option<Direction>) -> Vec<LinkSnapshot> {
        let directions: Vec<Direction> = match direction {
            Some(d) => vec![d],
            None => vec![Direction::Input, Direction::Output],
        };
        let mut out = Vec::new();
        for d in directions {
            for (_, weak) in self.slots(d).iter() {
                if let Some(link) = weak.upgrade() {
                    out.push(LinkSnapshot {
                        output_id: link.output_id,
                        output_port: link.output_port,
                        input_id: link.input_id(),
                        input_port: link.input_port(),
                    });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dummy_link() -> Arc<Link> {
        Link::new(Weak::new(), 0, 0, Weak::new(), 0, 0)
    }

    #[test]
    fn free_slot_is_zero_when_empty() {
        let slots = LinkSlots::new();
        assert_eq!(slots.free_slot(), 0);
    }

    #[test]
    fn reserve_then_release_tracks_used_count() {
        let mut slots = LinkSlots::new();
        let link = dummy_link();
        slots.reserve(0, Arc::downgrade(&link));
        assert_eq!(slots.used_count(), 1);
        assert!(slots.release(0));
        assert_eq!(slots.used_count(), 0);
    }

    #[test]
    fn release_reaching_zero_is_reported() {
        let mut registry = LinkRegistry::new();
        let link = dummy_link();
        registry.reserve_link(Direction::Output, 0, Arc::downgrade(&link));
        assert!(registry.release_link(Direction::Output, 0));
    }

    #[test]
    fn release_not_reaching_zero_is_not_reported() {
        let mut registry = LinkRegistry::new();
        let a = dummy_link();
        let b = dummy_link();
        registry.reserve_link(Direction::Output, 0, Arc::downgrade(&a));
        registry.reserve_link(Direction::Output, 1, Arc::downgrade(&b));
        assert!(!registry.release_link(Direction::Output, 0));
    }

    #[test]
    fn link_removal_notifies_subscribers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let link = dummy_link();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        link.on_removed(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        link.remove();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retarget_input_updates_target_fields() {
        let link = dummy_link();
        link.retarget_input(Weak::new(), 7, 9);
        assert_eq!(link.input_id(), 7);
        assert_eq!(link.input_port(), 9);
    }
}
