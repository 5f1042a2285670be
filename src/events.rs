use std::sync::{Arc, Mutex};

use concurrent_queue::ConcurrentQueue;

use crate::element::ElementState;
use crate::port::Direction;
use crate::state::NodeState;

/// Notifications published to subscribers. Delivered through a bounded
/// queue per subscriber, drained by the control thread — never by the
/// Worker.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    PortAdded { direction: Direction, id: u32 },
    PortRemoved { id: u32 },
    StateChanged(NodeState),
    ElementStateChanged(ElementState),
    Removed,
}

/// Fan-out of [`NodeEvent`]s: one bounded [`ConcurrentQueue`] per
/// subscriber. A full or disconnected queue just drops the event rather
/// than blocking the publisher.
pub struct Subscribers {
    queues: Mutex<Vec<Arc<ConcurrentQueue<NodeEvent>>>>,
}

impl Subscribers {
    pub fn new() -> Subscribers {
        Subscribers {
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, capacity: usize) -> Arc<ConcurrentQueue<NodeEvent>> {
        let queue = Arc::new(ConcurrentQueue::bounded(capacity));
        self.queues.lock().unwrap().push(queue.clone());
        queue
    }

    pub fn publish(&self, event: NodeEvent) {
        let mut queues = self.queues.lock().unwrap();
        queues.retain(|queue| !queue.is_closed());
        for queue in queues.iter() {
            let _ = queue.push(event.clone());
        }
    }
}

impl Default for Subscribers {
    fn default() -> Subscribers {
        Subscribers::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subscriber_receives_published_event() {
        let subscribers = Subscribers::new();
        let queue = subscribers.subscribe(4);
        subscribers.publish(NodeEvent::Removed);
        assert!(matches!(queue.pop().unwrap(), NodeEvent::Removed));
    }

    #[test]
    fn closed_subscriber_is_dropped_from_fan_out() {
        let subscribers = Subscribers::new();
        let queue = subscribers.subscribe(4);
        queue.close();
        subscribers.publish(NodeEvent::Removed);
        assert_eq!(subscribers.queues.lock().unwrap().len(), 0);
    }
}
