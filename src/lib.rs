//! `node-runtime`: the per-node runtime of a media-processing daemon.
//!
//! A [`Node`] wraps a single media-processing element (a "SPA node"), owns
//! its input/output ports, runs a poll-driven worker thread, mediates
//! buffer flow along [`Link`]s to peer nodes, and tracks a small lifecycle
//! state machine with idle decay.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use node_runtime::config::NodeConfig;
//! use node_runtime::element::fake::FakeElement;
//! use node_runtime::state::NodeState;
//! use node_runtime::Node;
//!
//! let element = Arc::new(FakeElement::new());
//! element.set_ports(0, 2, vec![], vec![0, 1]);
//!
//! let node = Node::new("mic-capture", None, HashMap::new(), element, NodeConfig::default())
//!     .expect("construct node");
//!
//! node.set_state(NodeState::Running);
//! assert_eq!(node.state(), NodeState::Running);
//! ```

#[macro_use]
mod sys;

pub mod clock;
pub mod config;
pub mod element;
pub mod error;
pub mod events;
pub mod link;
mod node;
pub mod pollset;
pub mod port;
pub mod state;
mod worker;

pub use error::{NodeError, Result};
pub use events::NodeEvent;
pub use link::{Link, LinkSnapshot};
pub use node::Node;
pub use port::Direction;
pub use state::NodeState;
