//! Flow graph model.
//!
//! A flow is a directed graph of typed [`Node`]s joined by [`Edge`]s. Every
//! node carries a thread tag naming the logical lane it runs on; the
//! [`threads`](crate::threads) module keeps those tags consistent as edges
//! are added and removed.

pub mod edge;
pub mod model;
pub mod node;

pub use edge::{DecisionKind, DecisionMeta, Edge};
pub use model::{FlowDocument, FlowGraph};
pub use node::{Node, NodeData, NodeKind};
