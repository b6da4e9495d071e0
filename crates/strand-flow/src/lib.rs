pub mod clipboard;
pub mod context;
pub mod executor;
pub mod expr;
pub mod graph;
pub mod nodes;
pub mod registry;
pub mod run_log;
pub mod runtime;
pub mod threads;
pub mod values;

pub use context::{ExecutionContext, SharedContext};
pub use executor::{FlowExecutor, RunReport};
pub use graph::{DecisionKind, DecisionMeta, Edge, FlowDocument, FlowGraph, Node, NodeData, NodeKind};
pub use registry::{NodeBehavior, NodeMetadata, NodeRegistry, OutputField, ProcessScope};
pub use run_log::RunLogger;
pub use runtime::{RunStore, StateWatch};
pub use threads::{GraphChange, ThreadMaintainer};
pub use values::available_values;
