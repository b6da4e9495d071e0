//! Built-in node behaviors.

pub mod console_log;
pub mod decision;
pub mod multi_thread;
pub mod prompt;
pub mod set_state;
pub mod start;
pub mod thread_merge;

use crate::registry::OutputField;

/// The `name` output every node publishes.
fn name_field() -> OutputField {
    OutputField::new("name", "Node name", "Name used in the node")
}
