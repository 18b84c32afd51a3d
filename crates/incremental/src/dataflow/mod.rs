//! Push dataflow built from rule bodies.
//!
//! Each stratum owns a list of elements in topological order: scanners that
//! read collections, operator elements built from plan nodes, and one sink
//! per rule that writes into the rule's head.

mod graph;
pub mod node;

pub use graph::{arity, input_names, validate, Dataflow, Stratum};
pub use node::{item_tuple, Element, ElementId, ElementKind, ElementStats};
