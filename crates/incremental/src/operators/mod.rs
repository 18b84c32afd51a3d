//! Stateful operators used by dataflow elements.
//!
//! - Join: semi-naive multi-way equi-join with optional outer padding
//! - Anti-join: `not_in`
//! - Aggregate: grouped aggregates and exemplary (argmin/argmax) aggregates

mod aggregate;
mod antijoin;
mod join;

pub use aggregate::{AggFunc, AggSpec, ArgAggState, ArgKind, GroupState};
pub use antijoin::NotInState;
pub use join::{JoinPredicate, JoinState};
