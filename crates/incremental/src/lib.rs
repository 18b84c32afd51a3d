//! Tidal Incremental - stratified semi-naive tick evaluation.
//!
//! A program is a set of declared collections plus rules of the form
//! `lhs op body`, where `body` is a [`Plan`] over other collections. The
//! [`Evaluator`] advances the program one timestep at a time. Within a tick
//! each stratum runs to a fixpoint; between ticks the engine keeps join
//! indexes and aggregate state, and a static analysis decides which parts of
//! the dataflow must rescan or drop their state when a collection shrinks.
//!
//! # Core Concepts
//!
//! - [`Relation`]: a keyed set of tuples with storage, delta, new-delta and
//!   pending partitions
//! - [`LatticeCell`]: a single lattice value with the same partitions
//! - [`RuleOp`]: `<=` (this tick), `<+` (next tick), `<~` (async send),
//!   `<-` (delete at the next tick)
//! - [`Dataflow`]: the per-stratum push graph wired from the rules
//! - [`Analysis`]: default rescan/invalidate sets and per-table diffs
//!
//! # Example
//!
//! ```rust
//! use tidal_core::tuple;
//! use tidal_incremental::{ColumnRef, EvalConfig, Evaluator, Plan, Program, TickInput};
//!
//! let program = Program::new()
//!     .unwrap()
//!     .table("link", &["from", "to"], &[])
//!     .unwrap()
//!     .table("path", &["from", "to"], &[])
//!     .unwrap()
//!     .merge_now("path", Plan::scan("link"))
//!     .unwrap()
//!     .merge_now(
//!         "path",
//!         Plan::join(
//!             vec![Plan::scan("link"), Plan::scan("path")],
//!             vec![(ColumnRef::new("link", "to"), ColumnRef::new("path", "from"))],
//!         )
//!         .map(|t, _| Ok(tuple![t.values()[0].clone(), t.values()[3].clone()])),
//!     )
//!     .unwrap()
//!     .bootstrap("link", vec![tuple![1, 2], tuple![2, 3]])
//!     .unwrap();
//!
//! let mut ev = Evaluator::new(program, EvalConfig::default()).unwrap();
//! ev.tick(TickInput::new(0)).unwrap();
//! assert_eq!(ev.relation("path").unwrap().len(), 3);
//! ```

#![no_std]

extern crate alloc;

pub mod analysis;
pub mod catalog;
pub mod collection;
pub mod dataflow;
pub mod delta;
pub mod evaluator;
pub mod operators;
pub mod plan;
pub mod rule;

pub use analysis::{Analysis, InvalidationDiff};
pub use catalog::{Catalog, HALT, LOCALTICK, PERIODICS_TBL};
pub use collection::{Collection, CollectionKind, LatticeCell, Outbound, Relation, RuleOp};
pub use dataflow::{Dataflow, ElementId, ElementStats};
pub use delta::{ChangeSet, Delta};
pub use evaluator::{EvalConfig, EvalPhase, Evaluator, TickInput, TickOutput};
pub use operators::{AggFunc, AggSpec, ArgKind};
pub use plan::{ColumnRef, EvalContext, Item, Plan};
pub use rule::{Program, RuleDescriptor};
