//! Tidal Runtime - drives tidal programs.
//!
//! The evaluator in `tidal-incremental` runs single ticks. This crate puts a
//! program to work: an [`Instance`] binds a network endpoint for its
//! channels, opens the stores of its persistent collections, fires periodic
//! timers and calls back into the host when collections change.
//!
//! # Running
//!
//! - [`Instance::tick`]: one timestep on the caller's thread
//! - [`Instance::run_background`]: tick on a dedicated thread whenever a
//!   message, a timer or a piece of work arrives; returns a [`Controller`]
//! - [`Instance::run_foreground`]: the same, blocking until the instance stops
//!
//! An instance stops when [`Instance::stop`] is called or when a tick leaves
//! a tuple in the built-in `halt` collection.
//!
//! # Example
//!
//! ```rust
//! use tidal_core::tuple;
//! use tidal_incremental::{Plan, Program};
//! use tidal_runtime::{Instance, Options};
//!
//! let program = Program::new()
//!     .unwrap()
//!     .channel("ping", &["@addr", "n"], &[])
//!     .unwrap()
//!     .table("log", &["n"], &[])
//!     .unwrap()
//!     .merge_now("log", Plan::scan("ping"))
//!     .unwrap();
//!
//! let node = Instance::new(program, Options::default()).unwrap();
//! node.start().unwrap();
//! node.deliver("ping", tuple![1]);
//! node.tick().unwrap();
//! assert_eq!(node.contents("log").unwrap(), vec![tuple![1]]);
//! node.stop().unwrap();
//! ```

mod controller;
mod inbox;
mod instance;
mod manager;
mod observer;
mod options;
mod timer;
pub mod transport;

pub use controller::Controller;
pub use inbox::Inbox;
pub use instance::{Instance, InstanceId, Lifecycle};
pub use manager::InstanceManager;
pub use observer::{Callback, CallbackId, Hook, HookId};
pub use options::{ChannelFilter, Options, TransportConfig};
pub use transport::{LocalNetwork, LocalTransport, Transport, UdpTransport};
