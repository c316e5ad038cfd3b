//! Junction state machine, signal scheduler, and emergency preemption for
//! the Velocity junction controller.
//!
//! Each junction rotates right-of-way North, South, East, West on a fixed
//! GREEN/YELLOW cycle. An emergency trigger preempts the rotation into
//! North GREEN with everything else RED, then reverts to cycling after a
//! fixed window.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `velocity-config.yaml` into
//!   strongly-typed structs.
//! - [`timer`] -- Per-junction table of pending transitions, one per
//!   purpose, with epoch handles.
//! - [`junction`] -- The [`Junction`] state machine and its invariants.
//! - [`scheduler`] -- The auto-cycle rotation.
//! - [`preemption`] -- Emergency triggers and reversion.
//! - [`sink`] -- [`EventSink`] trait for outbound events.
//! - [`worker`] -- One tokio task per junction, the junction's lock.
//! - [`registry`] -- [`JunctionRegistry`], the entry point for transports.
//!
//! [`Junction`]: junction::Junction
//! [`EventSink`]: sink::EventSink
//! [`JunctionRegistry`]: registry::JunctionRegistry

pub mod config;
pub mod junction;
pub mod preemption;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod timer;
pub mod worker;

pub use config::{ConfigError, VelocityConfig};
pub use junction::Junction;
pub use registry::JunctionRegistry;
pub use sink::{EventSink, FanoutSink, NoopSink};
pub use worker::{ControllerError, JunctionHandle};
