//! Agent orchestration: the periodic scan loop, component lifecycle and
//! shutdown signal handling.
//!
//! [`LifecycleManager`] owns the scan provider and the delivery client,
//! starts them in order, drives one [`AgentLoop`] and tears everything down
//! in reverse. [`ShutdownTrigger`] turns OS signals into a single
//! cancellation.

mod agent_loop;
mod lifecycle;
pub mod signal;
mod state;

pub use agent_loop::{AgentLoop, LoopConfig, LoopSummary};
pub use lifecycle::{AlreadyRunning, FatalError, InitCause, InstanceGuard, LifecycleManager, RunSummary};
pub use signal::{ShutdownTrigger, spawn_signal_listener};
pub use state::AgentState;
