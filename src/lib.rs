pub mod command;
pub mod config;
pub mod core;
pub mod feed;
pub mod platform;
pub mod scheduler;
pub mod signal;
pub mod sim;

pub use crate::core::{SchedCore, SchedError, SchedEvent};
pub use platform::{Outcome, Platform, ProcessHandle, UnixPlatform};
pub use scheduler::Scheduler;
pub use sim::SimPlatform;
