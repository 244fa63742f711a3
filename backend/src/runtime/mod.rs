//! Background execution: the scheduler state machine and the thread that drives it

pub mod scheduler;
pub mod worker;

pub use scheduler::{ProtocolError, Scheduler, SchedulerState};
pub use worker::FlowEngine;
