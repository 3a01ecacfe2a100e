//! Async orchestration around the pure state machine: the engine actor task
//! and the countdown timers feeding it.

pub mod engine;
pub mod timer;
