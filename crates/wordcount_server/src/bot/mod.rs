#![forbid(unsafe_code)]

pub mod commands;
pub mod counting;
pub mod dispatch;
pub mod runtime;
pub mod state;
pub mod sweep;

pub use runtime::{Bot, run_event_loop};





#[cfg(test)]
mod test_support;
