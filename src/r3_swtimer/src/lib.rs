//! A deferred software timer service.
//!
//! This crate lets any part of a system schedule a callback to run once
//! (*one-shot*) or repeatedly (*periodic*) after a number of tick periods. The
//! work is split between two contexts:
//!
//!  - The **tick handler** ([`TimerService::timer_tick`]) runs in an interrupt
//!    context on every tick. It only does bounded bookkeeping on the *delta
//!    list* of armed timers and hands every expired timer's callback over to
//!    the dispatch queue without ever blocking.
//!
//!  - The **dispatcher** ([`TimerService::run_dispatcher`]) runs on a single
//!    dedicated thread, pops the queue, and invokes the callbacks in an
//!    ordinary thread context, where they are free to call blocking
//!    operations.
//!
//! The hardware tick source, the critical-section primitive, the bounded
//! queue, and the thread creation facility are provided by a *port* through
//! the traits in [`port`]. `r3_swtimer_port_std` is a port that runs the
//! service on a hosted environment.
//!
//! # Timer States
//!
//! See [`TimerState`].
//!
//! # Example
//!
//! ```rust,ignore
//! let timer = TimerDefiner::new()
//!     .kind(TimerKind::Periodic)
//!     .start(|param| log::info!("tick! {param}"))
//!     .param(42)
//!     .name("heartbeat")
//!     .finish(&service)?;
//!
//! service.start(timer, 50)?;
//! ```
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
extern crate alloc;

mod cfg;
mod delta_list;
mod dispatch;
mod error;
mod klock;
pub mod port;
mod service;
mod state;
mod tick;
mod timer;

#[cfg(test)]
mod test_port;

pub use self::{cfg::*, dispatch::*, error::*, port::Port, service::*, timer::*};

/// Unsigned integer type representing a tick count.
pub type Ticks = u32;

/// The sentinel delay value meaning "never fires".
///
/// A timer started with this value enters the Running state but is never
/// linked to the delta list, so it stays Running until stopped or deleted.
pub const TICKS_FOREVER: Ticks = Ticks::MAX;
