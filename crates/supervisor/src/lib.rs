//! Handover's process supervision core.
//!
//! This crate implements the machinery behind the `handover` tool: it binds
//! listening sockets once, keeps them open for the supervisor's whole
//! lifetime, and hands them to successive generations of a supervised child
//! process, so the child binary can be replaced without ever closing a
//! listening socket.
//!
//! # Theory of Operation
//!
//! At startup, each configured listen address is bound and turned into a
//! [`PreparedSocket`](socket::PreparedSocket): the bound descriptor is
//! duplicated and the duplicate has its close-on-exec flag cleared, so it
//! survives into spawned children. The prepared descriptors are created once
//! and reused by every generation ever launched; they are never re-bound.
//!
//! A [`Generation`](generation::Generation) is one spawned instance of the
//! supervised command, bound to one of two slots, `a` or `b`. Each generation
//! is watched by its own task, whose sole job is to wait for the process to
//! end and push an exit note back to the event loop; graceful stop requests
//! are also delivered through that task, so the loop never touches a child
//! handle directly.
//!
//! The [`Supervisor`](supervisor::Supervisor) owns all mutable state and runs
//! the event loop: a single task which serialises exit notes, reload and
//! termination requests, and overlap-timer expiries into one-at-a-time state
//! transitions. On reload, a replacement generation is launched into the
//! inactive slot, the slots swap, and the outgoing generation is told to stop
//! after a fixed overlap window. Anything else that wants to influence the
//! supervisor does so by sending a control message through a
//! [`Handle`](supervisor::Handle); the OS signal worker in [`signal`] is just
//! one such sender.

#![warn(clippy::unwrap_used, missing_docs, rustdoc::unescaped_backticks)]
#![deny(rust_2018_idioms)]

#[doc(inline)]
pub use error::CriticalError;
#[doc(inline)]
pub use supervisor::{Handle, Supervisor, OVERLAP_WINDOW};

pub mod error;
pub mod generation;
pub mod signal;
pub mod socket;
pub mod supervisor;
