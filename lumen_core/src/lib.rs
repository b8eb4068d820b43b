//! Core primitives shared by every other `lumen_*` crate: a monotonic clock,
//! a bounded multi-queue dispatch primitive (FIFO/Deq) and a generational
//! object container. None of this module touches the GPU; it is the part of
//! the runtime that can be unit tested without a physical device.

pub mod clock;
pub mod container;
pub mod deq;
pub mod fifo;

pub use clock::Clock;
pub use container::{Container, Handle};
pub use deq::Deq;
pub use fifo::Fifo;
