//! Async runtime: instance tasks, timed capture and paced playback.
//!
//! Everything here is a thin shell over the synchronous engine, recorder and
//! replay controller. Time enters only through tokio intervals.

mod gateway;
mod station;

pub use gateway::{Gateway, GatewayError, LoopbackGateway};
pub use station::Station;
