//! Glue between the protocol core and the event loop
//!
//! - [`socket`] provides the listening socket clients connect to, as a [`calloop`] event source.
//! - [`event_loop`] drives a [`Display`](crate::server::Display) from a [`calloop`] event loop.

pub mod event_loop;
pub mod socket;
