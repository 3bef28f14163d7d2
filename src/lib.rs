#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # acomp: a minimal Wayland compositor core
//!
//! This crate implements the server side of the Wayland protocol for a small set of
//! interfaces: `wl_display`, `wl_registry`, `wl_callback`, `wl_compositor`,
//! `wl_surface`, `wl_region`, `wl_shm`, `wl_shm_pool` and `wl_buffer`. Rendering is
//! left to the embedder, which is told about surface commits through the
//! [`CompositorHandler`](compositor::CompositorHandler) trait.
//!
//! ## Structure of the crate
//!
//! - [`transport`] contains the listening socket and the buffered client sockets,
//!   passing file descriptors alongside the bytes.
//! - [`wire`] encodes and decodes protocol messages.
//! - [`protocol`] describes the supported interfaces and their message signatures.
//! - [`server`] contains the [`Display`](server::Display): the clients, their objects,
//!   the globals and the dispatching of requests.
//! - [`compositor`] and [`shm`] hold the state of surfaces, regions and buffers.
//! - [`wayland`] ties it all to a [`calloop`] event loop.
//!
//! ## The event loop and state handling
//!
//! Everything runs on a single thread. The [`CompositorLoop`](wayland::event_loop::CompositorLoop)
//! owns the display and the handler and passes them by mutable reference to the
//! [`calloop`] callbacks, so no synchronization is needed. Additional event sources,
//! such as a frame timer, can be inserted through its
//! [`handle`](wayland::event_loop::CompositorLoop::handle).
//!
//! ## Logging
//!
//! This crate makes extensive use of [`tracing`] for its internal logging. It does not
//! install a subscriber, this is up to the binary embedding it.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

pub mod compositor;
pub mod protocol;
pub mod server;
pub mod shm;
pub mod transport;
pub mod utils;
pub mod wayland;
pub mod wire;

pub mod reexports;
