//! Request routing and handler lifecycle for an embeddable HTTP server.
//!
//! A [`router::Router`] maps normalized URI patterns to handlers in
//! registration order and lets handlers be enabled, disabled, or hot-swapped
//! while requests are running. Handlers that are executing are tracked with a
//! [`router::LiveCall`] guard; `replace` waits for them to drain before the
//! old handler is released.

pub mod config;
pub mod handlers;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
