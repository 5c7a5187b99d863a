//! HTTP server: shared state, listener loop, request routing

pub mod http;

pub use http::{run, AppState};
