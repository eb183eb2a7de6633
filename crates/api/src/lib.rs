//! The voice gateway's HTTP/WebSocket surface: route handlers, shared
//! application state, and graceful-shutdown wiring. Split out as a library
//! target (in addition to the `voice-gateway` binary) so integration tests
//! can drive `routes::build_router` directly, the way the teacher's `api`
//! crate exposes `routes` for its own `tests/e2e_*.rs` suite.

pub mod routes;
pub mod shutdown;
pub mod state;
