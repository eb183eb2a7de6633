//! Stateful services layered on top of `inference_providers` (spec.md §4.2,
//! §4.3, §4.5): the session store, the turn pipeline, and the metrics
//! surface they both record into.

pub mod metrics;
pub mod session;
pub mod turn;
