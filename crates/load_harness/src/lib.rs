//! Virtual-user load generator for the voice gateway (spec.md §4.6, C6).
//!
//! Spawns *U* virtual users over a ramp-up period, holds, and ramps down;
//! each user opens its own `/ws/voice` stream, replays a recorded audio
//! file, and times the ASR/LLM/TTS/E2E stages. See `runner` for the
//! orchestration and `collector` for percentile aggregation.

pub mod audio_pool;
pub mod collector;
pub mod config;
pub mod protocol;
pub mod runner;
pub mod worker;
