// Core data model for the voice gateway.
//
// Sessions, turns and the wire-frame enums are plain data: no I/O, no
// provider clients. `inference_providers` and `services` depend on this
// crate; it depends on nothing in the workspace.

pub mod errors;
pub mod frame;
pub mod language;
pub mod session;
pub mod turn;

pub use errors::GatewayError;
pub use frame::{ClientFrame, ConfigFrame, ControlMessage, ServerEvent, ServerFrame};
pub use language::PromptTable;
pub use session::{Session, SessionState};
pub use turn::{audio_duration_ms, HistoryEntry, Role, Turn, TurnTimestamps};
