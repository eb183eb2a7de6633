//! Generated client/message types for the Riva-compatible recognizer and
//! synthesizer (spec.md §4.1, §6). See `proto/riva_speech.proto`.

pub mod riva_speech {
    tonic::include_proto!("riva_speech");
}
