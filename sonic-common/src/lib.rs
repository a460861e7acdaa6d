//! # SonicScribe Common Library
//!
//! Shared code for the SonicScribe workspace:
//! - Note sequence data model
//! - Event types (ScribeEvent enum) and the EventBus
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod note_sequence;

pub use error::{Error, Result};
pub use note_sequence::{Note, NoteSequence};
