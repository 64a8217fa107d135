//! Conversation transcript management.

mod transcript;

pub use transcript::Transcript;
