//! Core functionality for the iTAG bridge
//! This module contains the tag lifecycle, click detection and the task
//! timers they share.

pub mod bluetooth;
pub mod button;
pub mod timer;

// Re-export commonly used types
pub use bluetooth::TagManager;
pub use button::{ClickDisambiguator, ClickEvent};
