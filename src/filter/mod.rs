//! Output noise filtering shared by the process reader and the log tailer.

mod rules;

pub use rules::*;
