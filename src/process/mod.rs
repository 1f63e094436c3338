//! Child process launching, process-group control and output reading.

mod group;
mod launch;
mod output;

pub use group::*;
pub use launch::*;
pub use output::*;
