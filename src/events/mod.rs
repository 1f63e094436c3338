//! Events flowing from the supervisor core to its consumer.

mod sink;
mod types;

pub use sink::*;
pub use types::*;
