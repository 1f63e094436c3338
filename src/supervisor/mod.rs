//! Session supervision: launching, shutdown escalation and lifecycle state.

mod session;
mod shutdown;
mod state;

pub use session::*;
pub use shutdown::*;
pub use state::*;
