//! Wake packet dispatch
//!
//! Single sink shared by the trigger watcher and the queue processor.

mod dispatcher;

pub use dispatcher::{DispatchOutcome, PacketDispatcher};
