//! The resilient batch collector and its collaborators: error classification, retry and
//! fallback handling, and the TTL facts cache.

mod cache;
mod classify;
mod collector;
mod handler;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use cache::*;
pub use classify::*;
pub use collector::*;
pub use handler::*;
