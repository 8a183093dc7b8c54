//! The facts data model and the builder that composes records from registry metadata.

mod builder;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use builder::*;
pub use types::*;
