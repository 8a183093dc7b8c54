//! The versioned `facts.json` envelope: serialization, parsing, and schema validation.

mod serialize;
mod validate;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use serialize::*;
pub use validate::*;
