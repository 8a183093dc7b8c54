//! Registry protocol client: OCI distribution and Docker v2 endpoints, authentication schemes,
//! and the wire view of manifests.

mod auth;
mod client;
mod hosts;
mod manifest;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use auth::*;
pub use client::*;
pub use hosts::*;
pub use manifest::*;
pub use traits::*;
