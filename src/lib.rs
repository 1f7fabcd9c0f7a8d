//! Traffic-Light Control Library
//!
//! Traffic lights that cycle on their own, accept overrides from an external
//! controller through the filesystem, and publish their live state back to it.

pub mod control;
pub mod simulation;
