//! # types
//!
//! `types` is the module containing the plain data model shared by the store and the sync manager

pub mod errors;
pub mod identifier;
pub mod message;
pub mod signal;
