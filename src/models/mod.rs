//! # Resource Schemas
//!
//! Each module declares one collection: its document shape, the rules a
//! write must pass, and the field types the store casts query values to.

pub mod tour;
