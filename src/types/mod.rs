//! Common types for the directory client.
//!
//! Fixed schemas at the upstream boundary: raw payloads are normalized into
//! these before reaching the sync and mutation layers.

pub mod customer;
pub mod rule;
pub mod sync;
pub mod tags;

pub use customer::*;
pub use rule::*;
pub use sync::*;
pub use tags::*;
