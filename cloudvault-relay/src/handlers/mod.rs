//! HTTP handlers, one module per route group.

pub mod backup;
pub mod devices;
pub mod objects;
pub mod pairing;
pub mod sync;
