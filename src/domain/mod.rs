//! Domain types and the ports the settler talks through.

pub mod ports;
pub mod transaction;
pub mod twin;
