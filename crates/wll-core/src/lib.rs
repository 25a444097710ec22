//! Core data types for the WeatherLink Live driver
//!
//! This crate holds the observation packet model shared by the HTTP and UDP
//! feeds, the flat output record handed to the host application, and the
//! observation key names used by the device API.

pub mod keys;
pub mod packet;
pub mod pipeline;
pub mod types;

pub use packet::*;
pub use pipeline::*;
pub use types::*;
