//! Shared protocol definitions for the `ChatZone` wire format.

pub mod frame;
