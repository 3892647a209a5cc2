//! dimc-probe library
//!
//! Conformance-probing harness for the DIMC compute-in-memory instruction
//! family on a multi-core vector cluster.

pub mod accel;
pub mod cluster;
pub mod config;
pub mod dma;
pub mod encoding;
pub mod harness;
pub mod memory;
pub mod vector;
