//! aie-kernel-tests library
//!
//! AIE compute-tile kernels, an emulated XRT-style runtime to launch them on,
//! and the host test harness that drives and verifies them.

pub mod config;
pub mod harness;
pub mod kernels;
pub mod runtime;
