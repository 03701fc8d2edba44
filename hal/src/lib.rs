//! # Axxia Hardware Abstraction Layer
//!
//! Interrupt-controller support for Axxia SoCs, where up to four CPU
//! clusters each carry their own GIC and the rest of the kernel expects a
//! single interrupt controller.
//!
//! The crate is `no_std`. Unit tests run on the build host against a
//! simulated SoC, so nothing below is gated on the target architecture except
//! the barrier instructions themselves.

#![cfg_attr(not(test), no_std)]

pub mod arch;

pub use arch::aarch64::gic::axxia::{AxxiaGic, AxxiaGicConfig, GicRegions};
pub use arch::aarch64::gic::{GicError, IrqChip, IrqType};
pub use arch::aarch64::smp::{CpuMask, SmpError, SmpOperations};
