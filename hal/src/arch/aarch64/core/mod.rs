//! # AArch64 Core Framework
//!
//! Fundamental CPU primitives used by the interrupt layer:
//! - Memory barriers

pub mod barriers;

pub use barriers::{dmb, dsb};
