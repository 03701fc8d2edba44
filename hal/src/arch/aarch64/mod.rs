//! # AArch64 Architecture HAL Implementation
//!
//! Hardware abstraction for the Axxia AArch64 SoC family. The interesting
//! part is the interrupt controller: every cluster owns a private GICv2
//! distributor, and this layer stitches them into one logical controller.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Axxia - AArch64 HAL                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌─────────────┐ ┌──────────────────────────┐ ┌─────────────┐           │
//! │  │    Core     │ │           GIC            │ │     SMP     │           │
//! │  │             │ │                          │ │             │           │
//! │  │• Barriers   │ │• Distributor (GICD)      │ │• Topology   │           │
//! │  │             │ │• CPU interface (GICC)    │ │• Cross-call │           │
//! │  │             │ │• Affinity table          │ │• IRQ guard  │           │
//! │  │             │ │• Axxia multi-cluster chip│ │             │           │
//! │  └─────────────┘ └──────────────────────────┘ └─────────────┘           │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: Memory barriers
//! - [`gic`]: Generic Interrupt Controller
//!   - [`gic::distributor`]: GICD_* registers
//!   - [`gic::cpu_interface`]: GICC_* registers
//!   - [`gic::affinity`]: Process-wide IRQ owner table
//!   - [`gic::axxia`]: Multi-cluster controller, message lines, dispatch, PM
//! - [`smp`]: Symmetric Multi-Processing
//!   - [`smp::topology`]: Cluster topology
//!   - [`smp::xcall`]: Synchronous cross-CPU calls

// =============================================================================
// CORE FRAMEWORK
// =============================================================================

pub mod core;

// =============================================================================
// GENERIC INTERRUPT CONTROLLER
// =============================================================================

pub mod gic;

// =============================================================================
// SYMMETRIC MULTI-PROCESSING
// =============================================================================

pub mod smp;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use self::core::barriers::{dmb, dsb};

pub use gic::{axxia::AxxiaGic, cpu_interface::CpuInterface, distributor::Distributor};

pub use smp::{topology::ClusterTopology, xcall::XcallMailbox, SmpOperations};
