//! # AArch64 Symmetric Multi-Processing (SMP) Framework
//!
//! SMP primitives the multi-cluster interrupt layer is built on: the cluster
//! topology, the synchronous cross-CPU call, and a scoped guard for the
//! "enable interrupts around a remote call" rule.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        Axxia SMP Topology                                │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │   Cluster 0            Cluster 1            Cluster 2     Cluster 3      │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────┐   ┌──────────┐     │
//! │  │ CPU0 .. CPU3 │    │ CPU4 .. CPU7 │    │ CPU8..11 │   │ CPU12..15│     │
//! │  │ GICD + GICC  │    │ GICD + GICC  │    │ GICD+GICC│   │ GICD+GICC│     │
//! │  └──────────────┘    └──────────────┘    └──────────┘   └──────────┘     │
//! │         ▲                    ▲                                           │
//! │         └──── cross-call ────┘  (no bus path between distributors)       │
//! │                                                                          │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The platform supplies an [`SmpOperations`] implementation. Its
//! `call_function_single` must block until the target CPU ran the function,
//! and must be called with local interrupts enabled; [`IrqEnableGuard`]
//! provides that bracket.

pub mod topology;
pub mod xcall;

pub use topology::*;
pub use xcall::*;

use static_assertions::const_assert_eq;

// ============================================================================
// SMP Constants
// ============================================================================

/// Number of cores in one cluster
pub const CORES_PER_CLUSTER: u32 = 4;

/// Maximum number of clusters
pub const MAX_CLUSTERS: usize = 4;

/// Maximum number of supported CPUs
pub const MAX_CPUS: usize = 16;

const_assert_eq!(MAX_CPUS, MAX_CLUSTERS * CORES_PER_CLUSTER as usize);

// ============================================================================
// CPU Mask
// ============================================================================

/// Set of logical CPUs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuMask(pub u32);

impl CpuMask {
    /// Mask with a single CPU
    #[inline]
    pub const fn cpu(n: u32) -> Self {
        CpuMask(1 << (n & 31))
    }

    /// Mask with CPUs `0..n`
    #[inline]
    pub const fn first(n: u32) -> Self {
        if n >= 32 {
            CpuMask(u32::MAX)
        } else {
            CpuMask((1 << n) - 1)
        }
    }

    /// Add a CPU to the mask
    #[inline]
    pub const fn with_cpu(self, n: u32) -> Self {
        CpuMask(self.0 | (1 << (n & 31)))
    }

    /// Check if a CPU is in the mask
    #[inline]
    pub const fn contains(self, n: u32) -> bool {
        n < 32 && (self.0 & (1 << n)) != 0
    }

    /// Iterate over the CPUs in the mask, lowest first
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..32).filter(move |&n| self.contains(n))
    }

    /// Raw bitmap
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

// ============================================================================
// SMP Operations Trait
// ============================================================================

/// Platform SMP services consumed by the interrupt layer
pub trait SmpOperations: Sync {
    /// Logical ID of the calling CPU
    fn current_cpu_id(&self) -> u32;

    /// Physical CPU ID (cluster * 4 + core) of a logical CPU
    fn cpu_logical_map(&self, cpu: u32) -> u32;

    /// Check whether a logical CPU is online
    fn cpu_online(&self, cpu: u32) -> bool;

    /// Number of possible logical CPU IDs
    fn nr_cpu_ids(&self) -> u32;

    /// Run `func(arg)` on `cpu` and return once it has completed there.
    ///
    /// Must be called with local interrupts enabled: the target may need to
    /// take an interrupt from the caller to make progress. On `Err` the
    /// function has not run and `arg` is no longer referenced.
    fn call_function_single<T: Sync>(
        &self,
        cpu: u32,
        func: fn(&T),
        arg: &T,
    ) -> Result<(), SmpError>;

    /// Enable interrupt delivery on the calling CPU
    fn local_irq_enable(&self);

    /// Disable interrupt delivery on the calling CPU
    fn local_irq_disable(&self);

    /// Check whether interrupt delivery is disabled on the calling CPU
    fn irqs_disabled(&self) -> bool;
}

/// SMP operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpError {
    /// Invalid CPU ID
    InvalidCpu,
    /// CPU is offline
    CpuOffline,
    /// Target could not be signalled
    Busy,
}

impl core::fmt::Display for SmpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SmpError::InvalidCpu => f.write_str("invalid cpu"),
            SmpError::CpuOffline => f.write_str("cpu offline"),
            SmpError::Busy => f.write_str("cpu could not be signalled"),
        }
    }
}

// ============================================================================
// Interrupt Enable Guard
// ============================================================================

/// Re-enables local interrupts for its lifetime.
///
/// If interrupts were disabled when the guard was created they are disabled
/// again on drop, including on early return. If they were already enabled
/// the guard does nothing.
pub struct IrqEnableGuard<'a, S: SmpOperations> {
    smp: &'a S,
    was_disabled: bool,
}

impl<'a, S: SmpOperations> IrqEnableGuard<'a, S> {
    /// Enable local interrupts, remembering the previous state
    pub fn new(smp: &'a S) -> Self {
        let was_disabled = smp.irqs_disabled();
        if was_disabled {
            smp.local_irq_enable();
        }
        Self { smp, was_disabled }
    }
}

impl<S: SmpOperations> Drop for IrqEnableGuard<'_, S> {
    fn drop(&mut self) {
        if self.was_disabled {
            self.smp.local_irq_disable();
        }
    }
}

impl<S: SmpOperations> core::fmt::Debug for IrqEnableGuard<'_, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IrqEnableGuard")
            .field("was_disabled", &self.was_disabled)
            .finish()
    }
}
