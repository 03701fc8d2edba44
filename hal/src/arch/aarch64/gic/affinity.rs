//! # IRQ Affinity Table
//!
//! Records which logical CPU each interrupt is routed to. The table is
//! process-wide and is the only record of routing that spans clusters: each
//! distributor only knows about its own cores.
//!
//! Readers (mask, unmask) load entries without locking, so a reader racing
//! a reroute may see the previous owner and take one extra remote hop.
//! Writers serialize on a dedicated lock, distinct from the register lock,
//! and publish the new owner only after the hardware has been rerouted.
//!
//! The lock is never held across a remote call, so two reroutes of the same
//! interrupt can overlap. [`AffinityTable::set_owner`] hands back the owner
//! it replaced; a writer that finds someone other than the owner it started
//! from knows it raced and cleans up that owner's cluster.

use super::MAX_IRQS;
use core::sync::atomic::{AtomicU32, Ordering};

/// Interrupt-to-CPU ownership table
pub struct AffinityTable {
    owners: [AtomicU32; MAX_IRQS as usize],
    lock: spin::Mutex<()>,
}

impl AffinityTable {
    /// Create a table with every interrupt owned by CPU 0
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const CPU0: AtomicU32 = AtomicU32::new(0);
        Self {
            owners: [CPU0; MAX_IRQS as usize],
            lock: spin::Mutex::new(()),
        }
    }

    /// Logical CPU that owns `hwirq`
    ///
    /// Out-of-range interrupts report CPU 0.
    #[inline]
    pub fn owner(&self, hwirq: u32) -> u32 {
        self.owners
            .get(hwirq as usize)
            .map_or(0, |owner| owner.load(Ordering::Acquire))
    }

    /// Record a new owner for `hwirq` and return the one it replaced
    ///
    /// Called once the hardware has been rerouted. Out-of-range interrupts
    /// are ignored and report CPU 0.
    pub fn set_owner(&self, hwirq: u32, cpu: u32) -> u32 {
        match self.owners.get(hwirq as usize) {
            Some(entry) => {
                let _guard = self.lock.lock();
                entry.swap(cpu, Ordering::AcqRel)
            }
            None => 0,
        }
    }
}

impl Default for AffinityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AffinityTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let remote = self
            .owners
            .iter()
            .filter(|owner| owner.load(Ordering::Relaxed) != 0)
            .count();
        f.debug_struct("AffinityTable")
            .field("routed_off_cpu0", &remote)
            .finish()
    }
}
