//! # Axxia Multi-Cluster GIC
//!
//! Axxia SoCs put one GICv2 distributor in every 4-core cluster, and a core
//! can only reach the distributor of its own cluster. [`AxxiaGic`] makes
//! those distributors look like one interrupt controller:
//!
//! - an [`AffinityTable`] records the logical owner of every interrupt;
//! - operations on an interrupt owned by another cluster are shipped there
//!   as a synchronous cross-call ([`CrossCall`]);
//! - trigger-type changes and cluster power transitions are broadcast to one
//!   representative core per cluster;
//! - inter-CPU messages are multiplexed onto 16 SPI message lines
//!   ([`ipi`]).
//!
//! ```text
//!  ┌──────────── Cluster 0 ───────────┐        ┌──────────── Cluster 1 ───────────┐
//!  │ CPU0  CPU1  CPU2  CPU3           │        │ CPU4  CPU5  CPU6  CPU7           │
//!  │   │                              │  xcall │   ▲                              │
//!  │   └─ mask(irq owned by CPU5) ────┼────────┼───┘ run_local(Mask)              │
//!  │                                  │        │        │                         │
//!  │ GICD (cluster 0 only)            │        │ GICD (cluster 1 only) ◀──┘       │
//!  └──────────────────────────────────┘        └──────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Two locks, never held across a cross-call: the register lock around the
//! distributor, and the [`AffinityTable`] writer lock. Every cross-call is
//! issued with local interrupts enabled through an [`IrqEnableGuard`].
//!
//! [`IrqEnableGuard`]: crate::arch::aarch64::smp::IrqEnableGuard

pub mod chip;
pub mod dispatch;
pub mod domain;
pub mod ipi;
pub mod pm;

#[cfg(test)]
pub(crate) mod testing;

pub use chip::CrossCall;
pub use dispatch::IrqSink;
pub use domain::{FlowHandler, IrqFlags, IrqMapping, LegacyDomain};
pub use ipi::{IpiMessage, IpiMux, MessageLine};
pub use pm::{CpuPmEvent, CpuPmListener, CpuSnapshot, DistSnapshot};

use super::{
    affinity::AffinityTable, cpu_interface::CpuInterface, distributor::Distributor,
    mmio::RegisterIo, regs_for, target_byte, GicError, Priority, TriggerMode,
    IRQS_PER_CONFIG_REG, IRQS_PER_ENABLE_REG, IRQS_PER_PRIORITY_REG, IRQS_PER_TARGET_REG,
    SPI_BASE,
};
use crate::arch::aarch64::smp::{
    ClusterTopology, SmpOperations, CORES_PER_CLUSTER, MAX_CLUSTERS, MAX_CPUS,
};
use ipi::{IPI_BASE_DEFAULT, IPI_COUNT};

// ============================================================================
// Configuration
// ============================================================================

/// Controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxxiaGicConfig {
    /// First hardware IRQ of the 16 message lines
    pub ipi_base: u32,
    /// First logical IRQ number of the domain, if fixed by the platform
    pub irq_start: Option<u32>,
    /// Priority programmed for every interrupt
    pub priority: Priority,
    /// CPU interface priority mask
    pub cpu_priority_mask: Priority,
}

impl Default for AxxiaGicConfig {
    fn default() -> Self {
        Self {
            ipi_base: IPI_BASE_DEFAULT,
            irq_start: None,
            priority: Priority::AXXIA_DEFAULT,
            cpu_priority_mask: Priority::AXXIA_MASK,
        }
    }
}

/// Register blocks the controller drives
///
/// `dist` and `cpu` are aliased: every core reaches its own cluster's
/// distributor and its own banked CPU interface at the same address.
#[derive(Debug)]
pub struct GicRegions<R: RegisterIo> {
    /// Distributor of the calling core's cluster
    pub dist: R,
    /// Banked CPU interface
    pub cpu: R,
    /// Message unmask registers
    pub ipi_mask: R,
    /// Message send registers
    pub ipi_send: R,
}

// ============================================================================
// Controller
// ============================================================================

/// Multi-cluster Axxia interrupt controller
pub struct AxxiaGic<R: RegisterIo, S: SmpOperations> {
    /// Register lock; also guards the banked distributor words
    dist: spin::Mutex<Distributor<R>>,
    cpu_if: CpuInterface<R>,
    ipi_mask: R,
    ipi_send: R,
    smp: S,
    topology: ClusterTopology,
    affinity: AffinityTable,
    mux: IpiMux,
    domain: LegacyDomain,
    config: AxxiaGicConfig,
    gic_irqs: u32,
    /// Distributor snapshots, one slot per cluster
    cluster_state: [spin::Mutex<Option<DistSnapshot>>; MAX_CLUSTERS],
    /// Banked snapshots, one slot per CPU
    cpu_state: [spin::Mutex<Option<CpuSnapshot>>; MAX_CPUS],
}

impl<R: RegisterIo, S: SmpOperations> AxxiaGic<R, S> {
    /// Bring up the controller on the boot core
    ///
    /// Captures the topology, unmasks the message lines for every CPU and
    /// initializes the boot cluster's distributor and the boot core's CPU
    /// interface. Other clusters call [`secondary_cluster_init`] and other
    /// cores [`secondary_init`] once they are running.
    ///
    /// [`secondary_cluster_init`]: Self::secondary_cluster_init
    /// [`secondary_init`]: Self::secondary_init
    pub fn init(regions: GicRegions<R>, smp: S, config: AxxiaGicConfig) -> Result<Self, GicError> {
        let topology = ClusterTopology::from_smp(&smp)?;
        let dist = Distributor::new(regions.dist);
        let gic_irqs = dist.num_interrupts();

        if config.ipi_base < SPI_BASE || config.ipi_base.saturating_add(IPI_COUNT) > gic_irqs {
            log::error!(
                "GIC: message lines {}..{} outside of {} interrupts",
                config.ipi_base,
                config.ipi_base.saturating_add(IPI_COUNT),
                gic_irqs
            );
            return Err(GicError::InvalidParameter);
        }

        let domain = LegacyDomain::new(gic_irqs, config.irq_start).map_err(|err| {
            log::error!(
                "GIC: irq_start {:?} leaves no room for {} interrupts",
                config.irq_start,
                gic_irqs
            );
            err
        })?;

        let gic = Self {
            dist: spin::Mutex::new(dist),
            cpu_if: CpuInterface::new(regions.cpu),
            ipi_mask: regions.ipi_mask,
            ipi_send: regions.ipi_send,
            smp,
            topology,
            affinity: AffinityTable::new(),
            mux: IpiMux::new(),
            domain,
            config,
            gic_irqs,
            cluster_state: core::array::from_fn(|_| spin::Mutex::new(None)),
            cpu_state: core::array::from_fn(|_| spin::Mutex::new(None)),
        };

        gic.unmask_message_lines();
        gic.dist_init();
        gic.cpu_init();

        log::info!(
            "GIC: {} interrupts, {} cpus in {} clusters, message lines at {}",
            gic_irqs,
            gic.topology.nr_cpus(),
            gic.topology.nr_clusters(),
            config.ipi_base
        );
        Ok(gic)
    }

    /// Bring up the CPU interface of a secondary core
    pub fn secondary_init(&self) {
        self.cpu_init();
        log::debug!("GIC: cpu{} interface up", self.smp.current_cpu_id());
    }

    /// Bring up the distributor and CPU interface of a secondary cluster
    ///
    /// Called on the first core of the cluster to come up.
    pub fn secondary_cluster_init(&self) {
        self.dist_init();
        self.cpu_init();
        log::info!("GIC: cluster {} up", self.current_cluster());
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of interrupt IDs implemented
    #[inline]
    pub fn gic_irqs(&self) -> u32 {
        self.gic_irqs
    }

    /// Controller configuration
    #[inline]
    pub fn config(&self) -> &AxxiaGicConfig {
        &self.config
    }

    /// Cluster layout
    #[inline]
    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Hardware-to-logical interrupt map
    #[inline]
    pub fn domain(&self) -> &LegacyDomain {
        &self.domain
    }

    /// Platform SMP services
    #[inline]
    pub fn smp(&self) -> &S {
        &self.smp
    }

    /// Logical CPU `hwirq` is routed to
    #[inline]
    pub fn affinity_of(&self, hwirq: u32) -> u32 {
        self.affinity.owner(hwirq)
    }

    /// Cluster of the calling core
    #[inline]
    fn current_cluster(&self) -> u32 {
        self.topology.cluster_of(self.smp.current_cpu_id())
    }

    /// First online core of `cluster`
    #[inline]
    fn representative(&self, cluster: u32) -> Option<u32> {
        self.topology
            .representative(cluster, |cpu| self.smp.cpu_online(cpu))
    }

    // ========================================================================
    // Bring-up
    // ========================================================================

    /// Program the calling core's distributor
    fn dist_init(&self) {
        let phys = self.topology.phys_id(self.smp.current_cpu_id());
        let priority = self.config.priority.replicated();
        let shared = SPI_BASE..self.gic_irqs;
        let dist = self.dist.lock();

        dist.disable();

        for index in word_range(&shared, IRQS_PER_CONFIG_REG) {
            dist.write_config_word(index, 0);
        }

        // Only the very first core routes everything to itself.
        if phys == 0 {
            let cpumask = target_byte(phys) as u32 * 0x0101_0101;
            for index in word_range(&shared, IRQS_PER_TARGET_REG) {
                dist.write_target_word(index, cpumask);
            }
        }

        for index in word_range(&shared, IRQS_PER_PRIORITY_REG) {
            dist.write_priority_word(index, priority);
        }

        for index in word_range(&shared, IRQS_PER_ENABLE_REG) {
            dist.write_disable_word(index, u32::MAX);
        }

        let base = self.config.ipi_base;
        for hwirq in base..base + IPI_COUNT {
            let core = (hwirq - base) % CORES_PER_CLUSTER;
            dist.write_target_byte(hwirq, target_byte(core));
        }
        for hwirq in base..base + IPI_COUNT {
            dist.set_trigger_mode(hwirq, TriggerMode::Edge);
        }
        for hwirq in base..base + IPI_COUNT {
            dist.enable_interrupt(hwirq);
        }

        dist.enable();
    }

    /// Program the calling core's banked registers and CPU interface
    fn cpu_init(&self) {
        let priority = self.config.priority.replicated();
        {
            let dist = self.dist.lock();
            dist.write_disable_word(0, u32::MAX);
            for index in 0..regs_for(SPI_BASE, IRQS_PER_PRIORITY_REG) {
                dist.write_priority_word(index, priority);
            }
        }

        self.cpu_if.set_priority_mask(self.config.cpu_priority_mask);
        self.cpu_if.enable();
    }
}

impl<R: RegisterIo, S: SmpOperations> core::fmt::Debug for AxxiaGic<R, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AxxiaGic")
            .field("gic_irqs", &self.gic_irqs)
            .field("topology", &self.topology)
            .field("domain", &self.domain)
            .field("config", &self.config)
            .field("affinity", &self.affinity)
            .field("mux", &self.mux)
            .finish_non_exhaustive()
    }
}

/// Register words of a bank covering the interrupts in `irqs`
#[inline]
fn word_range(irqs: &core::ops::Range<u32>, per_reg: u32) -> core::ops::Range<usize> {
    (irqs.start / per_reg) as usize..regs_for(irqs.end, per_reg)
}
