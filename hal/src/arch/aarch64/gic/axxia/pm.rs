//! # Power Transitions
//!
//! Distributor and banked register state is lost when a cluster or core
//! powers down. The controller listens for power notifications, saves the
//! registers it owns on entry and writes them back on exit.
//!
//! Cluster-scope events are logically global: they are forwarded to one
//! core in every other online cluster before being applied on the calling
//! core.

use super::{word_range, AxxiaGic, CrossCall};
use crate::arch::aarch64::gic::{
    mmio::RegisterIo, regs_for, IRQS_PER_CONFIG_REG, IRQS_PER_ENABLE_REG,
    IRQS_PER_PRIORITY_REG, IRQS_PER_TARGET_REG, MAX_IRQS, SPI_BASE,
};
use crate::arch::aarch64::smp::SmpOperations;

const CONF_WORDS: usize = regs_for(MAX_IRQS, IRQS_PER_CONFIG_REG);
const TARGET_WORDS: usize = regs_for(MAX_IRQS, IRQS_PER_TARGET_REG);
const ENABLE_WORDS: usize = regs_for(MAX_IRQS, IRQS_PER_ENABLE_REG);

/// Banked words holding interrupts 0..31
const PRIVATE_CONF_WORDS: usize = regs_for(SPI_BASE, IRQS_PER_CONFIG_REG);

/// Power transition reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuPmEvent {
    /// Calling core is about to power down
    CpuEnter,
    /// Calling core aborted its power down
    CpuEnterFailed,
    /// Calling core is back up
    CpuExit,
    /// Cluster is about to power down
    ClusterEnter,
    /// Cluster aborted its power down
    ClusterEnterFailed,
    /// Cluster is back up
    ClusterExit,
}

impl CpuPmEvent {
    /// Check whether the event concerns a whole cluster
    #[inline]
    pub const fn is_cluster(self) -> bool {
        matches!(
            self,
            Self::ClusterEnter | Self::ClusterEnterFailed | Self::ClusterExit
        )
    }
}

/// Receiver of platform power notifications
pub trait CpuPmListener {
    /// Handle a power transition of the calling core or its cluster
    fn notify(&self, event: CpuPmEvent);
}

/// Saved shared-interrupt state of one distributor
#[derive(Clone, PartialEq, Eq)]
pub struct DistSnapshot {
    conf: [u32; CONF_WORDS],
    target: [u32; TARGET_WORDS],
    enable: [u32; ENABLE_WORDS],
}

impl core::fmt::Debug for DistSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistSnapshot")
            .field("enabled", &self.enable.iter().map(|w| w.count_ones()).sum::<u32>())
            .finish_non_exhaustive()
    }
}

/// Saved banked state of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSnapshot {
    enable: u32,
    conf: [u32; PRIVATE_CONF_WORDS],
}

impl<R: RegisterIo, S: SmpOperations> AxxiaGic<R, S> {
    /// Apply a power transition to the calling core's registers
    pub(super) fn apply_pm_event(&self, event: CpuPmEvent) {
        match event {
            CpuPmEvent::CpuEnter => self.cpu_save(),
            CpuPmEvent::CpuEnterFailed | CpuPmEvent::CpuExit => self.cpu_restore(),
            CpuPmEvent::ClusterEnter => self.dist_save(),
            CpuPmEvent::ClusterEnterFailed | CpuPmEvent::ClusterExit => self.dist_restore(),
        }
    }

    fn dist_save(&self) {
        let shared = SPI_BASE..self.gic_irqs;
        let mut snap = DistSnapshot {
            conf: [0; CONF_WORDS],
            target: [0; TARGET_WORDS],
            enable: [0; ENABLE_WORDS],
        };

        {
            let dist = self.dist.lock();
            for index in word_range(&shared, IRQS_PER_CONFIG_REG) {
                snap.conf[index] = dist.read_config_word(index);
            }
            for index in word_range(&shared, IRQS_PER_TARGET_REG) {
                snap.target[index] = dist.read_target_word(index);
            }
            for index in word_range(&shared, IRQS_PER_ENABLE_REG) {
                snap.enable[index] = dist.read_enable_word(index);
            }
        }

        let cluster = self.current_cluster();
        log::debug!("GIC: cluster {} distributor saved", cluster);
        *self.cluster_state[cluster as usize].lock() = Some(snap);
    }

    fn dist_restore(&self) {
        let cluster = self.current_cluster();
        let Some(snap) = self.cluster_state[cluster as usize].lock().take() else {
            log::warn!("GIC: no saved distributor state for cluster {}", cluster);
            return;
        };

        let shared = SPI_BASE..self.gic_irqs;
        let priority = self.config.priority.replicated();
        let dist = self.dist.lock();

        dist.disable();

        for index in word_range(&shared, IRQS_PER_CONFIG_REG) {
            dist.write_config_word(index, snap.conf[index]);
        }
        for index in word_range(&shared, IRQS_PER_PRIORITY_REG) {
            dist.write_priority_word(index, priority);
        }
        for index in word_range(&shared, IRQS_PER_TARGET_REG) {
            dist.write_target_word(index, snap.target[index]);
        }
        for index in word_range(&shared, IRQS_PER_ENABLE_REG) {
            dist.write_enable_word(index, snap.enable[index]);
        }

        dist.enable();
        log::debug!("GIC: cluster {} distributor restored", cluster);
    }

    fn cpu_save(&self) {
        let mut snap = CpuSnapshot::default();
        {
            let dist = self.dist.lock();
            snap.enable = dist.read_enable_word(0);
            for (index, word) in snap.conf.iter_mut().enumerate() {
                *word = dist.read_config_word(index);
            }
        }

        let cpu = self.smp.current_cpu_id();
        if let Some(slot) = self.cpu_state.get(cpu as usize) {
            *slot.lock() = Some(snap);
        }
    }

    fn cpu_restore(&self) {
        let cpu = self.smp.current_cpu_id();
        let Some(snap) = self.cpu_state.get(cpu as usize).and_then(|slot| slot.lock().take())
        else {
            log::warn!("GIC: no saved banked state for cpu{}", cpu);
            return;
        };

        let priority = self.config.priority.replicated();
        {
            let dist = self.dist.lock();
            dist.write_enable_word(0, snap.enable);
            for (index, &word) in snap.conf.iter().enumerate() {
                dist.write_config_word(index, word);
            }
            for index in 0..regs_for(SPI_BASE, IRQS_PER_PRIORITY_REG) {
                dist.write_priority_word(index, priority);
            }
        }

        self.cpu_if.set_priority_mask(self.config.cpu_priority_mask);
        self.cpu_if.enable();
    }
}

impl<R: RegisterIo, S: SmpOperations> CpuPmListener for AxxiaGic<R, S> {
    fn notify(&self, event: CpuPmEvent) {
        if !event.is_cluster() {
            self.apply_pm_event(event);
            return;
        }

        log::debug!(
            "GIC: {:?} on cpu{}, forwarding to other clusters",
            event,
            self.smp.current_cpu_id()
        );
        if let Err(err) = self.broadcast(CrossCall::Power(event)) {
            log::error!("GIC: {:?} failed: {}", event, err);
        }
    }
}
