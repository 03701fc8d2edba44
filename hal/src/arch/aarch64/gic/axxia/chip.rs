//! # Controller Operations
//!
//! [`IrqChip`] for the multi-cluster controller. Every register change is a
//! [`CrossCall`]: it runs directly when the affected distributor belongs to
//! the calling core's cluster, and is shipped to a core of the right cluster
//! otherwise.
//!
//! | Operation    | 0-15     | 16-31        | Message lines | Shared                |
//! |--------------|----------|--------------|---------------|-----------------------|
//! | mask/unmask  | local    | local        | no-op         | owner's cluster       |
//! | set_type     | rejected | all clusters | rejected      | all clusters          |
//! | set_affinity | rejected | rejected     | no-op         | new, then old cluster |
//! | eoi          | local    | local        | local         | local                 |

use super::{pm::CpuPmEvent, AxxiaGic};
use crate::arch::aarch64::gic::{
    byte_reg_offset, is_banked, mmio::RegisterIo, GicError, IrqChip, IrqType, TriggerMode,
    MAX_IRQS, PPI_BASE, SPI_BASE,
};
use crate::arch::aarch64::smp::{CpuMask, IrqEnableGuard, SmpOperations};

/// Register change to apply on one cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossCall {
    /// Clear the enable bit of an interrupt
    Mask(u32),
    /// Set the enable bit of an interrupt
    Unmask(u32),
    /// Rewrite the trigger configuration of an interrupt
    SetType(u32, TriggerMode),
    /// Point an interrupt at `cpu` and enable it, or drop it from this
    /// cluster and disable it
    Route {
        /// Hardware interrupt
        hwirq: u32,
        /// New logical owner
        cpu: u32,
        /// Remove from this cluster instead of routing to `cpu`
        disable: bool,
    },
    /// Apply a power transition to this cluster
    Power(CpuPmEvent),
}

/// Argument block of a cross-call, owned by the caller until completion
struct XcallArgs<'a, R: RegisterIo, S: SmpOperations> {
    gic: &'a AxxiaGic<R, S>,
    call: CrossCall,
    status: spin::Mutex<Result<(), GicError>>,
}

/// Entry point run on the target core
fn xcall_entry<R: RegisterIo, S: SmpOperations>(args: &XcallArgs<'_, R, S>) {
    let status = args.gic.run_local(&args.call);
    *args.status.lock() = status;
}

impl<R: RegisterIo, S: SmpOperations> AxxiaGic<R, S> {
    /// Apply `call` to the calling core's distributor
    pub(super) fn run_local(&self, call: &CrossCall) -> Result<(), GicError> {
        match *call {
            CrossCall::Mask(hwirq) => {
                self.dist.lock().disable_interrupt(hwirq);
            }
            CrossCall::Unmask(hwirq) => {
                self.dist.lock().enable_interrupt(hwirq);
            }
            CrossCall::SetType(hwirq, mode) => {
                let dist = self.dist.lock();
                let (index, config) = dist.config_with_mode(hwirq, mode);

                // Reconfiguring an enabled interrupt is unpredictable.
                let enabled = dist.is_enabled(hwirq);
                if enabled {
                    dist.disable_interrupt(hwirq);
                }
                dist.write_config_word(index, config);
                if enabled {
                    dist.enable_interrupt(hwirq);
                }
            }
            CrossCall::Route {
                hwirq,
                cpu,
                disable,
            } => {
                let (index, shift) = byte_reg_offset(hwirq);
                let bit = 1 << (self.topology.core_in_cluster(cpu) + shift);
                let dist = self.dist.lock();
                let value = dist.read_target_word(index) & !(0xFF << shift);

                if disable {
                    dist.write_target_word(index, value);
                    dist.disable_interrupt(hwirq);
                } else {
                    dist.write_target_word(index, value | bit);
                    dist.enable_interrupt(hwirq);
                }
            }
            CrossCall::Power(event) => self.apply_pm_event(event),
        }
        Ok(())
    }

    /// Run `call` on `cpu` and wait for it
    ///
    /// Local interrupts are enabled for the duration of the call. Offline
    /// targets are skipped. Returns the status reported by the target.
    pub(super) fn cross_call(&self, cpu: u32, call: CrossCall) -> Result<(), GicError> {
        if !self.smp.cpu_online(cpu) {
            log::warn!("GIC: cpu{} offline, skipping {:?}", cpu, call);
            return Ok(());
        }

        log::debug!(
            "GIC: cpu{} -> cpu{}: {:?}",
            self.smp.current_cpu_id(),
            cpu,
            call
        );

        let args = XcallArgs {
            gic: self,
            call,
            status: spin::Mutex::new(Ok(())),
        };

        let sent = {
            let _irqs = IrqEnableGuard::new(&self.smp);
            self.smp
                .call_function_single(cpu, xcall_entry::<R, S>, &args)
        };

        if let Err(err) = sent {
            log::warn!("GIC: cross-call to cpu{} failed: {}", cpu, err);
            return Ok(());
        }

        let status = *args.status.lock();
        status
    }

    /// Apply `call` on the cluster of logical `cpu`
    ///
    /// Runs directly when that is the caller's cluster. Otherwise the call
    /// goes to `cpu` itself, or to the first online core of its cluster when
    /// `cpu` is offline.
    fn run_on_cluster_of(&self, cpu: u32, call: CrossCall) -> Result<(), GicError> {
        let cluster = self.topology.cluster_of(cpu);
        if cluster == self.current_cluster() {
            return self.run_local(&call);
        }

        let target = if self.smp.cpu_online(cpu) {
            Some(cpu)
        } else {
            self.representative(cluster)
        };

        match target {
            Some(target) => self.cross_call(target, call),
            None => {
                log::warn!("GIC: no online cpu in cluster {}, skipping {:?}", cluster, call);
                Ok(())
            }
        }
    }

    /// Run `call` on one core of every other cluster, then locally
    ///
    /// Remote failures are logged and do not stop the broadcast.
    pub(super) fn broadcast(&self, call: CrossCall) -> Result<(), GicError> {
        let here = self.current_cluster();

        for cluster in self.topology.other_clusters(here) {
            let Some(cpu) = self.representative(cluster) else {
                log::debug!("GIC: cluster {} offline, skipping {:?}", cluster, call);
                continue;
            };

            if let Err(err) = self.cross_call(cpu, call) {
                log::error!("GIC: {:?} failed for cpu{}: {}", call, cpu, err);
            }
        }

        self.run_local(&call)
    }

    fn set_enable(&self, hwirq: u32, enable: bool) -> Result<(), GicError> {
        if hwirq >= MAX_IRQS || self.is_message_line(hwirq) {
            return Ok(());
        }

        let call = if enable {
            CrossCall::Unmask(hwirq)
        } else {
            CrossCall::Mask(hwirq)
        };

        // Banked: only this core's copy exists.
        if is_banked(hwirq) {
            return self.run_local(&call);
        }

        self.run_on_cluster_of(self.affinity.owner(hwirq), call)
    }

    /// Publish `cpu` as the owner of `hwirq` after rerouting it away from `old`
    ///
    /// If another reroute committed in between, its target cluster may still
    /// have the interrupt enabled, or it may have overwritten our target byte
    /// in a shared cluster. Either is repaired here, outside the table lock.
    pub(super) fn commit_owner(&self, hwirq: u32, old: u32, cpu: u32) -> Result<(), GicError> {
        let prev = self.affinity.set_owner(hwirq, cpu);
        if prev == old || prev == cpu {
            return Ok(());
        }

        log::debug!("GIC: hwirq {} rerouted concurrently to cpu{}", hwirq, prev);

        let disable = !self.topology.same_cluster(prev, cpu);
        let target = if disable { prev } else { cpu };
        self.run_on_cluster_of(
            target,
            CrossCall::Route {
                hwirq,
                cpu,
                disable,
            },
        )
    }

    /// Route `hwirq` to the first online CPU of `mask`
    pub fn set_affinity_mask(&self, hwirq: u32, mask: CpuMask) -> Result<(), GicError> {
        let cpu = mask
            .iter()
            .find(|&cpu| cpu < self.topology.nr_cpus() && self.smp.cpu_online(cpu))
            .ok_or(GicError::InvalidParameter)?;
        self.set_affinity(hwirq, cpu)
    }
}

impl<R: RegisterIo, S: SmpOperations> IrqChip for AxxiaGic<R, S> {
    const NAME: &'static str = "GIC";

    fn mask(&self, hwirq: u32) -> Result<(), GicError> {
        self.set_enable(hwirq, false)
    }

    fn unmask(&self, hwirq: u32) -> Result<(), GicError> {
        self.set_enable(hwirq, true)
    }

    /// Always runs on the core handling the interrupt.
    fn eoi(&self, hwirq: u32) -> Result<(), GicError> {
        self.cpu_if.end_of_interrupt(hwirq);
        Ok(())
    }

    fn set_type(&self, hwirq: u32, ty: IrqType) -> Result<(), GicError> {
        // SGIs and message lines have a fixed configuration.
        if hwirq < PPI_BASE || hwirq >= MAX_IRQS || self.is_message_line(hwirq) {
            return Err(GicError::InvalidParameter);
        }

        let mode = TriggerMode::try_from(ty)?;
        self.broadcast(CrossCall::SetType(hwirq, mode))
    }

    fn set_affinity(&self, hwirq: u32, cpu: u32) -> Result<(), GicError> {
        if cpu >= self.topology.nr_cpus() || !self.smp.cpu_online(cpu) {
            return Err(GicError::InvalidParameter);
        }
        if hwirq >= MAX_IRQS {
            return Err(GicError::InvalidParameter);
        }
        if self.is_message_line(hwirq) {
            return Ok(());
        }
        if hwirq < SPI_BASE {
            return Err(GicError::InvalidParameter);
        }

        let old = self.affinity.owner(hwirq);
        if old == cpu {
            return Ok(());
        }

        self.run_on_cluster_of(
            cpu,
            CrossCall::Route {
                hwirq,
                cpu,
                disable: false,
            },
        )?;

        // Never leave the interrupt deliverable in two clusters.
        if !self.topology.same_cluster(old, cpu) {
            self.run_on_cluster_of(
                old,
                CrossCall::Route {
                    hwirq,
                    cpu,
                    disable: true,
                },
            )?;
        }

        self.commit_owner(hwirq, old, cpu)
    }

    fn retrigger(&self, _hwirq: u32) -> Result<(), GicError> {
        Err(GicError::NotSupported)
    }

    fn set_wake(&self, _hwirq: u32, _on: bool) -> Result<(), GicError> {
        Err(GicError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::gic::axxia::testing::{boot, Region, SimGic};
    use crate::arch::aarch64::gic::distributor::{
        GICD_ICENABLER, GICD_ICFGR, GICD_ISENABLER, GICD_ITARGETSR,
    };
    use crate::arch::aarch64::gic::cpu_interface::GICC_EOIR;

    const EIGHT: [u32; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
    const TWELVE: [u32; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    #[test]
    fn test_private_irqs_never_leave_the_core() {
        let (gic, soc) = boot(&EIGHT);
        soc.forbid_xcalls(true);
        soc.set_current(6);

        for hwirq in 16..32 {
            gic.mask(hwirq).unwrap();
            gic.unmask(hwirq).unwrap();
            assert!(soc.banked_word(6, GICD_ISENABLER) & (1 << hwirq) != 0);
        }

        assert!(soc.xcalls().is_empty());
        assert!(soc.writes_to(Region::Dist).iter().all(|w| w.cluster == 1));
    }

    #[test]
    fn test_message_lines_are_fixed() {
        let (gic, soc) = boot(&EIGHT);
        soc.forbid_xcalls(true);
        let base = gic.config().ipi_base;

        for hwirq in base..base + 16 {
            assert_eq!(gic.mask(hwirq), Ok(()));
            assert_eq!(gic.unmask(hwirq), Ok(()));
            assert_eq!(gic.set_affinity(hwirq, 5), Ok(()));
            assert_eq!(
                gic.set_type(hwirq, IrqType::EDGE_RISING),
                Err(GicError::InvalidParameter)
            );
            assert_eq!(gic.affinity_of(hwirq), 0);
        }

        assert!(soc.writes().is_empty());
    }

    #[test]
    fn test_out_of_range_irqs() {
        let (gic, soc) = boot(&EIGHT);

        assert_eq!(gic.mask(1020), Ok(()));
        assert_eq!(gic.unmask(5000), Ok(()));
        assert_eq!(gic.set_affinity(1020, 1), Err(GicError::InvalidParameter));
        assert_eq!(gic.set_affinity(40, 8), Err(GicError::InvalidParameter));
        assert_eq!(gic.set_affinity(20, 1), Err(GicError::InvalidParameter));
        assert_eq!(
            gic.set_type(1020, IrqType::LEVEL_HIGH),
            Err(GicError::InvalidParameter)
        );
        assert!(soc.writes().is_empty());
    }

    #[test]
    fn test_mask_local_owner() {
        let (gic, soc) = boot(&EIGHT);
        soc.forbid_xcalls(true);
        soc.set_current(2);

        gic.unmask(40).unwrap();
        assert_eq!(soc.dist_word(0, GICD_ISENABLER + 4) & (1 << 8), 1 << 8);

        gic.mask(40).unwrap();
        assert_eq!(soc.dist_word(0, GICD_ISENABLER + 4) & (1 << 8), 0);

        let writes = soc.writes_to(Region::Dist);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].offset, GICD_ICENABLER + 4);
    }

    #[test]
    fn test_mask_remote_owner_brackets_interrupts() {
        let (gic, soc) = boot(&EIGHT);
        gic.set_affinity(40, 5).unwrap();
        soc.clear_logs();

        // Called with interrupts off; the fake remote call asserts they
        // were turned back on.
        assert!(soc.irqs_disabled());
        gic.mask(40).unwrap();
        assert!(soc.irqs_disabled());

        let xcalls = soc.xcalls();
        assert_eq!(xcalls.len(), 1);
        assert_eq!((xcalls[0].from, xcalls[0].to), (0, 5));

        let writes = soc.writes_to(Region::Dist);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].cluster, 1);
        assert_eq!(writes[0].offset, GICD_ICENABLER + 4);
        assert_eq!(writes[0].value, 1 << 8);
    }

    #[test]
    fn test_mask_remote_owner_offline_uses_cluster_representative() {
        let (gic, soc) = boot(&EIGHT);
        gic.set_affinity(40, 5).unwrap();
        soc.set_online(5, false);
        soc.clear_logs();

        gic.unmask(40).unwrap();

        let xcalls = soc.xcalls();
        assert_eq!(xcalls.len(), 1);
        assert_eq!(xcalls[0].to, 4);
        assert_ne!(soc.dist_word(1, GICD_ISENABLER + 4) & (1 << 8), 0);
    }

    #[test]
    fn test_set_affinity_same_cluster() {
        let (gic, soc) = boot(&EIGHT);
        soc.forbid_xcalls(true);

        gic.set_affinity(45, 3).unwrap();

        assert_eq!(gic.affinity_of(45), 3);
        assert_eq!((soc.dist_word(0, GICD_ITARGETSR + 44) >> 8) & 0xFF, 1 << 3);
        assert_ne!(soc.dist_word(0, GICD_ISENABLER + 4) & (1 << 13), 0);
    }

    #[test]
    fn test_set_affinity_idempotent() {
        let (gic, soc) = boot(&EIGHT);
        gic.set_affinity(45, 6).unwrap();
        soc.clear_logs();

        gic.set_affinity(45, 6).unwrap();

        assert!(soc.writes().is_empty());
        assert!(soc.xcalls().is_empty());
    }

    #[test]
    fn test_set_affinity_across_clusters() {
        let (gic, soc) = boot(&TWELVE);
        gic.set_affinity(45, 5).unwrap();
        soc.clear_logs();

        gic.set_affinity(45, 9).unwrap();

        let enables: Vec<_> = soc
            .writes_to(Region::Dist)
            .into_iter()
            .filter(|w| w.offset == GICD_ISENABLER + 4)
            .collect();
        let disables: Vec<_> = soc
            .writes_to(Region::Dist)
            .into_iter()
            .filter(|w| w.offset == GICD_ICENABLER + 4)
            .collect();

        assert_eq!(enables.len(), 1);
        assert_eq!(enables[0].cluster, 2);
        assert_eq!(disables.len(), 1);
        assert_eq!(disables[0].cluster, 1);

        assert_eq!(gic.affinity_of(45), 9);
        assert_eq!((soc.dist_word(2, GICD_ITARGETSR + 44) >> 8) & 0xFF, 1 << 1);
        assert_eq!((soc.dist_word(1, GICD_ITARGETSR + 44) >> 8) & 0xFF, 0);
        assert_eq!(soc.dist_word(1, GICD_ISENABLER + 4) & (1 << 13), 0);

        let targets: Vec<u32> = soc.xcalls().iter().map(|x| x.to).collect();
        assert_eq!(targets, vec![9, 5]);
    }

    #[test]
    fn test_overlapping_reroute_leaves_one_cluster_enabled() {
        let (gic, soc) = boot(&TWELVE);
        gic.set_affinity(45, 5).unwrap();

        // A second writer that started from owner 0 routes to cpu9 and
        // commits after the first one already published cpu5.
        gic.run_on_cluster_of(
            9,
            CrossCall::Route {
                hwirq: 45,
                cpu: 9,
                disable: false,
            },
        )
        .unwrap();
        soc.clear_logs();
        gic.commit_owner(45, 0, 9).unwrap();

        assert_eq!(gic.affinity_of(45), 9);
        assert_eq!(soc.dist_word(1, GICD_ISENABLER + 4) & (1 << 13), 0);
        assert_eq!((soc.dist_word(1, GICD_ITARGETSR + 44) >> 8) & 0xFF, 0);
        assert_ne!(soc.dist_word(2, GICD_ISENABLER + 4) & (1 << 13), 0);
        assert_eq!((soc.dist_word(2, GICD_ITARGETSR + 44) >> 8) & 0xFF, 1 << 1);

        let targets: Vec<u32> = soc.xcalls().iter().map(|x| x.to).collect();
        assert_eq!(targets, vec![5]);
    }

    #[test]
    fn test_overlapping_reroute_within_cluster_restores_target() {
        let (gic, soc) = boot(&TWELVE);

        // The slower writer routes to cpu6, then a faster one routes to
        // cpu5 and commits first, overwriting the target byte.
        gic.run_on_cluster_of(
            6,
            CrossCall::Route {
                hwirq: 45,
                cpu: 6,
                disable: false,
            },
        )
        .unwrap();
        gic.set_affinity(45, 5).unwrap();
        assert_eq!((soc.dist_word(1, GICD_ITARGETSR + 44) >> 8) & 0xFF, 1 << 1);

        gic.commit_owner(45, 0, 6).unwrap();

        assert_eq!(gic.affinity_of(45), 6);
        assert_eq!((soc.dist_word(1, GICD_ITARGETSR + 44) >> 8) & 0xFF, 1 << 2);
        assert_ne!(soc.dist_word(1, GICD_ISENABLER + 4) & (1 << 13), 0);
    }

    #[test]
    fn test_set_affinity_keeps_neighbour_targets() {
        let (gic, soc) = boot(&EIGHT);

        gic.set_affinity(44, 1).unwrap();
        gic.set_affinity(45, 2).unwrap();

        assert_eq!(soc.dist_word(0, GICD_ITARGETSR + 44), 0x0101_0402);
    }

    #[test]
    fn test_set_affinity_rejects_offline_target() {
        let (gic, soc) = boot(&EIGHT);
        soc.set_online(7, false);

        assert_eq!(gic.set_affinity(50, 7), Err(GicError::InvalidParameter));
        assert_eq!(gic.affinity_of(50), 0);
    }

    #[test]
    fn test_set_affinity_mask_picks_first_online() {
        let (gic, soc) = boot(&EIGHT);
        soc.set_online(4, false);

        gic.set_affinity_mask(60, CpuMask::cpu(4).with_cpu(6).with_cpu(7))
            .unwrap();
        assert_eq!(gic.affinity_of(60), 6);

        assert_eq!(
            gic.set_affinity_mask(60, CpuMask::cpu(4).with_cpu(20)),
            Err(GicError::InvalidParameter)
        );
    }

    #[test]
    fn test_set_type_validation() {
        let (gic, soc) = boot(&EIGHT);

        for hwirq in 0..16 {
            assert_eq!(
                gic.set_type(hwirq, IrqType::LEVEL_HIGH),
                Err(GicError::InvalidParameter)
            );
        }
        for ty in [
            IrqType::LEVEL_LOW,
            IrqType::EDGE_FALLING,
            IrqType::EDGE_RISING | IrqType::EDGE_FALLING,
            IrqType::empty(),
        ] {
            assert_eq!(gic.set_type(40, ty), Err(GicError::InvalidParameter));
        }

        assert!(soc.writes().is_empty());
        assert!(soc.xcalls().is_empty());
    }

    #[test]
    fn test_set_type_broadcasts_to_every_cluster() {
        let (gic, soc) = boot(&TWELVE);
        soc.set_current(5);

        gic.set_type(40, IrqType::EDGE_RISING).unwrap();

        let targets: Vec<u32> = soc.xcalls().iter().map(|x| x.to).collect();
        assert_eq!(targets, vec![0, 8]);
        for cluster in 0..3 {
            assert_eq!(soc.dist_word(cluster, GICD_ICFGR + 8) & (0x2 << 16), 0x2 << 16);
        }

        // Last write of the sequence lands on the caller's own cluster.
        assert_eq!(soc.writes_to(Region::Dist).last().unwrap().cluster, 1);

        gic.set_type(40, IrqType::LEVEL_HIGH).unwrap();
        for cluster in 0..3 {
            assert_eq!(soc.dist_word(cluster, GICD_ICFGR + 8) & (0x2 << 16), 0);
        }
    }

    #[test]
    fn test_set_type_disables_around_config_write() {
        let (gic, soc) = boot(&EIGHT);
        soc.set_online(4, false);
        soc.set_online(5, false);
        soc.set_online(6, false);
        soc.set_online(7, false);
        gic.unmask(40).unwrap();
        soc.clear_logs();

        gic.set_type(40, IrqType::EDGE_RISING).unwrap();

        let offsets: Vec<usize> = soc
            .writes_to(Region::Dist)
            .iter()
            .map(|w| w.offset)
            .collect();
        assert_eq!(offsets, vec![GICD_ICENABLER + 4, GICD_ICFGR + 8, GICD_ISENABLER + 4]);
        assert!(soc.xcalls().is_empty());
    }

    #[test]
    fn test_set_type_skips_offline_cluster() {
        let (gic, soc) = boot(&TWELVE);
        for cpu in 4..8 {
            soc.set_online(cpu, false);
        }

        gic.set_type(40, IrqType::EDGE_RISING).unwrap();

        let targets: Vec<u32> = soc.xcalls().iter().map(|x| x.to).collect();
        assert_eq!(targets, vec![8]);
        assert_eq!(soc.dist_word(1, GICD_ICFGR + 8) & (0x2 << 16), 0);
    }

    #[test]
    fn test_eoi_and_unsupported_ops() {
        let (gic, soc) = boot(&EIGHT);
        soc.set_current(3);

        gic.eoi(42).unwrap();
        let eois = soc.writes_to(Region::Cpu);
        assert_eq!(eois.len(), 1);
        assert_eq!((eois[0].cpu, eois[0].offset, eois[0].value), (3, GICC_EOIR, 42));

        assert_eq!(gic.retrigger(42), Err(GicError::NotSupported));
        assert_eq!(gic.set_wake(42, true), Err(GicError::NotSupported));
        assert_eq!(<SimGic as IrqChip>::NAME, "GIC");
    }
}
