//! Simulated multi-cluster SoC for host tests.
//!
//! One distributor per cluster, banked distributor words and a CPU
//! interface per core, and the two message-line windows. The "current" core
//! decides which distributor and bank an access reaches, just like the
//! aliased mapping on hardware. Cross-calls switch the current core for the
//! duration of the remote function.

use super::{AxxiaGic, AxxiaGicConfig, GicRegions};
use crate::arch::aarch64::gic::cpu_interface::GICC_IAR;
use crate::arch::aarch64::gic::distributor::{
    GICD_ICENABLER, GICD_ICFGR, GICD_IPRIORITYR, GICD_ISENABLER, GICD_ITARGETSR, GICD_TYPER,
};
use crate::arch::aarch64::gic::mmio::RegisterIo;
use crate::arch::aarch64::gic::INTID_SPURIOUS;
use crate::arch::aarch64::smp::{
    ClusterTopology, SmpError, SmpOperations, XcallMailbox, MAX_CLUSTERS,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

const DIST_WORDS: usize = 0x1000 / 4;
const CPU_WORDS: usize = 0x100 / 4;

/// Register block an access went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Dist,
    Cpu,
    IpiMask,
    IpiSend,
}

/// One logged register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegWrite {
    pub region: Region,
    pub cpu: u32,
    pub cluster: u32,
    pub offset: usize,
    pub value: u32,
}

/// One logged cross-call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Xcall {
    pub from: u32,
    pub to: u32,
}

#[derive(Debug)]
struct SocState {
    map: Vec<u32>,
    it_lines: u32,
    current: u32,
    online: Vec<bool>,
    irqs_disabled: Vec<bool>,
    forbid_xcalls: bool,
    dist: Vec<Vec<u32>>,
    banked: Vec<Vec<u32>>,
    cpu_if: Vec<Vec<u32>>,
    ipi_mask: BTreeMap<usize, u32>,
    ipi_send: BTreeMap<usize, u32>,
    iar: Vec<VecDeque<u32>>,
    writes: Vec<RegWrite>,
    xcalls: Vec<Xcall>,
}

/// Distributor words that exist once per core
fn is_banked(offset: usize) -> bool {
    offset == GICD_ISENABLER
        || offset == GICD_ICENABLER
        || (GICD_IPRIORITYR..GICD_IPRIORITYR + 0x20).contains(&offset)
        || (GICD_ITARGETSR..GICD_ITARGETSR + 0x20).contains(&offset)
        || (GICD_ICFGR..GICD_ICFGR + 0x08).contains(&offset)
}

/// Enable set and clear registers share one state word
fn enable_slot(offset: usize) -> usize {
    if (GICD_ICENABLER..GICD_ICENABLER + 0x80).contains(&offset) {
        offset - GICD_ICENABLER + GICD_ISENABLER
    } else {
        offset
    }
}

impl SocState {
    fn cluster(&self, cpu: u32) -> u32 {
        ClusterTopology::cluster_of_phys(self.map[cpu as usize])
    }

    fn dist_bank(&mut self, offset: usize) -> &mut Vec<u32> {
        let cpu = self.current;
        if is_banked(enable_slot(offset)) {
            &mut self.banked[cpu as usize]
        } else {
            let cluster = self.cluster(cpu);
            &mut self.dist[cluster as usize]
        }
    }

    fn read(&mut self, region: Region, offset: usize) -> u32 {
        let cpu = self.current as usize;
        match region {
            Region::Dist if offset == GICD_TYPER => self.it_lines,
            Region::Dist => {
                let slot = enable_slot(offset);
                self.dist_bank(offset)[slot / 4]
            }
            Region::Cpu if offset == GICC_IAR => {
                self.iar[cpu].pop_front().unwrap_or(INTID_SPURIOUS)
            }
            Region::Cpu => self.cpu_if[cpu][offset / 4],
            Region::IpiMask => self.ipi_mask.get(&offset).copied().unwrap_or(0),
            Region::IpiSend => self.ipi_send.get(&offset).copied().unwrap_or(0),
        }
    }

    fn write(&mut self, region: Region, offset: usize, value: u32) {
        self.log(region, offset, value);

        let cpu = self.current as usize;
        match region {
            Region::Dist => {
                let slot = enable_slot(offset) / 4;
                let bank = self.dist_bank(offset);
                if (GICD_ISENABLER..GICD_ISENABLER + 0x80).contains(&offset) {
                    bank[slot] |= value;
                } else if (GICD_ICENABLER..GICD_ICENABLER + 0x80).contains(&offset) {
                    bank[slot] &= !value;
                } else {
                    bank[slot] = value;
                }
            }
            Region::Cpu => self.cpu_if[cpu][offset / 4] = value,
            Region::IpiMask => {
                self.ipi_mask.insert(offset, value);
            }
            Region::IpiSend => {
                self.ipi_send.insert(offset, value);
            }
        }
    }

    fn write_byte(&mut self, region: Region, offset: usize, value: u8) {
        self.log(region, offset, value as u32);

        assert_eq!(region, Region::Dist, "byte access outside the distributor");
        let shift = (offset % 4) * 8;
        let bank = self.dist_bank(offset);
        let word = &mut bank[offset / 4];
        *word = (*word & !(0xFF << shift)) | ((value as u32) << shift);
    }

    fn log(&mut self, region: Region, offset: usize, value: u32) {
        let cpu = self.current;
        let cluster = self.cluster(cpu);
        self.writes.push(RegWrite {
            region,
            cpu,
            cluster,
            offset,
            value,
        });
    }
}

/// Handle to the simulated SoC, shared by the register blocks and the test
#[derive(Debug, Clone)]
pub(crate) struct Soc {
    state: Arc<Mutex<SocState>>,
    mailbox: Arc<XcallMailbox>,
}

/// Register block of the simulated SoC
#[derive(Debug)]
pub(crate) struct SimRegs {
    soc: Soc,
    region: Region,
}

impl RegisterIo for SimRegs {
    fn read_relaxed(&self, offset: usize) -> u32 {
        self.soc.lock().read(self.region, offset)
    }

    fn write_relaxed(&self, offset: usize, value: u32) {
        self.soc.lock().write(self.region, offset, value);
    }

    fn write_byte_relaxed(&self, offset: usize, value: u8) {
        self.soc.lock().write_byte(self.region, offset, value);
    }
}

/// Platform SMP services of the simulated SoC
#[derive(Debug)]
pub(crate) struct SimSmp {
    soc: Soc,
}

impl SmpOperations for SimSmp {
    fn current_cpu_id(&self) -> u32 {
        self.soc.lock().current
    }

    fn cpu_logical_map(&self, cpu: u32) -> u32 {
        self.soc.lock().map[cpu as usize]
    }

    fn cpu_online(&self, cpu: u32) -> bool {
        self.soc
            .lock()
            .online
            .get(cpu as usize)
            .copied()
            .unwrap_or(false)
    }

    fn nr_cpu_ids(&self) -> u32 {
        self.soc.lock().map.len() as u32
    }

    fn call_function_single<T: Sync>(
        &self,
        cpu: u32,
        func: fn(&T),
        arg: &T,
    ) -> Result<(), SmpError> {
        let from = {
            let mut state = self.soc.lock();
            let from = state.current;
            assert!(!state.forbid_xcalls, "unexpected cross-call to cpu{}", cpu);
            assert!(
                !state.irqs_disabled[from as usize],
                "cross-call from cpu{} with interrupts disabled",
                from
            );
            state.xcalls.push(Xcall { from, to: cpu });
            from
        };

        // The "message" runs the target's handler right away.
        self.soc.mailbox.call_single(cpu, func, arg, |target| {
            let mut state = self.soc.lock();
            if !state.online.get(target as usize).copied().unwrap_or(false) {
                return Err(SmpError::CpuOffline);
            }
            state.current = target;
            drop(state);

            self.soc.mailbox.service(target);
            self.soc.lock().current = from;
            Ok(())
        })
    }

    fn local_irq_enable(&self) {
        let mut state = self.soc.lock();
        let cpu = state.current as usize;
        state.irqs_disabled[cpu] = false;
    }

    fn local_irq_disable(&self) {
        let mut state = self.soc.lock();
        let cpu = state.current as usize;
        state.irqs_disabled[cpu] = true;
    }

    fn irqs_disabled(&self) -> bool {
        let state = self.soc.lock();
        state.irqs_disabled[state.current as usize]
    }
}

/// Builder for a simulated SoC
pub(crate) struct SocBuilder {
    map: Vec<u32>,
    it_lines: u32,
}

impl SocBuilder {
    /// SoC whose logical CPU `n` is physical CPU `map[n]`
    pub(crate) fn new(map: &[u32]) -> Self {
        Self {
            map: map.to_vec(),
            it_lines: 7,
        }
    }

    /// Set GICD_TYPER.ITLinesNumber
    pub(crate) fn it_lines(mut self, it_lines: u32) -> Self {
        self.it_lines = it_lines;
        self
    }

    pub(crate) fn build(self) -> Soc {
        let nr_cpus = self.map.len();
        let state = SocState {
            map: self.map,
            it_lines: self.it_lines,
            current: 0,
            online: vec![true; nr_cpus],
            irqs_disabled: vec![true; nr_cpus],
            forbid_xcalls: false,
            dist: vec![vec![0; DIST_WORDS]; MAX_CLUSTERS],
            banked: vec![vec![0; DIST_WORDS]; nr_cpus],
            cpu_if: vec![vec![0; CPU_WORDS]; nr_cpus],
            ipi_mask: BTreeMap::new(),
            ipi_send: BTreeMap::new(),
            iar: vec![VecDeque::new(); nr_cpus],
            writes: Vec::new(),
            xcalls: Vec::new(),
        };

        Soc {
            state: Arc::new(Mutex::new(state)),
            mailbox: Arc::new(XcallMailbox::new()),
        }
    }
}

impl Soc {
    fn lock(&self) -> MutexGuard<'_, SocState> {
        self.state.lock().unwrap()
    }

    fn regs(&self, region: Region) -> SimRegs {
        SimRegs {
            soc: self.clone(),
            region,
        }
    }

    /// Register blocks as seen by every core
    pub(crate) fn regions(&self) -> GicRegions<SimRegs> {
        GicRegions {
            dist: self.regs(Region::Dist),
            cpu: self.regs(Region::Cpu),
            ipi_mask: self.regs(Region::IpiMask),
            ipi_send: self.regs(Region::IpiSend),
        }
    }

    pub(crate) fn smp(&self) -> SimSmp {
        SimSmp { soc: self.clone() }
    }

    /// Make `cpu` the core running the test
    pub(crate) fn set_current(&self, cpu: u32) {
        self.lock().current = cpu;
    }

    pub(crate) fn set_online(&self, cpu: u32, online: bool) {
        self.lock().online[cpu as usize] = online;
    }

    /// Interrupt state of the current core
    pub(crate) fn irqs_disabled(&self) -> bool {
        let state = self.lock();
        state.irqs_disabled[state.current as usize]
    }

    /// Fail the test on any cross-call
    pub(crate) fn forbid_xcalls(&self, forbid: bool) {
        self.lock().forbid_xcalls = forbid;
    }

    /// Queue acknowledge values for `cpu`; reads past the end are spurious
    pub(crate) fn queue_iar(&self, cpu: u32, values: &[u32]) {
        self.lock().iar[cpu as usize].extend(values.iter().copied());
    }

    /// Every register write since the last clear
    pub(crate) fn writes(&self) -> Vec<RegWrite> {
        self.lock().writes.clone()
    }

    pub(crate) fn writes_to(&self, region: Region) -> Vec<RegWrite> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.region == region)
            .copied()
            .collect()
    }

    pub(crate) fn xcalls(&self) -> Vec<Xcall> {
        self.lock().xcalls.clone()
    }

    pub(crate) fn clear_logs(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.xcalls.clear();
    }

    /// Shared distributor word of `cluster`
    pub(crate) fn dist_word(&self, cluster: u32, offset: usize) -> u32 {
        self.lock().dist[cluster as usize][enable_slot(offset) / 4]
    }

    /// Banked distributor word of `cpu`
    pub(crate) fn banked_word(&self, cpu: u32, offset: usize) -> u32 {
        self.lock().banked[cpu as usize][enable_slot(offset) / 4]
    }

    /// CPU interface word of `cpu`
    pub(crate) fn cpu_word(&self, cpu: u32, offset: usize) -> u32 {
        self.lock().cpu_if[cpu as usize][offset / 4]
    }

    pub(crate) fn ipi_mask_word(&self, offset: usize) -> u32 {
        self.lock().ipi_mask.get(&offset).copied().unwrap_or(0)
    }

    /// Lose the distributor state of `cluster`
    pub(crate) fn power_off_cluster(&self, cluster: u32) {
        self.lock().dist[cluster as usize].fill(0);
    }

    /// Lose the banked and CPU interface state of `cpu`
    pub(crate) fn power_off_cpu(&self, cpu: u32) {
        let mut state = self.lock();
        state.banked[cpu as usize].fill(0);
        state.cpu_if[cpu as usize].fill(0);
    }
}

pub(crate) type SimGic = AxxiaGic<SimRegs, SimSmp>;

/// Boot a controller with the default configuration
///
/// 256 interrupts. Every cluster and core is brought up, then the test runs
/// on CPU 0 with interrupts disabled and empty logs.
pub(crate) fn boot(map: &[u32]) -> (SimGic, Soc) {
    boot_with(map, AxxiaGicConfig::default())
}

pub(crate) fn boot_with(map: &[u32], config: AxxiaGicConfig) -> (SimGic, Soc) {
    let soc = SocBuilder::new(map).build();
    let gic = AxxiaGic::init(soc.regions(), soc.smp(), config).unwrap();

    let topology = ClusterTopology::from_map(map).unwrap();
    let mut leads = Vec::new();
    for cluster in topology.other_clusters(topology.cluster_of(0)) {
        if let Some(cpu) = topology.representative(cluster, |_| true) {
            soc.set_current(cpu);
            gic.secondary_cluster_init();
            leads.push(cpu);
        }
    }
    for cpu in (1..topology.nr_cpus()).filter(|cpu| !leads.contains(cpu)) {
        soc.set_current(cpu);
        gic.secondary_init();
    }

    soc.set_current(0);
    soc.clear_logs();
    (gic, soc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banked_words_follow_current_cpu() {
        let soc = SocBuilder::new(&[0, 1, 2, 3, 4]).build();
        let dist = soc.regs(Region::Dist);

        soc.set_current(1);
        dist.write_relaxed(GICD_ISENABLER, 1 << 3);
        dist.write_relaxed(GICD_ISENABLER + 4, 1 << 2);
        soc.set_current(4);
        dist.write_relaxed(GICD_ISENABLER + 4, 1 << 5);
        dist.write_relaxed(GICD_ICENABLER + 4, 1 << 5);

        assert_eq!(soc.banked_word(1, GICD_ISENABLER), 1 << 3);
        assert_eq!(soc.banked_word(4, GICD_ISENABLER), 0);
        assert_eq!(soc.dist_word(0, GICD_ISENABLER + 4), 1 << 2);
        assert_eq!(dist.read_relaxed(GICD_ICENABLER + 4), 0);
        assert_eq!(soc.writes_to(Region::Dist)[2].cluster, 1);
    }

    #[test]
    fn test_byte_writes_and_iar_queue() {
        let soc = SocBuilder::new(&[0]).build();
        let dist = soc.regs(Region::Dist);
        let cpu = soc.regs(Region::Cpu);

        dist.write_byte_relaxed(GICD_ITARGETSR + 0x41, 0x04);
        assert_eq!(soc.dist_word(0, GICD_ITARGETSR + 0x40), 0x0400);

        soc.queue_iar(0, &[42]);
        assert_eq!(cpu.read_relaxed(GICC_IAR), 42);
        assert_eq!(cpu.read_relaxed(GICC_IAR), INTID_SPURIOUS);
    }
}
