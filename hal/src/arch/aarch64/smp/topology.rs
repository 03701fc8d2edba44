//! # Cluster Topology
//!
//! Maps logical CPU numbers onto Axxia clusters. Topology is static: it is
//! captured once from the platform's logical-to-physical CPU map, and a
//! cluster is simply four consecutive physical CPU IDs.

use super::{SmpError, SmpOperations, CORES_PER_CLUSTER, MAX_CLUSTERS, MAX_CPUS};

/// Static logical-to-physical CPU layout
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    /// Physical ID of each logical CPU
    phys: [u8; MAX_CPUS],
    /// Number of logical CPU IDs in use
    nr_cpus: u32,
}

impl ClusterTopology {
    /// Build a topology from an explicit logical-to-physical map
    pub fn from_map(map: &[u32]) -> Result<Self, SmpError> {
        if map.is_empty() || map.len() > MAX_CPUS {
            return Err(SmpError::InvalidCpu);
        }

        let mut phys = [0u8; MAX_CPUS];
        for (slot, &id) in phys.iter_mut().zip(map) {
            if id as usize >= MAX_CPUS {
                return Err(SmpError::InvalidCpu);
            }
            *slot = id as u8;
        }

        Ok(Self {
            phys,
            nr_cpus: map.len() as u32,
        })
    }

    /// Capture the topology reported by the platform
    pub fn from_smp<S: SmpOperations>(smp: &S) -> Result<Self, SmpError> {
        let nr_cpus = smp.nr_cpu_ids();
        if nr_cpus == 0 || nr_cpus as usize > MAX_CPUS {
            return Err(SmpError::InvalidCpu);
        }

        let mut map = [0u32; MAX_CPUS];
        for (cpu, slot) in map.iter_mut().enumerate().take(nr_cpus as usize) {
            *slot = smp.cpu_logical_map(cpu as u32);
        }
        Self::from_map(&map[..nr_cpus as usize])
    }

    /// Number of logical CPU IDs
    #[inline]
    pub const fn nr_cpus(&self) -> u32 {
        self.nr_cpus
    }

    /// Physical ID of a logical CPU
    #[inline]
    pub fn phys_id(&self, cpu: u32) -> u32 {
        self.phys[cpu as usize % MAX_CPUS] as u32
    }

    /// Cluster a physical CPU belongs to
    #[inline]
    pub const fn cluster_of_phys(phys: u32) -> u32 {
        phys / CORES_PER_CLUSTER
    }

    /// Cluster a logical CPU belongs to
    #[inline]
    pub fn cluster_of(&self, cpu: u32) -> u32 {
        Self::cluster_of_phys(self.phys_id(cpu))
    }

    /// Position of a logical CPU inside its cluster (0-3)
    #[inline]
    pub fn core_in_cluster(&self, cpu: u32) -> u32 {
        self.phys_id(cpu) % CORES_PER_CLUSTER
    }

    /// Check whether two logical CPUs share a distributor
    #[inline]
    pub fn same_cluster(&self, a: u32, b: u32) -> bool {
        self.cluster_of(a) == self.cluster_of(b)
    }

    /// Number of clusters spanned by the logical CPUs
    pub fn nr_clusters(&self) -> u32 {
        (0..self.nr_cpus)
            .map(|cpu| self.cluster_of(cpu) + 1)
            .max()
            .unwrap_or(1)
            .min(MAX_CLUSTERS as u32)
    }

    /// First online CPU of a cluster, by physical ID
    ///
    /// This is the CPU cluster-wide broadcasts are sent to. Returns `None`
    /// if no CPU of the cluster is online.
    pub fn representative(&self, cluster: u32, online: impl Fn(u32) -> bool) -> Option<u32> {
        (0..self.nr_cpus)
            .filter(|&cpu| self.cluster_of(cpu) == cluster && online(cpu))
            .min_by_key(|&cpu| self.phys_id(cpu))
    }

    /// Every cluster except `cluster`, in ascending order
    pub fn other_clusters(&self, cluster: u32) -> impl Iterator<Item = u32> {
        (0..self.nr_clusters()).filter(move |&c| c != cluster)
    }
}
