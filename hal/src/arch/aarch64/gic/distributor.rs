//! # GIC Distributor (GICD)
//!
//! The Distributor manages routing, priority, trigger configuration and
//! enable state for all interrupts of one cluster. On Axxia each cluster has
//! its own distributor; only CPUs of that cluster can reach it.
//!
//! ## Register Map
//!
//! | Offset    | Register         | Description                          |
//! |-----------|------------------|--------------------------------------|
//! | 0x0000    | GICD_CTLR        | Distributor Control                  |
//! | 0x0004    | GICD_TYPER       | Interrupt Controller Type            |
//! | 0x0100    | GICD_ISENABLER   | Set-Enable Registers                 |
//! | 0x0180    | GICD_ICENABLER   | Clear-Enable Registers               |
//! | 0x0400    | GICD_IPRIORITYR  | Priority Registers                   |
//! | 0x0800    | GICD_ITARGETSR   | Target Registers                     |
//! | 0x0C00    | GICD_ICFGR       | Configuration Registers              |
//!
//! Register words are addressed by index: word `n` of a bank lives at
//! `bank + n * 4`.

use super::{bit_reg_offset, config_reg_offset, mmio::RegisterIo, TriggerMode, MAX_IRQS};

// ============================================================================
// GICD Register Offsets
// ============================================================================

/// GICD Control Register
pub const GICD_CTLR: usize = 0x0000;

/// GICD Type Register
pub const GICD_TYPER: usize = 0x0004;

/// GICD Interrupt Set-Enable Registers
pub const GICD_ISENABLER: usize = 0x0100;

/// GICD Interrupt Clear-Enable Registers
pub const GICD_ICENABLER: usize = 0x0180;

/// GICD Interrupt Priority Registers
pub const GICD_IPRIORITYR: usize = 0x0400;

/// GICD Interrupt Target Registers (banked for SGI/PPI)
pub const GICD_ITARGETSR: usize = 0x0800;

/// GICD Interrupt Configuration Registers
pub const GICD_ICFGR: usize = 0x0C00;

// ============================================================================
// GICD Register Bits
// ============================================================================

/// Forward pending interrupts to the CPU interfaces
pub const GICD_CTLR_ENABLE: u32 = 1 << 0;

/// Mask for ITLinesNumber field
pub const GICD_TYPER_ITLINES_MASK: u32 = 0x1F;

/// Edge-triggered bit inside a 2-bit ICFGR field
pub const GICD_ICFGR_EDGE: u32 = 0x2;

// ============================================================================
// Distributor Structure
// ============================================================================

/// One cluster's GIC distributor
#[derive(Debug)]
pub struct Distributor<R: RegisterIo> {
    regs: R,
}

impl<R: RegisterIo> Distributor<R> {
    /// Wrap a distributor register block
    #[inline]
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Access the underlying register block
    #[inline]
    pub fn regs(&self) -> &R {
        &self.regs
    }

    #[inline]
    fn read_reg(&self, offset: usize) -> u32 {
        self.regs.read_relaxed(offset)
    }

    #[inline]
    fn write_reg(&self, offset: usize, value: u32) {
        self.regs.write_relaxed(offset, value);
    }

    // ========================================================================
    // Control and Status
    // ========================================================================

    /// Write GICD_CTLR
    #[inline]
    pub fn write_ctlr(&self, value: u32) {
        self.write_reg(GICD_CTLR, value);
    }

    /// Stop forwarding interrupts
    #[inline]
    pub fn disable(&self) {
        self.write_ctlr(0);
    }

    /// Start forwarding interrupts
    #[inline]
    pub fn enable(&self) {
        self.write_ctlr(GICD_CTLR_ENABLE);
    }

    /// Read GICD_TYPER
    #[inline]
    pub fn read_typer(&self) -> u32 {
        self.read_reg(GICD_TYPER)
    }

    /// Number of interrupt IDs implemented, capped at [`MAX_IRQS`]
    #[inline]
    pub fn num_interrupts(&self) -> u32 {
        let it_lines = self.read_typer() & GICD_TYPER_ITLINES_MASK;
        (32 * (it_lines + 1)).min(MAX_IRQS)
    }

    // ========================================================================
    // Interrupt Enable/Disable
    // ========================================================================

    /// Enable an interrupt
    #[inline]
    pub fn enable_interrupt(&self, intid: u32) {
        let (reg_index, bit) = bit_reg_offset(intid);
        self.write_enable_word(reg_index, 1 << bit);
    }

    /// Disable an interrupt
    #[inline]
    pub fn disable_interrupt(&self, intid: u32) {
        let (reg_index, bit) = bit_reg_offset(intid);
        self.write_disable_word(reg_index, 1 << bit);
    }

    /// Check if an interrupt is enabled
    #[inline]
    pub fn is_enabled(&self, intid: u32) -> bool {
        let (reg_index, bit) = bit_reg_offset(intid);
        (self.read_enable_word(reg_index) & (1 << bit)) != 0
    }

    /// Read one GICD_ISENABLER word
    #[inline]
    pub fn read_enable_word(&self, index: usize) -> u32 {
        self.read_reg(GICD_ISENABLER + index * 4)
    }

    /// Set the enable bits in `mask` for word `index`
    #[inline]
    pub fn write_enable_word(&self, index: usize, mask: u32) {
        self.write_reg(GICD_ISENABLER + index * 4, mask);
    }

    /// Clear the enable bits in `mask` for word `index`
    #[inline]
    pub fn write_disable_word(&self, index: usize, mask: u32) {
        self.write_reg(GICD_ICENABLER + index * 4, mask);
    }

    // ========================================================================
    // Priority
    // ========================================================================

    /// Write one GICD_IPRIORITYR word
    #[inline]
    pub fn write_priority_word(&self, index: usize, value: u32) {
        self.write_reg(GICD_IPRIORITYR + index * 4, value);
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Read one GICD_ITARGETSR word
    #[inline]
    pub fn read_target_word(&self, index: usize) -> u32 {
        self.read_reg(GICD_ITARGETSR + index * 4)
    }

    /// Write one GICD_ITARGETSR word
    #[inline]
    pub fn write_target_word(&self, index: usize, value: u32) {
        self.write_reg(GICD_ITARGETSR + index * 4, value);
    }

    /// Write the target byte of an interrupt with a single byte access
    #[inline]
    pub fn write_target_byte(&self, intid: u32, targets: u8) {
        self.regs
            .write_byte_relaxed(GICD_ITARGETSR + intid as usize, targets);
    }

    // ========================================================================
    // Trigger Configuration
    // ========================================================================

    /// Read one GICD_ICFGR word
    #[inline]
    pub fn read_config_word(&self, index: usize) -> u32 {
        self.read_reg(GICD_ICFGR + index * 4)
    }

    /// Write one GICD_ICFGR word
    #[inline]
    pub fn write_config_word(&self, index: usize, value: u32) {
        self.write_reg(GICD_ICFGR + index * 4, value);
    }

    /// Compute the ICFGR word that applies `mode` to `intid`
    ///
    /// Only the edge bit of the field is touched.
    pub fn config_with_mode(&self, intid: u32, mode: TriggerMode) -> (usize, u32) {
        let (reg_index, bit_offset) = config_reg_offset(intid);
        let config = self.read_config_word(reg_index);
        let edge = GICD_ICFGR_EDGE << bit_offset;

        let config = match mode {
            TriggerMode::Level => config & !edge,
            TriggerMode::Edge => config | edge,
        };
        (reg_index, config)
    }

    /// Set the trigger mode of an interrupt
    #[inline]
    pub fn set_trigger_mode(&self, intid: u32, mode: TriggerMode) {
        let (reg_index, config) = self.config_with_mode(intid, mode);
        self.write_config_word(reg_index, config);
    }
}
