//! # Interrupt Domain
//!
//! Linear translation between GIC hardware interrupt numbers and the
//! logical numbers used by the generic interrupt layer, plus the descriptor
//! setup and firmware specifier decoding the generic layer asks for.

use crate::arch::aarch64::gic::{GicError, IrqType, PPI_BASE, SGI_COUNT, SPI_BASE};

bitflags::bitflags! {
    /// Descriptor flags requested for a mapped interrupt
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        /// Interrupt can be requested
        const VALID = 1 << 0;
        /// Interrupt can be probed by autodetection
        const PROBE = 1 << 1;
        /// Do not enable on request
        const NOAUTOEN = 1 << 2;
    }
}

/// Flow handler the generic layer should install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowHandler {
    /// Banked interrupt with a per-CPU device id
    PerCpuDevid,
    /// Shared interrupt acknowledged by a single EOI
    FastEoi,
}

/// Descriptor setup for one mapped interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqMapping {
    /// Logical interrupt number
    pub irq: u32,
    /// Hardware interrupt number
    pub hwirq: u32,
    /// Flow handler
    pub flow: FlowHandler,
    /// Descriptor flags
    pub flags: IrqFlags,
}

/// Linear hardware-to-logical interrupt map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyDomain {
    hwirq_base: u32,
    irq_base: u32,
    size: u32,
}

impl LegacyDomain {
    /// Build the domain for a controller with `gic_irqs` interrupt IDs
    ///
    /// SGIs are never mapped. PPIs are only mapped when `irq_start` is not
    /// 32-aligned, which includes leaving it unset; `irq_start` is then
    /// rounded to the PPI slot of its 32-block.
    ///
    /// Fails when the logical range would run past `u32::MAX`.
    pub fn new(gic_irqs: u32, irq_start: Option<u32>) -> Result<Self, GicError> {
        let (hwirq_base, irq_base) = match irq_start {
            None => (PPI_BASE, Some(PPI_BASE)),
            Some(start) if start & 31 != 0 => (PPI_BASE, (start & !31).checked_add(SGI_COUNT)),
            Some(start) => (SPI_BASE, Some(start)),
        };
        let size = gic_irqs.saturating_sub(hwirq_base);

        match irq_base {
            Some(irq_base) if irq_base.checked_add(size).is_some() => Ok(Self {
                hwirq_base,
                irq_base,
                size,
            }),
            _ => Err(GicError::InvalidParameter),
        }
    }

    /// First hardware number covered
    #[inline]
    pub const fn hwirq_base(&self) -> u32 {
        self.hwirq_base
    }

    /// Logical number of the first covered hardware number
    #[inline]
    pub const fn irq_base(&self) -> u32 {
        self.irq_base
    }

    /// Number of interrupts covered
    #[inline]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Logical number of a hardware interrupt
    pub fn find_mapping(&self, hwirq: u32) -> Option<u32> {
        let offset = hwirq.checked_sub(self.hwirq_base)?;
        (offset < self.size).then(|| self.irq_base + offset)
    }

    /// Hardware number of a logical interrupt
    pub fn hwirq_of(&self, irq: u32) -> Option<u32> {
        let offset = irq.checked_sub(self.irq_base)?;
        (offset < self.size).then(|| self.hwirq_base + offset)
    }

    /// Descriptor setup for a hardware interrupt
    pub fn map(&self, hwirq: u32) -> Option<IrqMapping> {
        let irq = self.find_mapping(hwirq)?;
        let (flow, flags) = if hwirq < SPI_BASE {
            (FlowHandler::PerCpuDevid, IrqFlags::VALID | IrqFlags::NOAUTOEN)
        } else {
            (FlowHandler::FastEoi, IrqFlags::VALID | IrqFlags::PROBE)
        };

        Some(IrqMapping {
            irq,
            hwirq,
            flow,
            flags,
        })
    }

    /// Decode a `[is_ppi, number, flags]` firmware interrupt specifier
    ///
    /// Returns the hardware number and the requested trigger type.
    pub fn xlate(&self, intspec: &[u32]) -> Result<(u32, IrqType), GicError> {
        let &[kind, number, flags, ..] = intspec else {
            return Err(GicError::InvalidParameter);
        };

        let skip = if kind == 0 { SPI_BASE } else { PPI_BASE };
        let hwirq = number
            .checked_add(skip)
            .ok_or(GicError::InvalidParameter)?;

        Ok((hwirq, IrqType::from_bits_truncate(flags & IrqType::SENSE_MASK)))
    }
}
