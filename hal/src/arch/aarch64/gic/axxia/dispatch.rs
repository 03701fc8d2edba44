//! # Interrupt Dispatch
//!
//! Top-level exception handler: drains the CPU interface, translating
//! message-line arrivals back into IPIs and everything else into logical
//! interrupt numbers for the generic layer.

use super::AxxiaGic;
use crate::arch::aarch64::gic::{mmio::RegisterIo, MAX_IRQS, PPI_BASE};
use crate::arch::aarch64::smp::SmpOperations;

/// Consumer of dispatched interrupts
///
/// `F` is the saved register frame of the interrupted context, passed
/// through untouched.
pub trait IrqSink<F: ?Sized> {
    /// Handle logical interrupt `irq`
    ///
    /// The sink is responsible for the EOI, through the flow handler the
    /// domain mapped the interrupt with.
    fn handle_irq(&self, irq: u32, frame: &F);

    /// Handle inter-CPU message `ipinum`, already acknowledged
    fn handle_ipi(&self, ipinum: u32, frame: &F);
}

impl<R: RegisterIo, S: SmpOperations> AxxiaGic<R, S> {
    /// Handle every pending interrupt on the calling core
    ///
    /// Returns once the CPU interface reports a spurious ID.
    pub fn handle_irq<F: ?Sized, K: IrqSink<F>>(&self, sink: &K, frame: &F) {
        loop {
            let stat = self.cpu_if.acknowledge();
            if stat.is_spurious() {
                break;
            }
            let hwirq = stat.intid();

            if (PPI_BASE..MAX_IRQS).contains(&hwirq) {
                if let Some(msg) = self.demultiplex(hwirq) {
                    self.cpu_if.end_of_interrupt(hwirq);
                    sink.handle_ipi(msg.number(), frame);
                    continue;
                }

                match self.domain.find_mapping(hwirq) {
                    Some(irq) => sink.handle_irq(irq, frame),
                    None => {
                        log::warn!("GIC: spurious hwirq {}", hwirq);
                        self.cpu_if.end_of_interrupt(stat.raw());
                    }
                }
                continue;
            }

            if hwirq < PPI_BASE {
                self.cpu_if.end_of_interrupt(stat.raw());
                sink.handle_ipi(hwirq, frame);
                continue;
            }

            break;
        }
    }
}
