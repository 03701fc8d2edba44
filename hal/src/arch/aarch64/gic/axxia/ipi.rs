//! # Message Lines
//!
//! Axxia has no usable SGIs across clusters. Inter-CPU messages travel on a
//! block of 16 SPIs instead: four lines per core, raised by writing a
//! bitmap of physical target CPUs into a per-sender send register.
//!
//! ## Line Assignment
//!
//! | Line | Hardware IRQ      | Message                                  |
//! |------|-------------------|------------------------------------------|
//! | 0    | base + 0..3       | Timer                                    |
//! | 1    | base + 4..7       | Reschedule                               |
//! | 2    | base + 8..11      | Call function / call function single     |
//! | 3    | base + 12..15     | CPU stop / wakeup                        |
//!
//! Lines 2 and 3 carry two message kinds each. The kind last raised on a
//! line is remembered in a process-wide [`IpiMux`] and used to classify the
//! next arrival on that line. Two different kinds raised back to back on
//! one line are therefore both delivered as the second kind.
//!
//! ## Send Register Layout
//!
//! ```text
//!   ipi_send + 0x00000 + phys * 0x1000 + line * 4   (physical CPUs 0-7)
//!   ipi_send + 0x10000 + (phys - 8) * 0x1000 + line * 4   (CPUs 8-15)
//! ```

use super::AxxiaGic;
use crate::arch::aarch64::gic::{mmio::RegisterIo, GicError};
use crate::arch::aarch64::smp::{CpuMask, SmpOperations, CORES_PER_CLUSTER};
use core::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Constants
// ============================================================================

/// Number of message lines per core
pub const IPI_LINES: u32 = 4;

/// Size of the hardware IRQ block reserved for message lines
pub const IPI_COUNT: u32 = IPI_LINES * CORES_PER_CLUSTER;

/// Default first hardware IRQ of the message block
pub const IPI_BASE_DEFAULT: u32 = 227;

/// Offset of the per-CPU message unmask registers
pub const IPI_MASK_BASE: usize = 0x40;

/// Distance between two senders' register blocks
pub const IPI_SEND_STRIDE: usize = 0x1000;

/// Base of the register blocks of physical CPUs 8-15
pub const IPI_SEND_HIGH_BASE: usize = 0x10000;

// ============================================================================
// Message Kinds
// ============================================================================

/// Inter-CPU message kinds of the generic SMP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IpiMessage {
    /// Wake a CPU from a low-power state (never delivered)
    Wakeup             = 1,
    /// Broadcast timer tick
    Timer              = 2,
    /// Run the scheduler
    Reschedule         = 3,
    /// Run queued cross-CPU functions
    CallFunction       = 4,
    /// Run the function queued for this CPU only
    CallFunctionSingle = 5,
    /// Park the CPU
    CpuStop            = 6,
}

impl IpiMessage {
    /// Message number understood by the generic SMP layer
    #[inline]
    pub const fn number(self) -> u32 {
        self as u32
    }

    /// Look up a message by its generic number
    pub const fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(IpiMessage::Wakeup),
            2 => Some(IpiMessage::Timer),
            3 => Some(IpiMessage::Reschedule),
            4 => Some(IpiMessage::CallFunction),
            5 => Some(IpiMessage::CallFunctionSingle),
            6 => Some(IpiMessage::CpuStop),
            _ => None,
        }
    }

    /// Hardware line the message travels on
    pub const fn line(self) -> MessageLine {
        match self {
            IpiMessage::Timer => MessageLine::Timer,
            IpiMessage::Reschedule => MessageLine::Reschedule,
            IpiMessage::CallFunction | IpiMessage::CallFunctionSingle => MessageLine::CallFunction,
            IpiMessage::CpuStop | IpiMessage::Wakeup => MessageLine::StopWake,
        }
    }
}

impl TryFrom<u32> for IpiMessage {
    type Error = GicError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or(GicError::InvalidParameter)
    }
}

/// One of the four message lines of a core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageLine {
    /// Line 0, timer only
    Timer        = 0,
    /// Line 1, reschedule only
    Reschedule   = 1,
    /// Line 2, shared by the call-function pair
    CallFunction = 2,
    /// Line 3, shared by stop and wakeup
    StopWake     = 3,
}

impl MessageLine {
    /// Line index (0-3)
    #[inline]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Line a hardware IRQ belongs to, if it is in the message block
    pub const fn from_hwirq(hwirq: u32, base: u32) -> Option<Self> {
        if hwirq < base || hwirq >= base + IPI_COUNT {
            return None;
        }
        match (hwirq - base) / CORES_PER_CLUSTER {
            0 => Some(MessageLine::Timer),
            1 => Some(MessageLine::Reschedule),
            2 => Some(MessageLine::CallFunction),
            _ => Some(MessageLine::StopWake),
        }
    }

    /// Send register of this line for a physical sender
    #[inline]
    pub const fn send_offset(self, phys: u32) -> usize {
        let block = if phys < 8 {
            phys as usize * IPI_SEND_STRIDE
        } else {
            (phys as usize - 8) * IPI_SEND_STRIDE + IPI_SEND_HIGH_BASE
        };
        block + self.index() as usize * 4
    }
}

/// Unmask register of a CPU in the message-mask block
#[inline]
pub const fn mask_offset(cpu: u32) -> usize {
    IPI_MASK_BASE + cpu as usize * 4
}

// ============================================================================
// Multiplex Table
// ============================================================================

/// Kind carried by the call-function line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallFunctionKind {
    /// Broadcast function call
    CallFunction       = IpiMessage::CallFunction as u8,
    /// Single-target function call
    CallFunctionSingle = IpiMessage::CallFunctionSingle as u8,
}

/// Kind carried by the stop/wake line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopWakeKind {
    /// Park the CPU
    CpuStop = IpiMessage::CpuStop as u8,
    /// Wakeup, filtered on arrival
    Wakeup  = IpiMessage::Wakeup as u8,
}

impl From<CallFunctionKind> for IpiMessage {
    fn from(kind: CallFunctionKind) -> Self {
        match kind {
            CallFunctionKind::CallFunction => IpiMessage::CallFunction,
            CallFunctionKind::CallFunctionSingle => IpiMessage::CallFunctionSingle,
        }
    }
}

impl From<StopWakeKind> for IpiMessage {
    fn from(kind: StopWakeKind) -> Self {
        match kind {
            StopWakeKind::CpuStop => IpiMessage::CpuStop,
            StopWakeKind::Wakeup => IpiMessage::Wakeup,
        }
    }
}

/// Last message kind raised on each shared line
///
/// A slot holding 0 has never been raised; arrivals on it are treated as
/// ordinary interrupts.
#[derive(Debug, Default)]
pub struct IpiMux {
    call_function: AtomicU8,
    stop_wake: AtomicU8,
}

impl IpiMux {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            call_function: AtomicU8::new(0),
            stop_wake: AtomicU8::new(0),
        }
    }

    /// Remember `msg` as the current kind of its line
    pub fn record(&self, msg: IpiMessage) {
        match msg.line() {
            MessageLine::CallFunction => self.call_function.store(msg as u8, Ordering::Release),
            MessageLine::StopWake => self.stop_wake.store(msg as u8, Ordering::Release),
            MessageLine::Timer | MessageLine::Reschedule => {}
        }
    }

    /// Current kind of the call-function line
    pub fn call_function(&self) -> Option<CallFunctionKind> {
        match self.call_function.load(Ordering::Acquire) {
            4 => Some(CallFunctionKind::CallFunction),
            5 => Some(CallFunctionKind::CallFunctionSingle),
            _ => None,
        }
    }

    /// Current kind of the stop/wake line
    pub fn stop_wake(&self) -> Option<StopWakeKind> {
        match self.stop_wake.load(Ordering::Acquire) {
            6 => Some(StopWakeKind::CpuStop),
            1 => Some(StopWakeKind::Wakeup),
            _ => None,
        }
    }

    /// Message an arrival on `line` stands for
    ///
    /// Wakeups are dropped here: they only exist to bring a core out of a
    /// low-power state.
    pub fn resolve(&self, line: MessageLine) -> Option<IpiMessage> {
        let msg = match line {
            MessageLine::Timer => Some(IpiMessage::Timer),
            MessageLine::Reschedule => Some(IpiMessage::Reschedule),
            MessageLine::CallFunction => self.call_function().map(IpiMessage::from),
            MessageLine::StopWake => self.stop_wake().map(IpiMessage::from),
        };
        msg.filter(|&msg| msg != IpiMessage::Wakeup)
    }
}

// ============================================================================
// Raise / Demultiplex
// ============================================================================

impl<R: RegisterIo, S: SmpOperations> AxxiaGic<R, S> {
    /// Send `msg` to every CPU in `targets`
    ///
    /// The send register is written after a full barrier so that memory
    /// written before the call is visible to the targets when they take the
    /// interrupt.
    pub fn raise(&self, targets: CpuMask, msg: IpiMessage) -> Result<(), GicError> {
        let nr_cpus = self.topology.nr_cpus();
        let phys = self.topology.phys_id(self.smp.current_cpu_id());

        if phys >= nr_cpus {
            log::error!("Invalid cpu num ({}) >= max ({})", phys, nr_cpus);
            return Err(GicError::InvalidParameter);
        }

        let map = targets
            .iter()
            .filter(|&cpu| cpu < nr_cpus)
            .fold(0u32, |map, cpu| map | (1 << self.topology.phys_id(cpu)));

        self.mux.record(msg);
        self.ipi_send
            .write_synced(msg.line().send_offset(phys), map);
        Ok(())
    }

    /// Raise a message by its generic number
    pub fn raise_number(&self, targets: CpuMask, n: u32) -> Result<(), GicError> {
        let msg = IpiMessage::try_from(n).inspect_err(|_| {
            log::error!("Unknown IPI num ({})!", n);
        })?;
        self.raise(targets, msg)
    }

    /// Check whether `hwirq` is one of the message lines
    #[inline]
    pub fn is_message_line(&self, hwirq: u32) -> bool {
        MessageLine::from_hwirq(hwirq, self.config.ipi_base).is_some()
    }

    /// Message carried by an arrival on `hwirq`, if any
    ///
    /// `None` for interrupts outside the message block, for shared lines that
    /// were never raised, and for wakeups.
    pub fn demultiplex(&self, hwirq: u32) -> Option<IpiMessage> {
        MessageLine::from_hwirq(hwirq, self.config.ipi_base)
            .and_then(|line| self.mux.resolve(line))
    }

    /// Unmask every message line for every CPU
    pub(super) fn unmask_message_lines(&self) {
        let nr_cpus = self.topology.nr_cpus();
        let all = CpuMask::first(nr_cpus).bits();
        for cpu in 0..nr_cpus {
            self.ipi_mask.write_relaxed(mask_offset(cpu), all);
        }
    }
}
