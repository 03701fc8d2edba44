//! # Synchronous Cross-CPU Calls
//!
//! Building block for [`SmpOperations::call_function_single`]. Each CPU owns
//! one work slot. A caller claims the target's slot, publishes a function
//! and a borrowed argument, signals the target, and spins until the target
//! reports completion. The target runs [`XcallMailbox::service`] from its
//! call-function message handler.
//!
//! ```text
//!   Caller CPU                              Target CPU
//!  ┌───────────────────┐                  ┌───────────────────┐
//!  │ claim slot[tgt]   │                  │                   │
//!  │ publish fn + arg  │                  │                   │
//!  │ kick(tgt) ────────┼─── message ─────▶│ service(tgt)      │
//!  │                   │                  │   take work       │
//!  │ spin on done ◀────┼──── done = 1 ────┼── run fn(arg)     │
//!  │ release slot      │                  │                   │
//!  └───────────────────┘                  └───────────────────┘
//! ```
//!
//! The argument is never copied: the caller keeps ownership and the borrow
//! outlives the remote execution because the caller does not return before
//! it observes completion.
//!
//! A failed kick does not end the call on its own. The caller takes the work
//! back under the slot lock; if the target already took it, the call is in
//! flight and the caller waits for completion and reports success.
//!
//! [`SmpOperations::call_function_single`]: super::SmpOperations::call_function_single

use super::{SmpError, MAX_CPUS};
use core::sync::atomic::{AtomicBool, Ordering};

/// Type-erased function and argument published in a slot
#[derive(Clone, Copy)]
struct Work {
    entry: unsafe fn(usize, usize),
    func: usize,
    arg: usize,
}

/// Recovers the typed function and argument and runs it.
///
/// # Safety
///
/// `func` must come from a `fn(&T)` and `arg` from a `&T` that is still
/// borrowed by the waiting caller.
unsafe fn trampoline<T>(func: usize, arg: usize) {
    let func = unsafe { core::mem::transmute::<usize, fn(&T)>(func) };
    func(unsafe { &*(arg as *const T) });
}

/// Per-CPU cross-call slot
struct XcallSlot {
    /// Slot owned by a caller
    busy: AtomicBool,
    /// Published work, taken by the target
    work: spin::Mutex<Option<Work>>,
    /// Target finished running the work
    done: AtomicBool,
}

impl XcallSlot {
    const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            work: spin::Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        *self.work.lock() = None;
        self.done.store(false, Ordering::Relaxed);
        self.busy.store(false, Ordering::Release);
    }
}

/// Cross-call slots for every CPU
pub struct XcallMailbox {
    slots: [XcallSlot; MAX_CPUS],
}

impl XcallMailbox {
    /// Create an empty mailbox
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: XcallSlot = XcallSlot::new();
        Self {
            slots: [EMPTY; MAX_CPUS],
        }
    }

    /// Run `func(arg)` on `cpu` and wait for it to finish.
    ///
    /// `kick` must make the target call [`service`](Self::service) soon,
    /// typically by raising a call-function-single message. The calling CPU
    /// must have interrupts enabled if the target can be waiting on it.
    ///
    /// An `Err` means `func` did not run and will not run.
    pub fn call_single<T, K>(&self, cpu: u32, func: fn(&T), arg: &T, kick: K) -> Result<(), SmpError>
    where
        T: Sync,
        K: FnOnce(u32) -> Result<(), SmpError>,
    {
        let slot = self.slots.get(cpu as usize).ok_or(SmpError::InvalidCpu)?;

        while slot
            .busy
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        *slot.work.lock() = Some(Work {
            entry: trampoline::<T>,
            func: func as usize,
            arg: arg as *const T as usize,
        });

        if let Err(err) = kick(cpu) {
            let withdrawn = slot.work.lock().take().is_some();
            if withdrawn {
                slot.release();
                return Err(err);
            }
        }

        while !slot.done.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }

        slot.release();
        Ok(())
    }

    /// Run the work pending for `cpu`, if any.
    ///
    /// Called on `cpu` itself. Returns `true` if work was run.
    pub fn service(&self, cpu: u32) -> bool {
        let Some(slot) = self.slots.get(cpu as usize) else {
            return false;
        };

        let Some(work) = slot.work.lock().take() else {
            return false;
        };

        // SAFETY: the work was published by `call_single`, whose caller
        // keeps `arg` borrowed until `done` is observed.
        unsafe { (work.entry)(work.func, work.arg) };

        slot.done.store(true, Ordering::Release);
        true
    }
}

impl Default for XcallMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for XcallMailbox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let busy = self
            .slots
            .iter()
            .filter(|slot| slot.busy.load(Ordering::Relaxed))
            .count();
        f.debug_struct("XcallMailbox").field("busy", &busy).finish()
    }
}
