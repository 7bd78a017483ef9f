//! Deferred requests serviced between evaluation steps.
//!
//! A [`SignalHandle`] is shared between the interpreter and whoever wants to
//! poke it: the heap (recycle), a host Ctrl-C handler (halt, interrupt), or a
//! debugger. Raising a signal sets a bit and arms the countdown so the very
//! next step services it. Typed messages ride a queue next to the bits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use parking_lot::Mutex;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SignalFlags: u32 {
        const RECYCLE = 1 << 0;
        const HALT = 1 << 1;
        const INTERRUPT = 1 << 2;
        /// Reserved for event ports; nothing raises it.
        const EVENT_PORT = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    Recycle,
    Halt,
    /// Breakpoint request, with an optional note for the hook.
    Interrupt(Option<String>),
}

impl SignalMessage {
    fn flag(&self) -> SignalFlags {
        match self {
            SignalMessage::Recycle => SignalFlags::RECYCLE,
            SignalMessage::Halt => SignalFlags::HALT,
            SignalMessage::Interrupt(_) => SignalFlags::INTERRUPT,
        }
    }
}

struct Shared {
    flags: AtomicU32,
    countdown: AtomicU32,
    queue: Mutex<VecDeque<SignalMessage>>,
}

#[derive(Clone)]
pub struct SignalHandle {
    shared: Arc<Shared>,
    dose: u32,
}

impl SignalHandle {
    /// `dose` is the number of steps between routine polls.
    pub fn new(dose: u32) -> Self {
        let dose = dose.max(1);
        Self {
            shared: Arc::new(Shared {
                flags: AtomicU32::new(0),
                countdown: AtomicU32::new(dose),
                queue: Mutex::new(VecDeque::new()),
            }),
            dose,
        }
    }

    pub fn raise(&self, flags: SignalFlags) {
        self.shared.flags.fetch_or(flags.bits(), Ordering::AcqRel);
        self.shared.countdown.store(1, Ordering::Release);
    }

    pub fn send(&self, message: SignalMessage) {
        let flag = message.flag();
        self.shared.queue.lock().push_back(message);
        self.raise(flag);
    }

    pub fn halt(&self) {
        self.raise(SignalFlags::HALT);
    }

    pub fn pending(&self) -> SignalFlags {
        SignalFlags::from_bits_truncate(self.shared.flags.load(Ordering::Acquire))
    }

    /// Counts one evaluation step. True when the step must service signals.
    #[inline]
    pub fn tick(&self) -> bool {
        let before = self.shared.countdown.fetch_sub(1, Ordering::AcqRel);
        if before <= 1 {
            self.shared.countdown.store(self.dose, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Clears and returns the given bits.
    pub fn take(&self, mask: SignalFlags) -> SignalFlags {
        let before = self.shared.flags.fetch_and(!mask.bits(), Ordering::AcqRel);
        SignalFlags::from_bits_truncate(before) & mask
    }

    pub fn drain(&self) -> Vec<SignalMessage> {
        self.shared.queue.lock().drain(..).collect()
    }

    pub fn dose(&self) -> u32 {
        self.dose
    }
}

impl std::fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandle")
            .field("pending", &self.pending())
            .field("dose", &self.dose)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_reloads() {
        let signals = SignalHandle::new(3);
        assert!(!signals.tick());
        assert!(!signals.tick());
        assert!(signals.tick());
        assert!(!signals.tick());
    }

    #[test]
    fn raise_arms_next_tick() {
        let signals = SignalHandle::new(1000);
        assert!(!signals.tick());
        signals.raise(SignalFlags::RECYCLE);
        assert!(signals.tick());
        assert_eq!(signals.take(SignalFlags::all()), SignalFlags::RECYCLE);
        assert!(signals.pending().is_empty());
    }

    #[test]
    fn messages_set_bits_across_threads() {
        let signals = SignalHandle::new(1000);
        let remote = signals.clone();
        std::thread::spawn(move || remote.send(SignalMessage::Interrupt(None)))
            .join()
            .unwrap();
        assert!(signals.pending().contains(SignalFlags::INTERRUPT));
        assert_eq!(signals.drain(), vec![SignalMessage::Interrupt(None)]);
    }
}
