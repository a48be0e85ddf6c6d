//! Two-condition startup gate.
//!
//! The application may only start once the host has configured the window
//! *and* supplied the archive. Both conditions arrive from host calls in any
//! order, possibly on different threads, and each may be repeated. The gate
//! packs both conditions plus the one-shot "started" bit into a single atomic
//! byte so the consumer (the main loop) can claim the start with one
//! compare-exchange.
//!
//! ```rust
//! use apprun_common::readiness::{GateState, ReadinessGate};
//!
//! let gate = ReadinessGate::new();
//! gate.mark_archive_ready();
//! assert!(!gate.try_start());
//! gate.mark_window_ready();
//! assert!(gate.try_start());
//! assert!(!gate.try_start());
//! assert_eq!(gate.state(), GateState::Started);
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

const WINDOW_READY: u8 = 0b001;
const ARCHIVE_READY: u8 = 0b010;
const BOTH_READY: u8 = WINDOW_READY | ARCHIVE_READY;
const STARTED: u8 = 0b100;

/// Observable state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Neither condition has been reported.
    Idle,
    /// At least one condition is still missing, or both are set and the
    /// consumer has not yet claimed the start.
    WaitingForBoth { window: bool, archive: bool },
    /// Terminal: the entry point has been (or is being) fired.
    Started,
}

impl GateState {
    fn from_bits(bits: u8) -> Self {
        if bits & STARTED != 0 {
            Self::Started
        } else if bits & BOTH_READY == 0 {
            Self::Idle
        } else {
            Self::WaitingForBoth {
                window: bits & WINDOW_READY != 0,
                archive: bits & ARCHIVE_READY != 0,
            }
        }
    }
}

/// One-shot gate over the window-ready and archive-ready conditions.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    bits: AtomicU8,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the window configuration has been supplied.
    ///
    /// Returns true the first time only.
    pub fn mark_window_ready(&self) -> bool {
        self.bits.fetch_or(WINDOW_READY, Ordering::SeqCst) & WINDOW_READY == 0
    }

    /// Record that the archive has been loaded and mounted.
    ///
    /// Returns true the first time only.
    pub fn mark_archive_ready(&self) -> bool {
        self.bits.fetch_or(ARCHIVE_READY, Ordering::SeqCst) & ARCHIVE_READY == 0
    }

    pub fn is_window_ready(&self) -> bool {
        self.bits.load(Ordering::SeqCst) & WINDOW_READY != 0
    }

    pub fn is_archive_ready(&self) -> bool {
        self.bits.load(Ordering::SeqCst) & ARCHIVE_READY != 0
    }

    pub fn is_started(&self) -> bool {
        self.bits.load(Ordering::SeqCst) & STARTED != 0
    }

    pub fn state(&self) -> GateState {
        GateState::from_bits(self.bits.load(Ordering::SeqCst))
    }

    /// Claim the start if both conditions hold and nobody has claimed it yet.
    ///
    /// Exactly one caller ever observes `true`, regardless of how many times
    /// or from how many threads this is invoked.
    pub fn try_start(&self) -> bool {
        loop {
            let current = self.bits.load(Ordering::SeqCst);
            if current & STARTED != 0 || current & BOTH_READY != BOTH_READY {
                return false;
            }
            match self.bits.compare_exchange(
                current,
                current | STARTED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(_) => continue, // a condition bit changed underneath us, retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_window_then_archive_starts_once() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), GateState::Idle);

        assert!(gate.mark_window_ready());
        assert!(!gate.try_start());
        assert_eq!(
            gate.state(),
            GateState::WaitingForBoth {
                window: true,
                archive: false
            }
        );

        assert!(gate.mark_archive_ready());
        assert!(gate.try_start());
        assert!(!gate.try_start());
        assert_eq!(gate.state(), GateState::Started);
    }

    #[test]
    fn test_archive_then_window_starts_once() {
        let gate = ReadinessGate::new();
        gate.mark_archive_ready();
        assert!(!gate.try_start());
        gate.mark_window_ready();
        assert!(gate.try_start());
        assert!(gate.is_started());
    }

    #[test]
    fn test_repeated_marks_report_only_first() {
        let gate = ReadinessGate::new();
        assert!(gate.mark_window_ready());
        assert!(!gate.mark_window_ready());
        assert!(gate.mark_archive_ready());
        assert!(!gate.mark_archive_ready());
        assert!(gate.try_start());

        // Redundant calls after the start change nothing.
        assert!(!gate.mark_window_ready());
        assert!(!gate.try_start());
        assert_eq!(gate.state(), GateState::Started);
    }

    #[test]
    fn test_concurrent_try_start_has_single_winner() {
        let gate = Arc::new(ReadinessGate::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for i in 0..8 {
            let gate = gate.clone();
            let winners = winners.clone();
            handles.push(thread::spawn(move || {
                if i % 2 == 0 {
                    gate.mark_window_ready();
                } else {
                    gate.mark_archive_ready();
                }
                for _ in 0..100 {
                    if gate.try_start() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(gate.is_started());
    }
}
