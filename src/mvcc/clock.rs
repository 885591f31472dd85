//! Transaction timestamps and the clocks that mint them.
//!
//! The coordinator never fabricates raw timestamp values; it only
//! delegates to a [`Clock`]. Two implementations are provided:
//!
//! - [`LogicalClock`] — a plain atomic counter. Zero uncertainty,
//!   consecutive issuance; the default for embedded use and tests.
//! - [`SystemClock`] — wall-clock microseconds made strictly monotone
//!   through an atomic high-water mark, with a configured symmetric
//!   error bound surfaced by `now_latest`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// ------------------------------------------------------------------------------------------------
// Timestamp
// ------------------------------------------------------------------------------------------------

/// Opaque, totally-ordered 64-bit transaction timestamp.
///
/// Values are minted by a [`Clock`]; [`Timestamp::INVALID`] is the
/// distinguished sentinel returned when a clock cannot produce a
/// usable reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Smallest possible timestamp; below every value a clock issues.
    pub const MIN: Timestamp = Timestamp(0);

    /// Sentinel for "no usable timestamp".
    pub const INVALID: Timestamp = Timestamp(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Timestamp(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next timestamp in the total order.
    pub(crate) fn successor(self) -> Timestamp {
        debug_assert!(self != Timestamp::INVALID);
        Timestamp(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Timestamp::INVALID {
            write!(f, "invalid")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Clock contract
// ------------------------------------------------------------------------------------------------

/// Source of transaction timestamps.
///
/// Implementations are shared across every thread touching the
/// coordinator, so all methods take `&self`.
pub trait Clock: Send + Sync {
    /// Current time. **Strictly monotone**: every call returns a value
    /// greater than any previously issued one, across all callers.
    fn now(&self) -> Timestamp;

    /// Latest possible current time — `now` plus the clock's maximum
    /// error. `None` when the clock cannot bound its uncertainty.
    fn now_latest(&self) -> Option<Timestamp>;

    /// Whether `ts` is no longer inside the clock's uncertainty
    /// window, i.e. guaranteed not to be issued again.
    fn is_past(&self, ts: Timestamp) -> bool;
}

// ------------------------------------------------------------------------------------------------
// LogicalClock
// ------------------------------------------------------------------------------------------------

/// Strictly monotone counter clock with no uncertainty.
pub struct LogicalClock {
    next: AtomicU64,
}

impl LogicalClock {
    /// Create a clock whose first `now()` returns `initial`
    /// (raised to 1 so [`Timestamp::MIN`] is never issued).
    pub fn new(initial: u64) -> Self {
        Self {
            next: AtomicU64::new(initial.max(1)),
        }
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn now_latest(&self) -> Option<Timestamp> {
        // No uncertainty: the latest possible time is a fresh reading.
        Some(self.now())
    }

    fn is_past(&self, ts: Timestamp) -> bool {
        ts.value() < self.next.load(Ordering::SeqCst)
    }
}

// ------------------------------------------------------------------------------------------------
// SystemClock
// ------------------------------------------------------------------------------------------------

/// Wall-clock microseconds with enforced strict monotonicity.
///
/// Readings below the previously issued value (NTP steps, coarse
/// clocks) are bumped past the high-water mark, so `now()` never
/// repeats or regresses. `now_latest` adds the configured maximum
/// error; `is_past` compares against the monotone horizon, so any
/// issued timestamp is immediately past.
pub struct SystemClock {
    last: AtomicU64,
    max_error_us: u64,
}

impl SystemClock {
    pub fn new(max_error_us: u64) -> Self {
        Self {
            last: AtomicU64::new(0),
            max_error_us,
        }
    }

    fn wall_micros() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_micros() as u64
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        loop {
            let wall = Self::wall_micros();
            let last = self.last.load(Ordering::SeqCst);
            let next = wall.max(last + 1);
            if self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Timestamp(next);
            }
        }
    }

    fn now_latest(&self) -> Option<Timestamp> {
        Some(Timestamp(self.now().value() + self.max_error_us))
    }

    fn is_past(&self, ts: Timestamp) -> bool {
        let horizon = Self::wall_micros().max(self.last.load(Ordering::SeqCst));
        ts.value() <= horizon
    }
}
