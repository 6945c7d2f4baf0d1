use chrono::NaiveDate;

use crate::ledger::MarkStatus;

/// Single tap commits "attended" once the window lapses; a second tap inside
/// the window cancels the armed timer and commits "missed" immediately.
pub const TAP_WINDOW_MS: u64 = 250;

/// The cell a tap landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapKey {
    pub course_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapCommit {
    pub key: TapKey,
    pub status: MarkStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Press {
    /// Timer armed; the caller must report back at `deadline_ms`.
    Armed { deadline_ms: u64 },
    Commit(TapCommit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    key: TapKey,
    deadline_ms: u64,
}

/// Single-vs-double trigger disambiguation.
///
/// One pending slot serves the whole interaction surface, not one per cell:
/// a second tap inside the window commits "missed" for the *second* tap's
/// cell, whichever cell the armed timer belonged to. Time is supplied by the
/// caller in milliseconds, so the machine is deterministic and never touches
/// a clock.
///
/// States: idle -> pending (timer armed) -> idle, leaving via either
/// `press` (double, commits missed) or `elapsed` (timeout, commits attended).
#[derive(Debug, Default)]
pub struct TapResolver {
    pending: Option<Pending>,
}

impl TapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush an armed timer whose deadline has passed. Callers invoke this
    /// with the current time before `press` and whenever their timer fires.
    pub fn elapsed(&mut self, at_ms: u64) -> Option<TapCommit> {
        match &self.pending {
            Some(p) if at_ms >= p.deadline_ms => {
                let p = self.pending.take().expect("pending checked above");
                Some(TapCommit {
                    key: p.key,
                    status: MarkStatus::Attended,
                })
            }
            _ => None,
        }
    }

    /// Register a tap. Requires any lapsed timer to have been flushed via
    /// `elapsed` first, so a surviving pending entry is always in-window.
    pub fn press(&mut self, key: TapKey, at_ms: u64) -> Press {
        if self.pending.take().is_some() {
            return Press::Commit(TapCommit {
                key,
                status: MarkStatus::Missed,
            });
        }
        let deadline_ms = at_ms.saturating_add(TAP_WINDOW_MS);
        self.pending = Some(Pending { key, deadline_ms });
        Press::Armed { deadline_ms }
    }

    /// Drop any armed timer, e.g. when the calendar view is torn down.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
