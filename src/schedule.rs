//! Rotation of expensive work across scheduled invocations.
//!
//! Wall-clock time is cut into 10-minute windows; each window maps to one
//! slot: a category, the media slot (YouTube and blog feeds) or the custom
//! sections slot. With N categories the cycle is `(N + 2) * 10` minutes.
//! Nothing is persisted, so a missed invocation simply skips its slot.

use chrono::{DateTime, Utc};
use std::fmt;

/// Length of one rotation window.
pub const SLOT_MINUTES: i64 = 10;

/// One unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the configured categories.
    Category(usize),
    /// YouTube videos and blog feed.
    Media,
    /// Custom section collection pages.
    CustomArticles,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Category(i) => write!(f, "category #{i}"),
            Slot::Media => f.write_str("youtube+blog"),
            Slot::CustomArticles => f.write_str("custom-articles"),
        }
    }
}

/// Number of slots in a cycle for `categories` categories.
pub fn total_slots(categories: usize) -> usize {
    categories + 2
}

/// Slot index for a moment: `floor(epoch_minutes / 10) mod total`.
pub fn slot_index(now: DateTime<Utc>, total: usize) -> usize {
    let total = total.max(1) as i64;
    let window = now.timestamp().div_euclid(60).div_euclid(SLOT_MINUTES);
    window.rem_euclid(total) as usize
}

/// The slot to run at `now`.
pub fn slot_for(now: DateTime<Utc>, categories: usize) -> Slot {
    match slot_index(now, total_slots(categories)) {
        i if i < categories => Slot::Category(i),
        i if i == categories => Slot::Media,
        _ => Slot::CustomArticles,
    }
}

/// Every slot of a cycle, in order. Used by full runs.
pub fn all_slots(categories: usize) -> Vec<Slot> {
    (0..categories)
        .map(Slot::Category)
        .chain([Slot::Media, Slot::CustomArticles])
        .collect()
}
