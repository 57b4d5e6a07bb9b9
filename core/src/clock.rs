//! Run clock: the only source of wall-clock time in the core.
//!
//! Timestamps never influence postings or results; they only stamp run
//! records. Tests pin the clock so run identities are reproducible.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

#[derive(Debug)]
pub enum Clock {
    System,
    /// Starts at the given instant and advances one microsecond per read, so
    /// consecutive runs still get distinct identities.
    Fixed(Mutex<DateTime<Utc>>),
}

impl Clock {
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Clock::Fixed(Mutex::new(at))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(cell) => {
                let mut guard = match cell.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let now = *guard;
                *guard = now + Duration::microseconds(1);
                now
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::System
    }
}
