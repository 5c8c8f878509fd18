//! Arms one-shot timers at upcoming schedule boundaries so rules flip on time.

use chrono::{DateTime, Duration, Local};

use crate::constants::{PLANNER_HORIZON_DAYS, TIMER_SCHEDULE_PREFIX};
use crate::models::BlockedItem;
use crate::timers::TimerRegistry;
use crate::timeutil::local_at;

/// A future instant at which some item's schedule window opens or closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub name: String,
    pub at: DateTime<Local>,
}

/// Every schedule boundary within the planning horizon that is still ahead of `now`.
pub fn plan(items: &[BlockedItem], now: DateTime<Local>) -> Vec<Boundary> {
    let mut boundaries = Vec::new();

    for item in items {
        let Some(schedule) = &item.schedule else {
            continue;
        };
        let Some((start, end)) = schedule.window() else {
            continue;
        };

        for offset in 0..PLANNER_HORIZON_DAYS {
            let date = now.date_naive() + Duration::days(i64::from(offset));
            if !schedule.applies_to(date) {
                continue;
            }

            if let Some(at) = local_at(date, start).filter(|at| *at > now) {
                boundaries.push(Boundary {
                    name: format!("{TIMER_SCHEDULE_PREFIX}start_{}_{offset}", item.id),
                    at,
                });
            }
            if let Some(at) = local_at(date, end).filter(|at| *at > now) {
                boundaries.push(Boundary {
                    name: format!("{TIMER_SCHEDULE_PREFIX}end_{}_{offset}", item.id),
                    at,
                });
            }
        }
    }

    boundaries
}

/// Replace every pending schedule timer with a fresh plan. Returns the number armed.
pub fn reschedule(timers: &mut TimerRegistry, items: &[BlockedItem], now: DateTime<Local>) -> usize {
    timers.cancel_prefix(TIMER_SCHEDULE_PREFIX);
    let boundaries = plan(items, now);
    let count = boundaries.len();
    for boundary in boundaries {
        timers.arm(boundary.name, boundary.at);
    }
    count
}
