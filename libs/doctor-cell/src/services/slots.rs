// libs/doctor-cell/src/services/slots.rs
use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::models::{TimeOfDay, MINUTES_PER_DAY};

/// Slot start times `start, start+d, start+2d, ...` for every slot that ends
/// at or before `end`. A trailing remainder shorter than `duration_minutes`
/// is dropped. Empty when `end <= start` or the duration is not positive
/// or longer than a day.
pub fn generate_slot_grid(start: TimeOfDay, end: TimeOfDay, duration_minutes: i64) -> Vec<TimeOfDay> {
    let step = match u32::try_from(duration_minutes) {
        Ok(step) if step > 0 && step <= MINUTES_PER_DAY => step,
        _ => return Vec::new(),
    };
    if end <= start {
        return Vec::new();
    }

    let end = end.minutes();

    (start.minutes()..)
        .step_by(step as usize)
        .take_while(|&t| t + step <= end)
        .filter_map(TimeOfDay::from_minutes)
        .collect()
}

/// First bookable minute for "today": the current local time rounded up to
/// the next multiple of the slot duration.
pub fn today_cutoff(now: NaiveDateTime, duration_minutes: u32) -> u32 {
    let step = duration_minutes.max(1);
    let now_minutes = now.hour() * 60 + now.minute();
    now_minutes.div_ceil(step) * step
}

/// Drops slots already in the past when `date` is the current local date.
/// Other dates pass through untouched; ledger state is never consulted.
pub fn prune_past_slots(
    times: Vec<TimeOfDay>,
    date: NaiveDate,
    now: NaiveDateTime,
    duration_minutes: u32,
) -> Vec<TimeOfDay> {
    if date != now.date() {
        return times;
    }

    let cutoff = today_cutoff(now, duration_minutes).min(MINUTES_PER_DAY);
    times.into_iter().filter(|t| t.minutes() >= cutoff).collect()
}
