use crate::data::{Period, Teacher, TeacherId};
use crate::error::Result;
use crate::store::EntityStore;
use chrono::NaiveDate;
use log::trace;

/// True iff one of the teacher's availability ranges covers `date`.
/// A teacher without ranges is never available.
pub fn check_date(store: &EntityStore, teacher: TeacherId, date: NaiveDate) -> Result<bool> {
    store.teacher(teacher)?;
    Ok(store
        .availabilities_of(teacher)
        .iter()
        .any(|range| range.covers(date)))
}

/// True iff `period` is not one of the teacher's busy periods.
pub fn check_period(teacher: &Teacher, period: &Period) -> bool {
    !teacher.busy_periods.contains(&period.id)
}

/// A teacher can be scheduled at `period` on `date` only if both the date
/// range and the busy-period checks pass.
pub fn is_teacher_available(
    store: &EntityStore,
    teacher: TeacherId,
    date: NaiveDate,
    period: &Period,
) -> Result<bool> {
    let date_ok = check_date(store, teacher, date)?;
    let period_ok = check_period(store.teacher(teacher)?, period);
    trace!(
        "Teacher {} on {} at {}: date {}, period {}",
        teacher, date, period, date_ok, period_ok
    );
    Ok(date_ok && period_ok)
}
