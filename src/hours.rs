use crate::data::{SubjectId, TimeWindow};
use crate::error::{Result, ScheduleError};
use crate::store::EntityStore;
use log::debug;

/// Teaching hours charged for one slot: duration rounded up to whole hours,
/// never less than one.
pub fn lesson_hours(window: &TimeWindow) -> u32 {
    let minutes = window.minutes().max(1);
    u32::try_from((minutes + 59) / 60).unwrap_or(u32::MAX).max(1)
}

/// Charges `hours` to the subject's remaining budget and returns what is left.
/// The budget is left untouched when it cannot cover the request.
pub fn consume(store: &mut EntityStore, subject: SubjectId, hours: u32) -> Result<u32> {
    let record = store.subject_mut(subject)?;
    let remaining = record
        .remaining_hours
        .checked_sub(hours)
        .ok_or(ScheduleError::InsufficientHours {
            subject,
            requested: hours,
            remaining: record.remaining_hours,
        })?;
    record.remaining_hours = remaining;
    debug!(
        "Subject {} ({}) consumed {}h, {}h of {}h left",
        subject, record.name, hours, remaining, record.total_hours
    );
    Ok(remaining)
}

/// Re-arms the subject's budget to its total hours.
pub fn reset(store: &mut EntityStore, subject: SubjectId) -> Result<u32> {
    let record = store.subject_mut(subject)?;
    record.remaining_hours = record.total_hours;
    Ok(record.remaining_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::small_school;

    #[test]
    fn lesson_hours_round_up() {
        assert_eq!(lesson_hours(&TimeWindow::parse("08:00-08:40").unwrap()), 1);
        assert_eq!(lesson_hours(&TimeWindow::parse("09:00-10:00").unwrap()), 1);
        assert_eq!(lesson_hours(&TimeWindow::parse("09:00-10:30").unwrap()), 2);
    }

    #[test]
    fn consume_never_goes_below_zero() {
        let (mut store, _, subject, ..) = small_school();
        assert_eq!(consume(&mut store, subject, 30).unwrap(), 3);

        let err = consume(&mut store, subject, 4).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InsufficientHours {
                requested: 4,
                remaining: 3,
                ..
            }
        ));
        assert_eq!(store.subject(subject).unwrap().remaining_hours, 3);

        assert_eq!(consume(&mut store, subject, 3).unwrap(), 0);
        assert!(consume(&mut store, subject, 1).is_err());
    }

    #[test]
    fn reset_restores_total() {
        let (mut store, _, subject, ..) = small_school();
        consume(&mut store, subject, 10).unwrap();
        assert_eq!(reset(&mut store, subject).unwrap(), 33);
    }
}
