//! Read-only projections of the generated timetable.

use crate::data::{
    ClassroomId, Schedule, ScheduleId, SchoolDay, SubjectId, TeacherId, TimeWindow,
};
use crate::error::Result;
use crate::store::EntityStore;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Equality/range filter over schedules. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFilter {
    pub week: Option<u32>,
    pub day: Option<SchoolDay>,
    pub classroom: Option<ClassroomId>,
    pub subject: Option<SubjectId>,
    pub teacher: Option<TeacherId>,
    /// Inclusive lower date bound; undated schedules never match a bound.
    pub from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub to: Option<NaiveDate>,
}

impl ScheduleFilter {
    fn matches(&self, store: &EntityStore, schedule: &Schedule) -> bool {
        fn eq<T: PartialEq>(wanted: Option<T>, actual: T) -> bool {
            wanted.is_none_or(|w| w == actual)
        }

        let dated = |bound: Option<NaiveDate>, inside: fn(NaiveDate, NaiveDate) -> bool| match bound {
            None => true,
            Some(bound) => schedule.date.is_some_and(|d| inside(d, bound)),
        };

        eq(self.week, schedule.week)
            && eq(self.day, schedule.day)
            && eq(self.classroom, schedule.classroom)
            && eq(self.subject, schedule.subject)
            && self.teacher.is_none_or(|t| {
                store
                    .subject(schedule.subject)
                    .is_ok_and(|s| s.teacher == t)
            })
            && dated(self.from, |d, from| d >= from)
            && dated(self.to, |d, to| d <= to)
    }
}

/// Schedules matching `filter`, in timetable order: week, day, start time,
/// classroom, subject.
pub fn list_schedules<'a>(store: &'a EntityStore, filter: &ScheduleFilter) -> Vec<&'a Schedule> {
    store
        .schedules()
        .filter(|s| filter.matches(store, s))
        .sorted_by_key(|s| {
            (
                s.week,
                s.day,
                s.window.start_time,
                s.classroom,
                s.subject,
                s.id,
            )
        })
        .collect()
}

/// A schedule row with its references resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub week: u32,
    pub day: SchoolDay,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub window: TimeWindow,
    pub classroom: String,
    pub room_number: String,
    pub subject: String,
    pub grade: String,
    pub teacher: String,
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {} {}, {}",
            self.classroom, self.subject, self.day, self.window, self.teacher
        )
    }
}

pub fn schedule_entries(store: &EntityStore, filter: &ScheduleFilter) -> Result<Vec<ScheduleEntry>> {
    list_schedules(store, filter)
        .into_iter()
        .map(|schedule| {
            let subject = store.subject(schedule.subject)?;
            let classroom = store.classroom(schedule.classroom)?;
            let teacher = store.teacher(subject.teacher)?;
            Ok(ScheduleEntry {
                id: schedule.id,
                week: schedule.week,
                day: schedule.day,
                date: schedule.date,
                window: schedule.window,
                classroom: classroom.name.clone(),
                room_number: classroom.room_number.clone(),
                subject: subject.name.clone(),
                grade: subject.grade.clone(),
                teacher: teacher.name.clone(),
            })
        })
        .collect()
}

/// Groups entries by week, keeping their order inside each week.
pub fn timetable_by_week(entries: Vec<ScheduleEntry>) -> BTreeMap<u32, Vec<ScheduleEntry>> {
    entries
        .into_iter()
        .into_group_map_by(|e| e.week)
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NewSubject, NewTeacher};
    use crate::scheduler::{generate_schedule, GenerateOptions, SlotSource, BASELINE_WINDOW};
    use crate::store::tests::{date, small_school};

    fn generated() -> (EntityStore, TeacherId, TeacherId) {
        let (mut store, first, ..) = small_school();
        let second = store.add_teacher(NewTeacher::named("Ganaa")).unwrap();
        store
            .add_availability(second, date("2024-01-01"), date("2024-01-31"))
            .unwrap();
        store
            .add_subject(NewSubject::new("Chemistry", second, 33))
            .unwrap();
        store.add_classroom("Lab", "102", 25).unwrap();
        let options = GenerateOptions::with_slots(SlotSource::DefaultWindow(
            TimeWindow::parse(BASELINE_WINDOW).unwrap(),
        ));
        generate_schedule(&mut store, "2024-01-08", "2024-01-19", &options).unwrap();
        (store, first, second)
    }

    #[test]
    fn listing_is_in_timetable_order() {
        let (store, ..) = generated();
        let all = list_schedules(&store, &ScheduleFilter::default());
        assert_eq!(all.len(), 20);
        assert!(all
            .iter()
            .tuple_windows()
            .all(|(a, b)| (a.week, a.day, a.classroom) <= (b.week, b.day, b.classroom)));
    }

    #[test]
    fn filters_combine() {
        let (store, _, second) = generated();
        let filter = ScheduleFilter {
            week: Some(2),
            teacher: Some(second),
            ..Default::default()
        };
        let rows = list_schedules(&store, &filter);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|s| s.week == 2));

        let wednesdays = ScheduleFilter {
            day: Some(SchoolDay::Wednesday),
            from: Some(date("2024-01-10")),
            to: Some(date("2024-01-10")),
            ..Default::default()
        };
        assert_eq!(list_schedules(&store, &wednesdays).len(), 2);
    }

    #[test]
    fn entries_render_like_the_listing_page() {
        let (store, first, _) = generated();
        let filter = ScheduleFilter {
            teacher: Some(first),
            day: Some(SchoolDay::Monday),
            week: Some(1),
            ..Default::default()
        };
        let entries = schedule_entries(&store, &filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].to_string(),
            "Main: Mathematics - Monday 09:00-10:00, Bat"
        );
    }

    #[test]
    fn entries_group_by_week() {
        let (store, ..) = generated();
        let entries = schedule_entries(&store, &ScheduleFilter::default()).unwrap();
        let weeks = timetable_by_week(entries);
        assert_eq!(weeks.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(weeks.values().all(|rows| rows.len() == 10));
    }

    #[test]
    fn filter_deserializes_from_query_string_shape() {
        let filter: ScheduleFilter =
            serde_json::from_value(serde_json::json!({"week": 1, "day": 4, "from": "2024-01-08"}))
                .unwrap();
        assert_eq!(filter.day, Some(SchoolDay::Friday));
        assert_eq!(filter.from, Some(date("2024-01-08")));
    }
}
