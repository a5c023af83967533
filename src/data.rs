use crate::error::{Result, ScheduleError};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// Type aliases for clarity
pub type TeacherId = u32;
pub type AvailabilityId = u32;
pub type SubjectId = u32;
pub type PeriodId = u32;
pub type ClassroomId = u32;
pub type ScheduleId = u32;

const DEFAULT_GRADE: &str = "D1 анги";
const DEFAULT_TOTAL_HOURS: u32 = 33;

/// A teaching day. Weekends are not representable.
///
/// Serialized as its index, 0 = Monday through 4 = Friday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SchoolDay {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
}

impl SchoolDay {
    pub const ALL: [SchoolDay; 5] = [
        SchoolDay::Monday,
        SchoolDay::Tuesday,
        SchoolDay::Wednesday,
        SchoolDay::Thursday,
        SchoolDay::Friday,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The school day a calendar date falls on, `None` on weekends.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        u8::try_from(date.weekday().num_days_from_monday())
            .ok()
            .and_then(Self::from_index)
    }

    pub fn name(self) -> &'static str {
        match self {
            SchoolDay::Monday => "Monday",
            SchoolDay::Tuesday => "Tuesday",
            SchoolDay::Wednesday => "Wednesday",
            SchoolDay::Thursday => "Thursday",
            SchoolDay::Friday => "Friday",
        }
    }
}

impl TryFrom<u8> for SchoolDay {
    type Error = ScheduleError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_index(value).ok_or_else(|| {
            ScheduleError::Validation(format!(
                "Periods can only be created for Monday to Friday (day_of_week 0-4), got {}",
                value
            ))
        })
    }
}

impl From<SchoolDay> for u8 {
    fn from(day: SchoolDay) -> u8 {
        day.index()
    }
}

impl FromStr for SchoolDay {
    type Err = ScheduleError;

    /// Accepts either the index or the English day name.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(index) = s.parse::<u8>() {
            return SchoolDay::try_from(index);
        }
        SchoolDay::ALL
            .into_iter()
            .find(|day| day.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScheduleError::InvalidInput(format!("'{}' is not a school day", s)))
    }
}

impl fmt::Display for SchoolDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
        ScheduleError::InvalidInput(format!("'{}' is not a YYYY-MM-DD date: {}", s, e))
    })
}

/// Parses a wall-clock `HH:MM` time.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| ScheduleError::InvalidInput(format!("'{}' is not an HH:MM time: {}", s, e)))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// A wall-clock interval [start, end) within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl TimeWindow {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Result<Self> {
        if end_time <= start_time {
            return Err(ScheduleError::Validation(format!(
                "End time {} must be after start time {}",
                end_time.format("%H:%M"),
                start_time.format("%H:%M")
            )));
        }
        Ok(TimeWindow {
            start_time,
            end_time,
        })
    }

    pub fn from_strs(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Parses `HH:MM-HH:MM`.
    pub fn parse(s: &str) -> Result<Self> {
        let (start, end) = s.split_once('-').ok_or_else(|| {
            ScheduleError::InvalidInput(format!("'{}' is not an HH:MM-HH:MM window", s))
        })?;
        Self::from_strs(start, end)
    }

    pub fn minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Periods in which the teacher never teaches, whatever the date.
    #[serde(default)]
    pub busy_periods: HashSet<PeriodId>,
}

impl fmt::Display for Teacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An inclusive calendar interval in which a teacher can be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAvailability {
    pub id: AvailabilityId,
    pub teacher: TeacherId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TeacherAvailability {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub grade: String,
    pub total_hours: u32,
    pub remaining_hours: u32,
    pub teacher: TeacherId,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A recurring weekly time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: PeriodId,
    pub day_of_week: SchoolDay,
    #[serde(flatten)]
    pub window: TimeWindow,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {}",
            self.day_of_week,
            self.window.start_time.format("%H:%M"),
            self.window.end_time.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: ClassroomId,
    pub name: String,
    pub room_number: String,
    pub capacity: u32,
}

impl fmt::Display for Classroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.room_number)
    }
}

/// One concrete occupied slot of the timetable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: ScheduleId,
    pub week: u32,
    pub day: SchoolDay,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub subject: SubjectId,
    pub classroom: ClassroomId,
    #[serde(default)]
    pub period: Option<PeriodId>,
    #[serde(flatten)]
    pub window: TimeWindow,
}

impl Schedule {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            week: self.week,
            subject: self.subject,
            classroom: self.classroom,
            day: self.day,
            period: self.period,
            window: self.window,
        }
    }
}

/// De-duplication key of a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub week: u32,
    pub subject: SubjectId,
    pub classroom: ClassroomId,
    pub day: SchoolDay,
    pub period: Option<PeriodId>,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

impl NewTeacher {
    pub fn named(name: impl Into<String>) -> Self {
        NewTeacher {
            name: name.into(),
            email: None,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
    #[serde(default = "default_grade")]
    pub grade: String,
    #[serde(default = "default_total_hours")]
    pub total_hours: u32,
    pub teacher: TeacherId,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl NewSubject {
    pub fn new(name: impl Into<String>, teacher: TeacherId, total_hours: u32) -> Self {
        NewSubject {
            name: name.into(),
            grade: default_grade(),
            total_hours,
            teacher,
            priority: None,
        }
    }
}

fn default_grade() -> String {
    DEFAULT_GRADE.to_string()
}

fn default_total_hours() -> u32 {
    DEFAULT_TOTAL_HOURS
}

/// Input for a schedule insertion; the store assigns the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSchedule {
    pub week: u32,
    pub day: SchoolDay,
    pub date: Option<NaiveDate>,
    pub subject: SubjectId,
    pub classroom: ClassroomId,
    pub period: Option<PeriodId>,
    pub window: TimeWindow,
}

impl NewSchedule {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            week: self.week,
            subject: self.subject,
            classroom: self.classroom,
            day: self.day,
            period: self.period,
            window: self.window,
        }
    }
}

/// Result of a conditional schedule insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Created(ScheduleId),
    Existing(ScheduleId),
}

/// One generated school week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSpan {
    pub week: u32,
    pub monday: NaiveDate,
    pub last_day: NaiveDate,
}

/// An attempted assignment that failed for a reason other than the
/// expected skips (existing, unavailable, exhausted, conflict).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttempt {
    pub week: u32,
    pub date: NaiveDate,
    pub subject: SubjectId,
    pub classroom: ClassroomId,
    pub reason: String,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[week {} {}] subject {} in classroom {}: {}",
            self.week, self.date, self.subject, self.classroom, self.reason
        )
    }
}

/// The final output of a generation run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub weeks: Vec<WeekSpan>,
    pub created: Vec<ScheduleId>,
    pub existing: usize,
    pub unavailable: usize,
    pub exhausted: usize,
    pub conflicts: usize,
    pub failures: Vec<FailedAttempt>,
    pub interrupted: bool,
}

impl GenerationReport {
    pub fn skipped(&self) -> usize {
        self.existing + self.unavailable + self.exhausted + self.conflicts + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_day_from_weekend_date_is_none() {
        // 2024-01-06 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(SchoolDay::from_date(saturday), None);
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(SchoolDay::from_date(monday), Some(SchoolDay::Monday));
    }

    #[test]
    fn school_day_rejects_out_of_range_index() {
        assert!(matches!(
            SchoolDay::try_from(5u8),
            Err(ScheduleError::Validation(_))
        ));
        assert_eq!("friday".parse::<SchoolDay>().unwrap(), SchoolDay::Friday);
        assert_eq!("2".parse::<SchoolDay>().unwrap(), SchoolDay::Wednesday);
        assert!(serde_json::from_str::<SchoolDay>("6").is_err());
    }

    #[test]
    fn parse_date_rejects_invalid_month() {
        assert!(matches!(
            parse_date("2024-13-01"),
            Err(ScheduleError::InvalidInput(_))
        ));
        assert_eq!(
            parse_date("2024-01-03").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
        );
    }

    #[test]
    fn time_window_validation_and_overlap() {
        assert!(matches!(
            TimeWindow::from_strs("10:00", "09:00"),
            Err(ScheduleError::Validation(_))
        ));
        assert!(matches!(
            TimeWindow::parse("0900-1000"),
            Err(ScheduleError::InvalidInput(_))
        ));

        let first = TimeWindow::parse("08:00-08:40").unwrap();
        let second = TimeWindow::parse("08:40-09:20").unwrap();
        let long = TimeWindow::parse("08:30-10:00").unwrap();
        assert!(!first.overlaps(&second));
        assert!(first.overlaps(&long));
        assert!(second.overlaps(&long));
        assert_eq!(first.minutes(), 40);
        assert_eq!(first.to_string(), "08:00-08:40");
    }

    #[test]
    fn period_serializes_with_integer_day_and_hhmm_times() {
        let period = Period {
            id: 3,
            day_of_week: SchoolDay::Tuesday,
            window: TimeWindow::parse("08:00-08:40").unwrap(),
        };
        let json = serde_json::to_value(period).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 3, "dayOfWeek": 1, "startTime": "08:00", "endTime": "08:40"})
        );
        assert_eq!(period.to_string(), "Tuesday: 08:00 - 08:40");
    }
}
