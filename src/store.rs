use crate::data::{
    AvailabilityId, Classroom, ClassroomId, Insertion, NewSchedule, NewSubject, NewTeacher,
    Period, PeriodId, Schedule, ScheduleId, ScheduleKey, SchoolDay, Subject, SubjectId, Teacher,
    TeacherAvailability, TeacherId, TimeWindow,
};
use crate::error::{Result, ScheduleError};
use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

/// On-disk form of the store: plain record arrays.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub availabilities: Vec<TeacherAvailability>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub periods: Vec<Period>,
    #[serde(default)]
    pub classrooms: Vec<Classroom>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

/// Record store holding every timetable entity.
///
/// Tables are keyed by id, so iteration is in id order. Two indexes are kept
/// next to the schedule table: the de-duplication key and the (week, day)
/// bucket used for double-booking checks. Both are derived and rebuilt on load.
#[derive(Debug, Default)]
pub struct EntityStore {
    teachers: BTreeMap<TeacherId, Teacher>,
    availabilities: BTreeMap<AvailabilityId, TeacherAvailability>,
    subjects: BTreeMap<SubjectId, Subject>,
    periods: BTreeMap<PeriodId, Period>,
    classrooms: BTreeMap<ClassroomId, Classroom>,
    schedules: BTreeMap<ScheduleId, Schedule>,
    schedule_keys: HashMap<ScheduleKey, ScheduleId>,
    day_slots: HashMap<(u32, SchoolDay), Vec<ScheduleId>>,
}

fn next_id<T>(table: &BTreeMap<u32, T>) -> u32 {
    table.keys().next_back().map_or(1, |id| id + 1)
}

fn claim_id<T>(table: &BTreeMap<u32, T>, kind: &str, id: u32) -> Result<()> {
    if id == 0 || table.contains_key(&id) {
        return Err(ScheduleError::Validation(format!(
            "{} id {} is zero or duplicated",
            kind, id
        )));
    }
    Ok(())
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- teachers ----

    pub fn add_teacher(&mut self, new: NewTeacher) -> Result<TeacherId> {
        if new.name.trim().is_empty() {
            return Err(ScheduleError::Validation("Teacher name must not be empty".into()));
        }
        let id = next_id(&self.teachers);
        self.teachers.insert(
            id,
            Teacher {
                id,
                name: new.name,
                email: new.email,
                priority: new.priority,
                busy_periods: HashSet::new(),
            },
        );
        Ok(id)
    }

    pub fn teacher(&self, id: TeacherId) -> Result<&Teacher> {
        self.teachers
            .get(&id)
            .ok_or_else(|| ScheduleError::not_found("Teacher", id))
    }

    pub fn teachers(&self) -> impl Iterator<Item = &Teacher> {
        self.teachers.values()
    }

    /// Marks `period` as a slot the teacher never teaches in.
    pub fn mark_busy(&mut self, teacher: TeacherId, period: PeriodId) -> Result<()> {
        self.period(period)?;
        self.teachers
            .get_mut(&teacher)
            .ok_or_else(|| ScheduleError::not_found("Teacher", teacher))?
            .busy_periods
            .insert(period);
        Ok(())
    }

    /// Returns whether the period was marked busy before.
    pub fn clear_busy(&mut self, teacher: TeacherId, period: PeriodId) -> Result<bool> {
        Ok(self
            .teachers
            .get_mut(&teacher)
            .ok_or_else(|| ScheduleError::not_found("Teacher", teacher))?
            .busy_periods
            .remove(&period))
    }

    /// Removes the teacher with their availabilities, subjects and the
    /// schedules of those subjects.
    pub fn remove_teacher(&mut self, id: TeacherId) -> Result<Teacher> {
        let teacher = self
            .teachers
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Teacher", id))?;
        self.availabilities.retain(|_, a| a.teacher != id);
        let owned: Vec<SubjectId> = self
            .subjects
            .values()
            .filter(|s| s.teacher == id)
            .map(|s| s.id)
            .collect();
        for subject in owned {
            self.remove_subject(subject)?;
        }
        debug!("Removed teacher {} ({})", id, teacher.name);
        Ok(teacher)
    }

    // ---- availabilities ----

    pub fn add_availability(
        &mut self,
        teacher: TeacherId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<AvailabilityId> {
        self.teacher(teacher)?;
        if end_date < start_date {
            return Err(ScheduleError::Validation(format!(
                "End date {} cannot be earlier than start date {}",
                end_date, start_date
            )));
        }
        let id = next_id(&self.availabilities);
        self.availabilities.insert(
            id,
            TeacherAvailability {
                id,
                teacher,
                start_date,
                end_date,
            },
        );
        Ok(id)
    }

    /// Availability ranges of one teacher, ordered by start date.
    pub fn availabilities_of(&self, teacher: TeacherId) -> Vec<&TeacherAvailability> {
        self.availabilities
            .values()
            .filter(|a| a.teacher == teacher)
            .sorted_by_key(|a| (a.start_date, a.id))
            .collect()
    }

    pub fn remove_availability(&mut self, id: AvailabilityId) -> Result<TeacherAvailability> {
        self.availabilities
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Availability", id))
    }

    // ---- subjects ----

    pub fn add_subject(&mut self, new: NewSubject) -> Result<SubjectId> {
        self.teacher(new.teacher)?;
        let id = next_id(&self.subjects);
        self.subjects.insert(
            id,
            Subject {
                id,
                name: new.name,
                grade: new.grade,
                total_hours: new.total_hours,
                remaining_hours: new.total_hours,
                teacher: new.teacher,
                priority: new.priority,
            },
        );
        Ok(id)
    }

    pub fn subject(&self, id: SubjectId) -> Result<&Subject> {
        self.subjects
            .get(&id)
            .ok_or_else(|| ScheduleError::not_found("Subject", id))
    }

    pub(crate) fn subject_mut(&mut self, id: SubjectId) -> Result<&mut Subject> {
        self.subjects
            .get_mut(&id)
            .ok_or_else(|| ScheduleError::not_found("Subject", id))
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.values()
    }

    pub fn remove_subject(&mut self, id: SubjectId) -> Result<Subject> {
        let subject = self
            .subjects
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Subject", id))?;
        let dropped = self.remove_schedules_where(|s| s.subject == id);
        debug!("Removed subject {} and {} schedule(s)", id, dropped);
        Ok(subject)
    }

    // ---- periods ----

    pub fn add_period(&mut self, day_of_week: u8, start_time: &str, end_time: &str) -> Result<PeriodId> {
        let day_of_week = SchoolDay::try_from(day_of_week)?;
        let window = TimeWindow::from_strs(start_time, end_time)?;
        let id = next_id(&self.periods);
        self.periods.insert(
            id,
            Period {
                id,
                day_of_week,
                window,
            },
        );
        Ok(id)
    }

    pub fn period(&self, id: PeriodId) -> Result<&Period> {
        self.periods
            .get(&id)
            .ok_or_else(|| ScheduleError::not_found("Period", id))
    }

    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.periods.values()
    }

    /// Periods held on `day`, earliest first.
    pub fn periods_on(&self, day: SchoolDay) -> Vec<&Period> {
        self.periods
            .values()
            .filter(|p| p.day_of_week == day)
            .sorted_by_key(|p| (p.window.start_time, p.id))
            .collect()
    }

    /// Removes the period, its schedules, and drops it from busy sets.
    pub fn remove_period(&mut self, id: PeriodId) -> Result<Period> {
        let period = self
            .periods
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Period", id))?;
        for teacher in self.teachers.values_mut() {
            teacher.busy_periods.remove(&id);
        }
        let dropped = self.remove_schedules_where(|s| s.period == Some(id));
        debug!("Removed period {} and {} schedule(s)", id, dropped);
        Ok(period)
    }

    // ---- classrooms ----

    pub fn add_classroom(
        &mut self,
        name: impl Into<String>,
        room_number: impl Into<String>,
        capacity: u32,
    ) -> Result<ClassroomId> {
        if capacity == 0 {
            return Err(ScheduleError::Validation(
                "Classroom capacity must be greater than zero".into(),
            ));
        }
        let id = next_id(&self.classrooms);
        self.classrooms.insert(
            id,
            Classroom {
                id,
                name: name.into(),
                room_number: room_number.into(),
                capacity,
            },
        );
        Ok(id)
    }

    pub fn classroom(&self, id: ClassroomId) -> Result<&Classroom> {
        self.classrooms
            .get(&id)
            .ok_or_else(|| ScheduleError::not_found("Classroom", id))
    }

    pub fn classrooms(&self) -> impl Iterator<Item = &Classroom> {
        self.classrooms.values()
    }

    pub fn remove_classroom(&mut self, id: ClassroomId) -> Result<Classroom> {
        let classroom = self
            .classrooms
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Classroom", id))?;
        let dropped = self.remove_schedules_where(|s| s.classroom == id);
        debug!("Removed classroom {} and {} schedule(s)", id, dropped);
        Ok(classroom)
    }

    // ---- schedules ----

    pub fn schedule(&self, id: ScheduleId) -> Result<&Schedule> {
        self.schedules
            .get(&id)
            .ok_or_else(|| ScheduleError::not_found("Schedule", id))
    }

    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.values()
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn find_schedule(&self, key: &ScheduleKey) -> Option<ScheduleId> {
        self.schedule_keys.get(key).copied()
    }

    /// Get-or-create for a schedule.
    ///
    /// An existing record with the same key is returned as
    /// [`Insertion::Existing`]. Otherwise references are resolved, the slot is
    /// checked against classroom and teacher double-booking, and the record is
    /// inserted. The check and the write happen under the same `&mut self`.
    pub fn insert_schedule(&mut self, new: NewSchedule) -> Result<Insertion> {
        if let Some(id) = self.find_schedule(&new.key()) {
            return Ok(Insertion::Existing(id));
        }
        self.validate_schedule(&new)?;
        self.check_slot_free(&new)?;

        let id = next_id(&self.schedules);
        self.index_schedule(Schedule {
            id,
            week: new.week,
            day: new.day,
            date: new.date,
            subject: new.subject,
            classroom: new.classroom,
            period: new.period,
            window: new.window,
        });
        Ok(Insertion::Created(id))
    }

    pub fn remove_schedule(&mut self, id: ScheduleId) -> Result<Schedule> {
        let schedule = self
            .schedules
            .remove(&id)
            .ok_or_else(|| ScheduleError::not_found("Schedule", id))?;
        self.unindex_schedule(&schedule);
        Ok(schedule)
    }

    fn validate_schedule(&self, new: &NewSchedule) -> Result<()> {
        if new.week == 0 {
            return Err(ScheduleError::Validation("Schedule week numbers start at 1".into()));
        }
        self.subject(new.subject)?;
        self.classroom(new.classroom)?;
        if let Some(period_id) = new.period {
            let period = self.period(period_id)?;
            if period.day_of_week != new.day || period.window != new.window {
                return Err(ScheduleError::Validation(format!(
                    "Schedule on {} {} does not match period {} ({})",
                    new.day, new.window, period_id, period
                )));
            }
        }
        if let Some(date) = new.date {
            if SchoolDay::from_date(date) != Some(new.day) {
                return Err(ScheduleError::Validation(format!(
                    "Date {} is not a {}",
                    date, new.day
                )));
            }
        }
        Ok(())
    }

    fn check_slot_free(&self, new: &NewSchedule) -> Result<()> {
        let teacher = self.subject(new.subject)?.teacher;
        let Some(ids) = self.day_slots.get(&(new.week, new.day)) else {
            return Ok(());
        };
        for other in ids.iter().filter_map(|id| self.schedules.get(id)) {
            if !other.window.overlaps(&new.window) {
                continue;
            }
            if other.classroom == new.classroom {
                return Err(ScheduleError::ClassroomOccupied {
                    classroom: new.classroom,
                    week: new.week,
                    day: new.day,
                    by: other.id,
                });
            }
            if self.subjects.get(&other.subject).map(|s| s.teacher) == Some(teacher) {
                return Err(ScheduleError::TeacherDoubleBooked {
                    teacher,
                    week: new.week,
                    day: new.day,
                    by: other.id,
                });
            }
        }
        Ok(())
    }

    fn index_schedule(&mut self, schedule: Schedule) {
        self.schedule_keys.insert(schedule.key(), schedule.id);
        self.day_slots
            .entry((schedule.week, schedule.day))
            .or_default()
            .push(schedule.id);
        self.schedules.insert(schedule.id, schedule);
    }

    fn unindex_schedule(&mut self, schedule: &Schedule) {
        self.schedule_keys.remove(&schedule.key());
        if let Some(ids) = self.day_slots.get_mut(&(schedule.week, schedule.day)) {
            ids.retain(|id| *id != schedule.id);
        }
    }

    fn remove_schedules_where(&mut self, pred: impl Fn(&Schedule) -> bool) -> usize {
        let doomed: Vec<ScheduleId> = self
            .schedules
            .values()
            .filter(|s| pred(*s))
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            if let Some(schedule) = self.schedules.remove(id) {
                self.unindex_schedule(&schedule);
            }
        }
        doomed.len()
    }

    // ---- persistence ----

    /// Rebuilds a store from a snapshot, re-checking every invariant.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut store = EntityStore::new();

        for period in snapshot.periods {
            claim_id(&store.periods, "Period", period.id)?;
            TimeWindow::new(period.window.start_time, period.window.end_time)?;
            store.periods.insert(period.id, period);
        }
        for teacher in snapshot.teachers {
            claim_id(&store.teachers, "Teacher", teacher.id)?;
            if let Some(missing) = teacher
                .busy_periods
                .iter()
                .find(|p| !store.periods.contains_key(*p))
            {
                return Err(ScheduleError::not_found("Period", *missing));
            }
            store.teachers.insert(teacher.id, teacher);
        }
        for availability in snapshot.availabilities {
            claim_id(&store.availabilities, "Availability", availability.id)?;
            store.teacher(availability.teacher)?;
            if availability.end_date < availability.start_date {
                return Err(ScheduleError::Validation(format!(
                    "Availability {} ends before it starts",
                    availability.id
                )));
            }
            store.availabilities.insert(availability.id, availability);
        }
        for subject in snapshot.subjects {
            claim_id(&store.subjects, "Subject", subject.id)?;
            store.teacher(subject.teacher)?;
            if subject.remaining_hours > subject.total_hours {
                return Err(ScheduleError::Validation(format!(
                    "Subject {} has more remaining hours than total hours",
                    subject.id
                )));
            }
            store.subjects.insert(subject.id, subject);
        }
        for classroom in snapshot.classrooms {
            claim_id(&store.classrooms, "Classroom", classroom.id)?;
            if classroom.capacity == 0 {
                return Err(ScheduleError::Validation(format!(
                    "Classroom {} has zero capacity",
                    classroom.id
                )));
            }
            store.classrooms.insert(classroom.id, classroom);
        }
        for schedule in snapshot.schedules {
            claim_id(&store.schedules, "Schedule", schedule.id)?;
            let new = NewSchedule {
                week: schedule.week,
                day: schedule.day,
                date: schedule.date,
                subject: schedule.subject,
                classroom: schedule.classroom,
                period: schedule.period,
                window: schedule.window,
            };
            if store.find_schedule(&new.key()).is_some() {
                return Err(ScheduleError::Validation(format!(
                    "Schedule {} duplicates an earlier record",
                    schedule.id
                )));
            }
            store.validate_schedule(&new)?;
            store.check_slot_free(&new)?;
            store.index_schedule(schedule);
        }
        Ok(store)
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            teachers: self.teachers.values().cloned().collect(),
            availabilities: self.availabilities.values().cloned().collect(),
            subjects: self.subjects.values().cloned().collect(),
            periods: self.periods.values().copied().collect(),
            classrooms: self.classrooms.values().cloned().collect(),
            schedules: self.schedules.values().cloned().collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let store = Self::from_snapshot(serde_json::from_str(&raw)?)?;
        info!(
            "Loaded {} teachers, {} subjects, {} classrooms, {} periods and {} schedules from '{}'",
            store.teachers.len(),
            store.subjects.len(),
            store.classrooms.len(),
            store.periods.len(),
            store.schedules.len(),
            path.display()
        );
        Ok(store)
    }

    /// Writes the snapshot to a sibling temp file, then renames it over `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!("Saved {} schedules to '{}'", self.schedules.len(), path.display());
        Ok(())
    }
}
