use crate::availability::{check_date, is_teacher_available};
use crate::data::{
    parse_date, ClassroomId, FailedAttempt, GenerationReport, Insertion, NewSchedule, Period,
    SchoolDay, SubjectId, TeacherId, TimeWindow, WeekSpan,
};
use crate::error::{Result, ScheduleError};
use crate::hours::{consume, lesson_hours};
use crate::store::EntityStore;
use chrono::{Datelike, Days, NaiveDate};
use itertools::{iproduct, Itertools};
use log::{debug, info, trace, warn};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Fixed lesson window used when periods are not consulted.
pub const BASELINE_WINDOW: &str = "09:00-10:00";

/// Where the time slots of a school day come from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SlotSource {
    /// One slot per day at a fixed window, without a period reference.
    DefaultWindow(TimeWindow),
    /// Every configured period of that weekday.
    #[default]
    Periods,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub slots: SlotSource,
    /// Checked before each week; once set, generation stops.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl GenerateOptions {
    pub fn with_slots(slots: SlotSource) -> Self {
        GenerateOptions {
            slots,
            cancel: None,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    period: Option<Period>,
    window: TimeWindow,
}

/// The Monday on or after `date`.
pub fn first_monday(date: NaiveDate) -> NaiveDate {
    match date.weekday().num_days_from_monday() {
        0 => date,
        offset => date + Days::new(u64::from(7 - offset)),
    }
}

/// School weeks between `start` and `end`, numbered from 1.
///
/// The first week begins on the first Monday on or after `start`; the last
/// week is cut at `end`.
pub fn plan_weeks(start: NaiveDate, end: NaiveDate) -> Vec<WeekSpan> {
    let mut weeks = Vec::new();
    let mut monday = first_monday(start);
    let mut week = 1;
    while monday <= end {
        let friday = monday + Days::new(4);
        weeks.push(WeekSpan {
            week,
            monday,
            last_day: friday.min(end),
        });
        monday = monday + Days::new(7);
        week += 1;
    }
    weeks
}

/// Generates schedules for every school day between `start` and `end`
/// (`YYYY-MM-DD`).
///
/// Every (subject, classroom) pair is tried in every slot of every day. A pair
/// is skipped when its record already exists, when the teacher is unavailable,
/// when the subject has no hours left, or when the slot would double-book the
/// classroom or the teacher. Re-running over the same range creates nothing new.
pub fn generate_schedule(
    store: &mut EntityStore,
    start: &str,
    end: &str,
    options: &GenerateOptions,
) -> Result<GenerationReport> {
    let started = Instant::now();
    let start_date = parse_date(start)?;
    let end_date = parse_date(end)?;
    if start_date > end_date {
        return Err(ScheduleError::InvalidRange {
            start: start_date,
            end: end_date,
        });
    }

    let weeks = plan_weeks(start_date, end_date);
    let subjects = ordered_subjects(store);
    let classrooms: Vec<ClassroomId> = store.classrooms().map(|c| c.id).collect();
    info!(
        "Generating schedules for {} week(s) from {} to {} with {} subjects and {} classrooms...",
        weeks.len(),
        start_date,
        end_date,
        subjects.len(),
        classrooms.len()
    );

    let mut generator = Generator {
        store,
        report: GenerationReport::default(),
    };

    for span in weeks {
        if options.cancelled() {
            warn!("Generation interrupted before week {}", span.week);
            generator.report.interrupted = true;
            break;
        }
        info!("Processing Week {}: {}", span.week, span.monday);

        for date in span.monday.iter_days().take_while(|d| *d <= span.last_day) {
            let Some(day) = SchoolDay::from_date(date) else {
                continue;
            };
            for slot in slots_for(generator.store, &options.slots, day) {
                for (&(subject, teacher), &classroom) in iproduct!(&subjects, &classrooms) {
                    generator.attempt(span.week, date, day, slot, subject, teacher, classroom);
                }
            }
        }
        generator.report.weeks.push(span);
    }

    let report = generator.report;
    info!(
        "Schedule generation completed in {:.2?}: {} created, {} already existed, {} unavailable, {} out of hours, {} conflicts, {} failed",
        started.elapsed(),
        report.created.len(),
        report.existing,
        report.unavailable,
        report.exhausted,
        report.conflicts,
        report.failures.len()
    );
    Ok(report)
}

/// Subjects by their own priority (unset last), then their teacher's, then id.
fn ordered_subjects(store: &EntityStore) -> Vec<(SubjectId, TeacherId)> {
    store
        .subjects()
        .sorted_by_key(|s| {
            let teacher_priority = store.teacher(s.teacher).map_or(0, |t| t.priority);
            (Reverse(s.priority), Reverse(teacher_priority), s.id)
        })
        .map(|s| (s.id, s.teacher))
        .collect()
}

fn slots_for(store: &EntityStore, source: &SlotSource, day: SchoolDay) -> Vec<Slot> {
    match source {
        SlotSource::DefaultWindow(window) => vec![Slot {
            period: None,
            window: *window,
        }],
        SlotSource::Periods => store
            .periods_on(day)
            .into_iter()
            .map(|p| Slot {
                period: Some(*p),
                window: p.window,
            })
            .collect(),
    }
}

struct Generator<'a> {
    store: &'a mut EntityStore,
    report: GenerationReport,
}

impl Generator<'_> {
    #[allow(clippy::too_many_arguments)]
    fn attempt(
        &mut self,
        week: u32,
        date: NaiveDate,
        day: SchoolDay,
        slot: Slot,
        subject: SubjectId,
        teacher: TeacherId,
        classroom: ClassroomId,
    ) {
        let new = NewSchedule {
            week,
            day,
            date: Some(date),
            subject,
            classroom,
            period: slot.period.map(|p| p.id),
            window: slot.window,
        };

        if let Some(id) = self.store.find_schedule(&new.key()) {
            trace!("Schedule already exists: {}", id);
            self.report.existing += 1;
            return;
        }

        let available = match &slot.period {
            Some(period) => is_teacher_available(self.store, teacher, date, period),
            None => check_date(self.store, teacher, date),
        };
        match available {
            Ok(true) => {}
            Ok(false) => {
                trace!("Teacher {} unavailable on {} {}", teacher, date, slot.window);
                self.report.unavailable += 1;
                return;
            }
            Err(e) => return self.fail(&new, date, e),
        }

        let hours = lesson_hours(&slot.window);
        match self.store.subject(subject) {
            Ok(s) if s.remaining_hours < hours => {
                trace!("Subject {} has no hours left for {} {}", subject, date, slot.window);
                self.report.exhausted += 1;
                return;
            }
            Ok(_) => {}
            Err(e) => return self.fail(&new, date, e),
        }

        match self.store.insert_schedule(new) {
            Ok(Insertion::Created(id)) => {
                if let Err(e) = consume(self.store, subject, hours) {
                    warn!("Schedule {} created but hours were not charged: {}", id, e);
                }
                debug!(
                    "Created Schedule {}: subject {} in classroom {} on {} {}",
                    id, subject, classroom, date, slot.window
                );
                self.report.created.push(id);
            }
            Ok(Insertion::Existing(_)) => self.report.existing += 1,
            Err(e) if e.is_conflict() => {
                trace!("{}", e);
                self.report.conflicts += 1;
            }
            Err(e) => self.fail(&new, date, e),
        }
    }

    fn fail(&mut self, new: &NewSchedule, date: NaiveDate, error: ScheduleError) {
        warn!(
            "Skipping subject {} in classroom {} on {}: {}",
            new.subject, new.classroom, date, error
        );
        self.report.failures.push(FailedAttempt {
            week: new.week,
            date,
            subject: new.subject,
            classroom: new.classroom,
            reason: error.to_string(),
        });
    }
}
