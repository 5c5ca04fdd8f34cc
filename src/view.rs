//! Derived views over the active and done lists.
//!
//! Nothing here holds state; every screen is recomputed from the current
//! collections, the filter settings and the evaluation instant.

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use std::str::FromStr;

use crate::models::{ParseEnumError, Priority, Status, Task};

/// Weekdays in board order.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityFilter {
    #[default]
    All,
    Is(Priority),
}

impl PriorityFilter {
    pub fn matches(self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Is(p) => p == priority,
        }
    }
}

impl FromStr for PriorityFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(PriorityFilter::All);
        }
        s.parse().map(PriorityFilter::Is)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Is(Status),
}

impl StatusFilter {
    pub fn matches(self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Is(s) => s == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse().map(StatusFilter::Is)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    #[default]
    All,
    Today,
    ThisWeek,
    /// Hide every active task; the done list is unaffected.
    Completed,
}

impl FromStr for DateFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(DateFilter::All),
            "today" => Ok(DateFilter::Today),
            "this-week" | "thisweek" | "week" => Ok(DateFilter::ThisWeek),
            "completed" => Ok(DateFilter::Completed),
            _ => Err(ParseEnumError::new("date filter", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterConfig {
    pub search: String,
    pub priority: PriorityFilter,
    pub status: StatusFilter,
    pub date: DateFilter,
}

/// Which list a filter pass runs over. The done list ignores the status
/// dimension and the `Completed` date filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Active,
    Done,
}

/// Case-insensitive substring match on title or description.
pub fn matches_search(task: &Task, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query_lower = query.to_lowercase();
    task.title.to_lowercase().contains(&query_lower)
        || task.description.to_lowercase().contains(&query_lower)
}

/// Monday 00:00:00.000 through Sunday 23:59:59.999 of the week containing `now`.
pub fn this_week_bounds(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let today = now.date();
    let monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    let start = monday.and_time(NaiveTime::MIN);
    let end = start + TimeDelta::days(7) - TimeDelta::milliseconds(1);
    (start, end)
}

fn matches_date(task: &Task, filter: DateFilter, kind: ListKind, now: NaiveDateTime) -> bool {
    match filter {
        DateFilter::All => true,
        DateFilter::Today => task.date.is_some_and(|d| d.date() == now.date()),
        DateFilter::ThisWeek => {
            let (start, end) = this_week_bounds(now);
            task.date.is_some_and(|d| d >= start && d <= end)
        }
        DateFilter::Completed => kind == ListKind::Done,
    }
}

/// The tasks of `tasks` that pass every dimension of `config`, in order.
pub fn apply_filters<'a>(
    tasks: &'a [Task],
    config: &FilterConfig,
    kind: ListKind,
    now: NaiveDateTime,
) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| matches_search(t, &config.search))
        .filter(|t| config.priority.matches(t.priority))
        .filter(|t| kind == ListKind::Done || config.status.matches(t.status))
        .filter(|t| matches_date(t, config.date, kind, now))
        .collect()
}

/// Scheduled tasks grouped by the weekday of their date, Monday first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekBuckets<'a> {
    days: [Vec<&'a Task>; 7],
}

impl<'a> WeekBuckets<'a> {
    pub fn get(&self, day: Weekday) -> &[&'a Task] {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &[&'a Task])> {
        WEEK.iter().map(move |day| (*day, self.get(*day)))
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bucket tasks by weekday. Tasks without a date land in no bucket.
pub fn bucket_by_weekday<'a, I>(tasks: I) -> WeekBuckets<'a>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut buckets = WeekBuckets::default();
    for task in tasks {
        if let Some(date) = task.date {
            buckets.days[date.weekday().num_days_from_monday() as usize].push(task);
        }
    }
    buckets
}

pub fn unscheduled<'a, I>(tasks: I) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks.into_iter().filter(|t| t.date.is_none()).collect()
}

/// Everything the task screen shows at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Board<'a> {
    pub active: Vec<&'a Task>,
    pub done: Vec<&'a Task>,
    pub week: WeekBuckets<'a>,
    pub unscheduled: Vec<&'a Task>,
}

/// Filter both lists, then lay the filtered active tasks out by weekday.
pub fn project<'a>(
    active: &'a [Task],
    done: &'a [Task],
    config: &FilterConfig,
    now: NaiveDateTime,
) -> Board<'a> {
    let active = apply_filters(active, config, ListKind::Active, now);
    let done = apply_filters(done, config, ListKind::Done, now);
    let week = bucket_by_weekday(active.iter().copied());
    let unscheduled = unscheduled(active.iter().copied());
    Board {
        active,
        done,
        week,
        unscheduled,
    }
}
