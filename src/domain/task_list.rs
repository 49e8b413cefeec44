//! Pure projections over a user's task collection: the per-day list, its ordering,
//! dashboard figures and time summaries. Nothing here touches a driven port.

use crate::domain::TaskId;
use crate::domain::task::Task;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Utc};
use std::cmp::Ordering;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    /// Seconds across every task
    pub time_spent: i64,
    /// Incomplete tasks due on the reference day
    pub due_today: usize,
}

/// Labeled sum of time spent, used by the weekly and monthly summaries
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TimeBucket {
    pub label: String,
    pub total_seconds: i64,
}

/// The calendar day a timestamp falls on for a viewer at the given UTC offset
pub fn calendar_day(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}

pub fn same_calendar_day(timestamp: DateTime<Utc>, day: NaiveDate, offset: FixedOffset) -> bool {
    calendar_day(timestamp, offset) == day
}

fn display_ordering(a: &Task, b: &Task) -> Ordering {
    a.is_completed
        .cmp(&b.is_completed)
        .then_with(|| match (a.display_order, b.display_order) {
            (Some(a_order), Some(b_order)) => a_order.cmp(&b_order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.title.cmp(&b.title))
}

/// Incomplete tasks first, then tasks the user explicitly ordered, then alphabetically by title
pub fn sort_for_display(tasks: &mut [Task]) {
    tasks.sort_by(display_ordering);
}

/// Tasks due on `day` (as seen from `offset`), sorted for display
pub fn tasks_for_day(tasks: Vec<Task>, day: NaiveDate, offset: FixedOffset) -> Vec<Task> {
    let mut day_tasks: Vec<Task> = tasks
        .into_iter()
        .filter(|task| same_calendar_day(task.due_date, day, offset))
        .collect();
    sort_for_display(&mut day_tasks);

    day_tasks
}

/// Incomplete tasks due on an earlier calendar day than `today`, oldest first
pub fn overdue_tasks(tasks: Vec<Task>, today: NaiveDate, offset: FixedOffset) -> Vec<Task> {
    let mut overdue: Vec<Task> = tasks
        .into_iter()
        .filter(|task| !task.is_completed && calendar_day(task.due_date, offset) < today)
        .collect();
    overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.title.cmp(&b.title)));

    overdue
}

pub fn progress(tasks: &[Task], today: NaiveDate, offset: FixedOffset) -> Progress {
    tasks.iter().fold(Progress::default(), |mut progress, task| {
        progress.total += 1;
        progress.time_spent += task.time_spent;
        if task.is_completed {
            progress.completed += 1;
        } else if same_calendar_day(task.due_date, today, offset) {
            progress.due_today += 1;
        }
        progress
    })
}

/// The Monday starting `day`'s week. [None] when that Monday is before the earliest
/// representable date.
fn week_start(day: NaiveDate) -> Option<NaiveDate> {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))
}

fn time_due_between(
    tasks: &[Task],
    offset: FixedOffset,
    include: impl Fn(NaiveDate) -> bool,
) -> i64 {
    tasks
        .iter()
        .filter(|task| include(calendar_day(task.due_date, offset)))
        .map(|task| task.time_spent)
        .sum()
}

/// Seven buckets, Monday through Sunday of the week containing `day`. Weeks running off
/// either end of the calendar have no buckets past the edge.
pub fn weekly_time_summary(tasks: &[Task], day: NaiveDate, offset: FixedOffset) -> Vec<TimeBucket> {
    let Some(monday) = week_start(day) else {
        return Vec::new();
    };
    monday
        .iter_days()
        .take(7)
        .map(|bucket_day| TimeBucket {
            label: bucket_day.format("%a").to_string(),
            total_seconds: time_due_between(tasks, offset, |due| due == bucket_day),
        })
        .collect()
}

/// One bucket per Monday-starting week row of the month containing `day`. Only time from
/// tasks due inside that month counts, so the first and last rows may cover fewer than 7 days.
pub fn monthly_time_summary(tasks: &[Task], day: NaiveDate, offset: FixedOffset) -> Vec<TimeBucket> {
    let Some(month_start) = day.with_day(1) else {
        return Vec::new();
    };
    let Some(first_row_start) = week_start(month_start) else {
        return Vec::new();
    };
    let leading_days = month_start.weekday().num_days_from_monday();
    let week_count = (leading_days + days_in_month(month_start)).div_ceil(7);

    (0..week_count)
        .filter_map(|week_index| {
            let row_start = first_row_start.checked_add_days(Days::new(u64::from(week_index) * 7))?;
            let row_end = row_start.checked_add_days(Days::new(7))?;
            Some(TimeBucket {
                label: format!("Week {}", week_index + 1),
                total_seconds: time_due_between(tasks, offset, |due| {
                    due >= row_start
                        && due < row_end
                        && due.year() == month_start.year()
                        && due.month() == month_start.month()
                }),
            })
        })
        .collect()
}

fn days_in_month(month_start: NaiveDate) -> u32 {
    let next_month = month_start
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    next_month.signed_duration_since(month_start).num_days() as u32
}

/// Finds the current version of a task in a fresher snapshot, if it still exists
pub fn relocate(snapshot: &[Task], task_id: TaskId) -> Option<&Task> {
    snapshot.iter().find(|task| task.id == task_id)
}

/// Works out the display order writes needed to move `moved` to `to_index` within the
/// displayed list. Only tasks whose order actually changes are returned. [None] means the
/// moved task isn't in the list.
pub fn plan_reorder(displayed: &[Task], moved: TaskId, to_index: usize) -> Option<Vec<(TaskId, i32)>> {
    let from_index = displayed.iter().position(|task| task.id == moved)?;

    let mut reordered: Vec<&Task> = displayed.iter().collect();
    let moved_task = reordered.remove(from_index);
    reordered.insert(to_index.min(reordered.len()), moved_task);

    Some(
        reordered
            .into_iter()
            .enumerate()
            .filter_map(|(index, task)| {
                let new_order = index as i32;
                (task.display_order != Some(new_order)).then_some((task.id, new_order))
            })
            .collect(),
    )
}
