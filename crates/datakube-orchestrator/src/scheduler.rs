//! Trigger bookkeeping for the event loop
//!
//! Two kinds of trigger exist: a fixed interval measured from the end of the previous
//! run, and a daily wall-clock time in the local timezone. The scheduler only tracks
//! when each task is next due; running tasks is the event loop's job.

use chrono::{DateTime, Days, NaiveTime, TimeZone};
use std::time::Duration;

/// When a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `Duration`, counted from the end of the previous run
    Every(Duration),
    /// Once a day at this time of day
    DailyAt(NaiveTime),
}

impl Trigger {
    /// First firing strictly after `after`
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Trigger::Every(every) => {
                let every = chrono::Duration::from_std(*every).unwrap_or_else(|_| chrono::Duration::days(365));
                after.clone().checked_add_signed(every).unwrap_or_else(|| after.clone())
            },
            Trigger::DailyAt(time) => {
                let timezone = after.timezone();
                let mut date = after.date_naive();
                loop {
                    let candidate = date.and_time(*time);
                    // A time skipped by a DST change resolves to nothing; try the next day.
                    if let Some(at) = timezone.from_local_datetime(&candidate).earliest() {
                        if at > *after {
                            return at;
                        }
                    }
                    match date.checked_add_days(Days::new(1)) {
                        Some(next) => date = next,
                        None => return after.clone(),
                    }
                }
            },
        }
    }
}

/// Work the event loop knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Drain the live queue
    Drain,
    /// Run the archive policy at this index
    Archive(usize),
}

#[derive(Debug, Clone)]
struct Entry<Tz: TimeZone> {
    task: Task,
    trigger: Trigger,
    next_run: DateTime<Tz>,
}

/// Set of tasks with their triggers and next due times
#[derive(Debug, Clone)]
pub struct Scheduler<Tz: TimeZone> {
    entries: Vec<Entry<Tz>>,
}

impl<Tz: TimeZone> Default for Scheduler<Tz> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<Tz: TimeZone> Scheduler<Tz> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task with its first run at `first_run`
    pub fn add(&mut self, task: Task, trigger: Trigger, first_run: DateTime<Tz>) {
        self.entries.push(Entry {
            task,
            trigger,
            next_run: first_run,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest next run across all tasks
    pub fn next_run(&self) -> Option<DateTime<Tz>> {
        self.entries.iter().map(|entry| entry.next_run.clone()).min()
    }

    /// Tasks due at `now`, in registration order
    pub fn due(&self, now: &DateTime<Tz>) -> Vec<Task> {
        self.entries
            .iter()
            .filter(|entry| entry.next_run <= *now)
            .map(|entry| entry.task)
            .collect()
    }

    /// Record that `task` finished at `finished_at` and compute its next run
    pub fn completed(&mut self, task: Task, finished_at: &DateTime<Tz>) {
        for entry in self.entries.iter_mut().filter(|entry| entry.task == task) {
            entry.next_run = entry.trigger.next_after(finished_at);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, h, m, s).unwrap()
    }

    fn one_am() -> NaiveTime {
        NaiveTime::from_hms_opt(1, 0, 0).unwrap()
    }

    #[test]
    fn test_interval_counts_from_previous_run() {
        let trigger = Trigger::Every(Duration::from_secs(60));
        assert_eq!(trigger.next_after(&at(0, 0, 30)), at(0, 1, 30));
    }

    #[test]
    fn test_daily_trigger_later_today() {
        let trigger = Trigger::DailyAt(one_am());
        assert_eq!(trigger.next_after(&at(0, 30, 0)), at(1, 0, 0));
    }

    #[test]
    fn test_daily_trigger_rolls_to_tomorrow() {
        let trigger = Trigger::DailyAt(one_am());
        let tomorrow = Utc.with_ymd_and_hms(2020, 6, 2, 1, 0, 0).unwrap();
        assert_eq!(trigger.next_after(&at(1, 0, 0)), tomorrow);
        assert_eq!(trigger.next_after(&at(13, 0, 0)), tomorrow);
    }

    #[test]
    fn test_due_and_completed() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Task::Drain, Trigger::Every(Duration::from_secs(60)), at(0, 0, 0));
        scheduler.add(Task::Archive(0), Trigger::DailyAt(one_am()), at(0, 0, 0));

        assert_eq!(scheduler.due(&at(0, 0, 0)), vec![Task::Drain, Task::Archive(0)]);

        scheduler.completed(Task::Drain, &at(0, 0, 5));
        scheduler.completed(Task::Archive(0), &at(0, 0, 7));

        assert!(scheduler.due(&at(0, 0, 30)).is_empty());
        assert_eq!(scheduler.next_run(), Some(at(0, 1, 5)));
        assert_eq!(scheduler.due(&at(1, 0, 0)), vec![Task::Drain, Task::Archive(0)]);
    }

    #[test]
    fn test_empty_scheduler_has_no_next_run() {
        let scheduler: Scheduler<Utc> = Scheduler::new();
        assert!(scheduler.is_empty());
        assert!(scheduler.next_run().is_none());
    }
}
