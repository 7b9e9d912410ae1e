//! KPI figures computed client-side from the loaded task and employee lists.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::api::{Employee, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatistics {
  pub total: usize,
  pub completed: usize,
  pub in_progress: usize,
  pub pending: usize,
  pub overdue: usize,
  /// Percent, rounded.
  pub completion_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceMetrics {
  pub average_progress: u32,
  pub on_time_delivery: u32,
  pub productivity: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KpiSummary {
  pub tasks: TaskStatistics,
  pub employees: usize,
  pub performance: PerformanceMetrics,
}

/// Coarse task state used by the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Completed,
  InProgress,
  Pending,
  Other,
}

impl TaskState {
  pub fn of(task: &Task) -> Self {
    match task.status.trim() {
      "completed" => TaskState::Completed,
      "in_progress" | "in-progress" => TaskState::InProgress,
      "pending" | "not_started" | "not-started" => TaskState::Pending,
      _ => TaskState::Other,
    }
  }
}

/// Parse a sheet date: RFC 3339, `YYYY-MM-DD HH:MM:SS`, or a bare date at
/// midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
    return Some(dt.and_utc());
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
}

/// A task is overdue when it has a due date in the past and is not completed.
/// Unparseable due dates never count.
pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
  if TaskState::of(task) == TaskState::Completed {
    return false;
  }
  task
    .due_date
    .as_deref()
    .and_then(parse_date)
    .is_some_and(|due| due < now)
}

/// Completed tasks without both dates are assumed on time.
fn delivered_on_time(task: &Task) -> bool {
  let due = task.due_date.as_deref().and_then(parse_date);
  let updated = task.updated().and_then(parse_date);
  match (due, updated) {
    (Some(due), Some(updated)) => updated <= due,
    _ => true,
  }
}

fn percent(part: usize, whole: usize) -> u32 {
  if whole == 0 {
    return 0;
  }
  (part as f64 / whole as f64 * 100.0).round() as u32
}

pub fn summarize(tasks: &[Task], employees: &[Employee], now: DateTime<Utc>) -> KpiSummary {
  let total = tasks.len();
  let count = |state: TaskState| tasks.iter().filter(|t| TaskState::of(t) == state).count();

  let completed = count(TaskState::Completed);
  let in_progress = count(TaskState::InProgress);
  let pending = count(TaskState::Pending);
  let overdue = tasks.iter().filter(|t| is_overdue(t, now)).count();

  let average_progress = if total == 0 {
    0
  } else {
    let sum: f64 = tasks.iter().map(|t| t.progress).sum();
    (sum / total as f64).round().max(0.0) as u32
  };

  let on_time = tasks
    .iter()
    .filter(|t| TaskState::of(t) == TaskState::Completed && delivered_on_time(t))
    .count();

  let productivity = if total == 0 {
    0
  } else {
    let score =
      (completed as f64 * 100.0 + in_progress as f64 * 50.0 - overdue as f64 * 25.0) / total as f64;
    score.round().clamp(0.0, 100.0) as u32
  };

  KpiSummary {
    tasks: TaskStatistics {
      total,
      completed,
      in_progress,
      pending,
      overdue,
      completion_rate: percent(completed, total),
    },
    employees: employees.len(),
    performance: PerformanceMetrics {
      average_progress,
      on_time_delivery: percent(on_time, completed),
      productivity,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn task(status: &str, progress: f64, due: Option<&str>, updated: Option<&str>) -> Task {
    Task {
      status: status.to_string(),
      progress,
      due_date: due.map(String::from),
      updated_at: updated.map(String::from),
      ..Task::default()
    }
  }

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 22, 12, 0, 0).unwrap()
  }

  #[test]
  fn test_empty_lists() {
    assert_eq!(summarize(&[], &[], now()), KpiSummary::default());
  }

  #[test]
  fn test_status_buckets() {
    let tasks = vec![
      task("completed", 100.0, None, None),
      task("in-progress", 50.0, None, None),
      task("in_progress", 40.0, None, None),
      task("not_started", 0.0, None, None),
      task("pending", 0.0, None, None),
      task("blocked", 10.0, None, None),
    ];

    let stats = summarize(&tasks, &[], now()).tasks;

    assert_eq!(stats.total, 6);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.in_progress, 2);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.completion_rate, 17);
  }

  #[test]
  fn test_overdue_ignores_completed_and_undated() {
    let tasks = vec![
      task("in_progress", 45.0, Some("2025-09-17"), None),
      task("completed", 100.0, Some("2025-09-17"), None),
      task("pending", 0.0, None, None),
      task("pending", 0.0, Some("2025-10-01"), None),
      task("pending", 0.0, Some("someday"), None),
    ];

    assert_eq!(summarize(&tasks, &[], now()).tasks.overdue, 1);
  }

  #[test]
  fn test_on_time_delivery() {
    let tasks = vec![
      task("completed", 100.0, Some("2025-09-20"), Some("2025-09-19T10:00:00Z")),
      task("completed", 100.0, Some("2025-09-20"), Some("2025-09-21T10:00:00Z")),
      task("completed", 100.0, None, Some("2025-09-21T10:00:00Z")),
      task("in_progress", 10.0, Some("2025-09-20"), None),
    ];

    let perf = summarize(&tasks, &[], now()).performance;
    assert_eq!(perf.on_time_delivery, 67);
  }

  #[test]
  fn test_productivity_and_average() {
    // (1*100 + 1*50 - 1*25) / 3 = 41.67
    let tasks = vec![
      task("completed", 100.0, None, None),
      task("in_progress", 50.0, None, None),
      task("pending", 0.0, Some("2025-09-01"), None),
    ];

    let perf = summarize(&tasks, &[], now()).performance;
    assert_eq!(perf.productivity, 42);
    assert_eq!(perf.average_progress, 50);
  }

  #[test]
  fn test_productivity_floors_at_zero() {
    let tasks = vec![task("pending", 0.0, Some("2025-01-01"), None)];
    assert_eq!(summarize(&tasks, &[], now()).performance.productivity, 0);
  }

  #[test]
  fn test_parse_date_forms() {
    assert!(parse_date("2025-09-25").is_some());
    assert!(parse_date("2025-09-25T08:30:00.000Z").is_some());
    assert!(parse_date("2025-09-25 08:30:00").is_some());
    assert!(parse_date("25/09/2025").is_none());
  }
}
