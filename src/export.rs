//! CSV export of task lists.

use crate::api::{Employee, Task};
use crate::store;
use color_eyre::eyre::eyre;
use color_eyre::Result;

const TASK_HEADERS: [&str; 6] = [
  "Employee",
  "Task",
  "Due Date",
  "Status",
  "Progress",
  "Last Updated",
];

/// Render `tasks` as CSV, resolving assignee names from `employees`.
///
/// Every field is quoted so sheet tools never re-type ids or dates.
pub fn tasks_csv(tasks: &[&Task], employees: &[Employee]) -> Result<String> {
  if tasks.is_empty() {
    return Err(eyre!("No data to export"));
  }

  let mut out = row(TASK_HEADERS.iter().map(|h| h.to_string()));
  for task in tasks {
    out.push_str(&row([
      assignee(task, employees),
      task.label().to_string(),
      task.due_date.clone().unwrap_or_default(),
      status_label(store::status_of(task)),
      format!("{}%", task.progress.round() as i64),
      task.updated().unwrap_or_default().to_string(),
    ]));
  }
  Ok(out)
}

fn assignee(task: &Task, employees: &[Employee]) -> String {
  employees
    .iter()
    .find(|e| !task.employee_id.is_empty() && e.id == task.employee_id)
    .map(|e| e.name.clone())
    .or_else(|| task.employee_name.clone())
    .unwrap_or_else(|| "Unknown".to_string())
}

/// `in_progress` -> `In Progress`
fn status_label(status: &str) -> String {
  status
    .split('_')
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn row<I: IntoIterator<Item = String>>(fields: I) -> String {
  let mut line = fields
    .into_iter()
    .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
    .collect::<Vec<_>>()
    .join(",");
  line.push('\n');
  line
}
