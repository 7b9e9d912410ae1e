//! One-shot commands that run without the dashboard.

use chrono::Utc;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::api::{Action, ApiClient, ApiError, Employee, NormalizedResult, Payload, ProgressEntry, Task};
use crate::auth::{IdentityProvider, Permission, Role, Screen, SessionIdentity};
use crate::config::Config;
use crate::export;
use crate::notify::LogNotifier;
use crate::store::{self, EmployeeDraft, ProgressUpdate, TaskChanges, TaskDraft, TaskScope};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Check that the backend answers
  Probe,
  /// Call a backend action and print the normalized result as JSON
  Call {
    /// Action name, e.g. getTasks
    action: Action,
    /// Payload fields as key=value; values that parse as JSON keep their type
    #[arg(value_parser = parse_param)]
    params: Vec<(String, Value)>,
  },
  /// Show the signed-in identity and the role the backend reports
  Whoami,
  /// Create, edit or delete tasks and report their progress
  Task {
    #[command(subcommand)]
    command: TaskCommand,
  },
  /// Manage employee records (admins)
  Employee {
    #[command(subcommand)]
    command: EmployeeCommand,
  },
  /// Inspect or correct a task's progress history
  Progress {
    #[command(subcommand)]
    command: ProgressCommand,
  },
  /// Write the visible tasks as CSV, to stdout when no path is given
  Export {
    path: Option<PathBuf>,
    /// Only tasks with this status (not_started, in_progress, completed)
    #[arg(long, value_parser = parse_status)]
    status: Option<&'static str>,
  },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
  Add {
    #[arg(long)]
    description: String,
    /// Due date, YYYY-MM-DD
    #[arg(long)]
    due: String,
    /// Id of the assigned employee
    #[arg(long)]
    employee: String,
  },
  Update {
    id: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    due: Option<String>,
    #[arg(long)]
    employee: Option<String>,
  },
  Delete {
    id: String,
  },
  /// Record progress on a task, with an optional note and status change
  Progress {
    id: String,
    #[arg(long)]
    progress: f64,
    #[arg(long, value_parser = parse_status)]
    status: Option<&'static str>,
    #[arg(long)]
    notes: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum EmployeeCommand {
  Add {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// admin, supervisor or employee
    #[arg(long, default_value = "employee")]
    role: String,
  },
  /// Change an employee; omitted fields keep their current values
  Update {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    role: Option<String>,
  },
  Delete {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
  List {
    task_id: String,
  },
  Update {
    id: String,
    #[arg(long)]
    progress: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
  },
  Delete {
    id: String,
  },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got {}", raw))?;
  if key.is_empty() {
    return Err(format!("missing key in {}", raw));
  }
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((key.to_string(), value))
}

fn parse_status(raw: &str) -> Result<&'static str, String> {
  store::parse_status(raw).map_err(|e| e.user_message())
}

/// Who is running the command, as far as the backend is concerned.
struct Viewer {
  role: Role,
  user_id: Option<String>,
  signed_in: bool,
}

impl Viewer {
  async fn resolve(client: &ApiClient, session: &SessionIdentity) -> Self {
    match session.current() {
      Some(identity) => {
        let (role, user_id) = store::resolve_role(client, &LogNotifier, &identity.email).await;
        Viewer {
          role,
          user_id,
          signed_in: true,
        }
      }
      None => Viewer {
        role: Role::default(),
        user_id: None,
        signed_in: false,
      },
    }
  }

  fn require(&self, allowed: bool) -> Result<()> {
    if !self.signed_in {
      return Err(eyre!("Sign in required: set KPITRACK_ID_TOKEN to an identity token"));
    }
    if !allowed {
      return Err(eyre!("You don't have permission to perform this action."));
    }
    Ok(())
  }

  fn scope(&self) -> Result<TaskScope> {
    TaskScope::for_viewer(self.role, self.user_id.as_deref(), self.signed_in)
      .map_err(|e| eyre!(e.user_message()))
  }
}

fn failed(what: &str, err: ApiError) -> color_eyre::Report {
  eyre!("Failed to {}: {}", what, err.user_message())
}

pub async fn run(command: Command, config: &Config, session: Arc<SessionIdentity>) -> Result<()> {
  if !config.api.is_backend_configured() {
    return Err(eyre!(
      "Backend not configured: set api.url to the deployed script URL"
    ));
  }
  let client = ApiClient::new(config, session.clone())?;

  match command {
    Command::Probe => {
      let result = client.probe().await;
      print_result(&result)?;
      if let Some(error) = result.error() {
        return Err(eyre!("Backend probe failed: {}", error));
      }
    }
    Command::Call { action, params } => {
      let data: Payload = params.into_iter().collect();
      let result = client
        .call(action, data)
        .await
        .unwrap_or_else(NormalizedResult::from);
      print_result(&result)?;
      if let Some(error) = result.error() {
        return Err(eyre!("{} failed: {}", action, error));
      }
    }
    Command::Whoami => {
      let Some(identity) = session.current() else {
        println!("Not signed in. Set KPITRACK_ID_TOKEN to an identity token.");
        return Ok(());
      };

      let expiry = if identity.is_expired(Utc::now()) {
        "expired"
      } else {
        "valid"
      };
      println!("name:    {}", identity.name);
      println!("email:   {}", identity.email);
      println!("subject: {}", identity.sub);
      println!("token:   {} until {}", expiry, identity.expires_at.to_rfc3339());

      let viewer = Viewer::resolve(&client, &session).await;
      println!("role:    {}", viewer.role);
      println!("user id: {}", viewer.user_id.as_deref().unwrap_or("-"));
    }
    Command::Task { command } => {
      let viewer = Viewer::resolve(&client, &session).await;
      run_task(&client, &viewer, command).await?;
    }
    Command::Employee { command } => {
      let viewer = Viewer::resolve(&client, &session).await;
      viewer.require(viewer.role.has_permission(Permission::ManageUsers))?;
      run_employee(&client, command).await?;
    }
    Command::Progress { command } => {
      let viewer = Viewer::resolve(&client, &session).await;
      run_progress(&client, &viewer, command).await?;
    }
    Command::Export { path, status } => {
      let viewer = Viewer::resolve(&client, &session).await;
      let csv = export_csv(&client, &viewer, status).await?;
      match path {
        Some(path) => {
          std::fs::write(&path, csv)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
          info!(path = %path.display(), "tasks exported");
          println!("Exported tasks to {}", path.display());
        }
        None => print!("{}", csv),
      }
    }
  }

  Ok(())
}

async fn run_task(client: &ApiClient, viewer: &Viewer, command: TaskCommand) -> Result<()> {
  match command {
    TaskCommand::Add {
      description,
      due,
      employee,
    } => {
      viewer.require(viewer.role.has_permission(Permission::ManageTasks))?;
      let draft = TaskDraft {
        description,
        due_date: due,
        employee_id: employee,
      };
      let result = store::add_task(client, &draft, viewer.user_id.as_deref(), Utc::now())
        .await
        .map_err(|e| failed("add task", e))?;
      print_result(&result)?;
    }
    TaskCommand::Update {
      id,
      description,
      due,
      employee,
    } => {
      viewer.require(viewer.role.has_permission(Permission::ManageTasks))?;
      let changes = TaskChanges {
        description,
        due_date: due,
        employee_id: employee,
      };
      let result = store::update_task(client, &id, &changes, Utc::now())
        .await
        .map_err(|e| failed("update task", e))?;
      print_result(&result)?;
    }
    TaskCommand::Delete { id } => {
      viewer.require(viewer.role.can_open(Screen::Admin))?;
      store::delete_task(client, &id)
        .await
        .map_err(|e| failed("delete task", e))?;
      println!("Task {} deleted", id);
    }
    TaskCommand::Progress {
      id,
      progress,
      status,
      notes,
    } => {
      viewer.require(viewer.role.can_update_progress())?;
      let tasks: Vec<Task> = store::fetch_tasks(client, &viewer.scope()?)
        .await
        .and_then(|r| r.list())
        .map_err(|e| failed("load tasks", e))?;
      let task = tasks
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| eyre!("Task not found: {}", id))?;

      let mut update = ProgressUpdate::from_task(&task);
      update.progress = progress;
      if let Some(status) = status {
        update.status = status.to_string();
      }
      update.notes = notes.unwrap_or_default();

      let saved = store::save_progress(client, &task, &update, viewer.user_id.as_deref(), Utc::now())
        .await
        .map_err(|e| failed("update progress", e))?;
      println!(
        "Task {} is {} at {}%{}",
        task.id,
        saved.status,
        saved.progress,
        if saved.entry_added { " (recorded in history)" } else { "" }
      );
    }
  }
  Ok(())
}

async fn run_employee(client: &ApiClient, command: EmployeeCommand) -> Result<()> {
  match command {
    EmployeeCommand::Add { name, email, role } => {
      let draft = EmployeeDraft { name, email, role };
      let result = store::add_employee(client, &draft, Utc::now())
        .await
        .map_err(|e| failed("add employee", e))?;
      print_result(&result)?;
    }
    EmployeeCommand::Update {
      id,
      name,
      email,
      role,
    } => {
      let employees: Vec<Employee> = store::fetch_employees(client)
        .await
        .and_then(|r| r.list())
        .map_err(|e| failed("load employees", e))?;
      let current = employees
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| eyre!("Employee not found: {}", id))?;

      let draft = EmployeeDraft {
        name: name.unwrap_or(current.name),
        email: email.unwrap_or(current.email),
        role: role.unwrap_or(current.role),
      };
      let result = store::update_employee(client, &id, &draft, Utc::now())
        .await
        .map_err(|e| failed("update employee", e))?;
      print_result(&result)?;
    }
    EmployeeCommand::Delete { id } => {
      store::delete_employee(client, &id)
        .await
        .map_err(|e| failed("delete employee", e))?;
      println!("Employee {} deleted", id);
    }
  }
  Ok(())
}

async fn run_progress(client: &ApiClient, viewer: &Viewer, command: ProgressCommand) -> Result<()> {
  match command {
    ProgressCommand::List { task_id } => {
      let entries: Vec<ProgressEntry> = store::fetch_progress(client, &task_id)
        .await
        .and_then(|r| r.list())
        .map_err(|e| failed("load progress", e))?;
      if entries.is_empty() {
        println!("No progress entries.");
      }
      for entry in entries {
        println!(
          "{:<24} {:>4}%  {:<12} {}",
          entry.recorded().unwrap_or("-"),
          entry.progress.round() as i64,
          entry.status.as_deref().unwrap_or(""),
          entry.notes.as_deref().unwrap_or("")
        );
      }
    }
    ProgressCommand::Update {
      id,
      progress,
      notes,
    } => {
      viewer.require(viewer.role.can_update_progress())?;
      let result = store::update_progress_entry(client, &id, progress, notes.as_deref(), Utc::now())
        .await
        .map_err(|e| failed("update progress entry", e))?;
      print_result(&result)?;
    }
    ProgressCommand::Delete { id } => {
      viewer.require(viewer.role.can_update_progress())?;
      store::delete_progress_entry(client, &id)
        .await
        .map_err(|e| failed("delete progress entry", e))?;
      println!("Progress entry {} deleted", id);
    }
  }
  Ok(())
}

/// Tasks the viewer can see, optionally narrowed to one status, as CSV.
async fn export_csv(client: &ApiClient, viewer: &Viewer, status: Option<&str>) -> Result<String> {
  let tasks: Vec<Task> = store::fetch_tasks(client, &viewer.scope()?)
    .await
    .and_then(|r| r.list())
    .map_err(|e| failed("load tasks", e))?;

  // Names are a nicety; the rows fall back to the task's own assignee name.
  let employees: Vec<Employee> = if viewer.role.can_open(Screen::Supervisor) {
    store::fetch_employees(client)
      .await
      .and_then(|r| r.list())
      .unwrap_or_default()
  } else {
    Vec::new()
  };

  let visible: Vec<&Task> = tasks
    .iter()
    .filter(|t| store::matches_status(t, status))
    .collect();
  export::tasks_csv(&visible, &employees)
}

fn print_result(result: &NormalizedResult) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(result)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::testing::make_token;
  use crate::auth::Identity;
  use clap::Parser;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, method, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[derive(Parser)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn config(server: &MockServer) -> Config {
    Config::parse(&format!("api:\n  url: {}/exec\n", server.uri())).unwrap()
  }

  fn signed_in() -> Arc<SessionIdentity> {
    let token = make_token(&json!({
      "sub": "1", "email": "ana@example.com", "exp": 4_000_000_000i64
    }));
    SessionIdentity::new(Some(Identity::from_token(&token).unwrap()))
  }

  async fn mount_role(server: &MockServer, role: &str, user_id: &str) {
    Mock::given(method("GET"))
      .and(query_param("action", "getUserRole"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "success": true, "data": {"role": role, "userId": user_id}
      })))
      .mount(server)
      .await;
  }

  #[test]
  fn test_parse_param() {
    assert_eq!(parse_param("taskId=T1"), Ok(("taskId".into(), json!("T1"))));
    assert_eq!(parse_param("progress=80"), Ok(("progress".into(), json!(80))));
    assert_eq!(parse_param("note=a=b"), Ok(("note".into(), json!("a=b"))));
    assert!(parse_param("progress").is_err());
    assert!(parse_param("=1").is_err());
  }

  #[test]
  fn test_call_arguments() {
    let cli = Cli::try_parse_from(["kpitrack", "call", "updateTask", "taskId=T1", "progress=80"]).unwrap();
    match cli.command {
      Command::Call { action, params } => {
        assert_eq!(action, Action::UpdateTask);
        assert_eq!(params.len(), 2);
      }
      other => panic!("unexpected command: {:?}", other),
    }

    assert!(Cli::try_parse_from(["kpitrack", "call", "dropTables"]).is_err());
  }

  #[test]
  fn test_export_arguments() {
    let cli = Cli::try_parse_from(["kpitrack", "export", "tasks.csv", "--status", "In-Progress"]).unwrap();
    match cli.command {
      Command::Export { path, status } => {
        assert_eq!(path, Some(PathBuf::from("tasks.csv")));
        assert_eq!(status, Some("in_progress"));
      }
      other => panic!("unexpected command: {:?}", other),
    }

    assert!(Cli::try_parse_from(["kpitrack", "export", "--status", "blocked"]).is_err());
  }

  #[tokio::test]
  async fn test_call_against_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(query_param("action", "getTasks"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
      .expect(1)
      .mount(&server)
      .await;

    let command = Command::Call {
      action: Action::GetTasks,
      params: Vec::new(),
    };

    run(command, &config(&server), SessionIdentity::new(None)).await.unwrap();
  }

  #[tokio::test]
  async fn test_unconfigured_backend_is_refused() {
    let config =
      Config::parse("api:\n  url: https://script.google.com/macros/s/YOUR_SCRIPT_ID/exec\n").unwrap();
    let err = run(Command::Probe, &config, SessionIdentity::new(None)).await.unwrap_err();
    assert!(err.to_string().contains("not configured"));
  }

  #[tokio::test]
  async fn test_writes_require_sign_in() {
    let server = MockServer::start().await;
    let command = Command::Task {
      command: TaskCommand::Delete { id: "T1".into() },
    };

    let err = run(command, &config(&server), SessionIdentity::new(None)).await.unwrap_err();

    assert!(err.to_string().starts_with("Sign in required"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
  }

  #[tokio::test]
  async fn test_employee_cannot_delete_task() {
    let server = MockServer::start().await;
    mount_role(&server, "employee", "emp1").await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
      .expect(0)
      .mount(&server)
      .await;

    let command = Command::Task {
      command: TaskCommand::Delete { id: "T1".into() },
    };
    let err = run(command, &config(&server), signed_in()).await.unwrap_err();

    assert!(err.to_string().contains("permission"));
  }

  #[tokio::test]
  async fn test_admin_adds_task() {
    let server = MockServer::start().await;
    mount_role(&server, "admin", "adm1").await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({
        "action": "addTask",
        "data": {"description": "Quarterly report", "employeeId": "emp1", "createdBy": "adm1", "progress": 0}
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"id": "T9"}})))
      .expect(1)
      .mount(&server)
      .await;

    let command = Command::Task {
      command: TaskCommand::Add {
        description: "Quarterly report".into(),
        due: "2024-06-30".into(),
        employee: "emp1".into(),
      },
    };

    run(command, &config(&server), signed_in()).await.unwrap();
  }

  #[tokio::test]
  async fn test_employee_update_keeps_unchanged_fields() {
    let server = MockServer::start().await;
    mount_role(&server, "admin", "adm1").await;
    Mock::given(method("GET"))
      .and(query_param("action", "getEmployees"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": [{"id": "emp1", "name": "Ana", "email": "ana@example.com", "role": "employee"}]
      })))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({
        "action": "updateEmployee",
        "data": {"name": "Ana Lee", "email": "ana@example.com", "role": "employee"}
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
      .expect(1)
      .mount(&server)
      .await;

    let command = Command::Employee {
      command: EmployeeCommand::Update {
        id: "emp1".into(),
        name: Some("Ana Lee".into()),
        email: None,
        role: None,
      },
    };

    run(command, &config(&server), signed_in()).await.unwrap();
  }

  #[tokio::test]
  async fn test_task_progress_records_history() {
    let server = MockServer::start().await;
    mount_role(&server, "employee", "emp1").await;
    Mock::given(method("GET"))
      .and(query_param("action", "getTasksByEmployee"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": [{"id": "T1", "status": "in_progress", "progress": 40, "employeeId": "emp1"}]
      })))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({"action": "updateTaskProgress", "data": {"progress": 60}})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_partial_json(json!({
        "action": "addProgress",
        "data": {"taskId": "T1", "employeeId": "emp1", "notes": "Draft sent"}
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
      .expect(1)
      .mount(&server)
      .await;

    let command = Command::Task {
      command: TaskCommand::Progress {
        id: "T1".into(),
        progress: 60.0,
        status: None,
        notes: Some("Draft sent".into()),
      },
    };

    run(command, &config(&server), signed_in()).await.unwrap();
  }

  #[tokio::test]
  async fn test_export_filters_by_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(query_param("action", "getTasks"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": [
          {"id": "T1", "title": "Report", "status": "completed", "progress": 100, "employeeName": "Ana"},
          {"id": "T2", "title": "Review", "status": "in_progress", "progress": 50}
        ]
      })))
      .mount(&server)
      .await;

    let session = SessionIdentity::new(None);
    let client = ApiClient::new(&config(&server), session.clone()).unwrap();
    let viewer = Viewer::resolve(&client, &session).await;

    let csv = export_csv(&client, &viewer, Some("completed")).await.unwrap();

    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("\"Ana\",\"Report\""));
    assert!(!csv.contains("Review"));
  }
}
