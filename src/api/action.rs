//! Remote action catalog and transport selection.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// How a request for an action travels to the script endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
  /// `GET ?action=...&<flattened data>`
  Get,
  /// `POST` with the JSON envelope as body
  Post,
}

/// Named operation understood by the backend script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  Test,
  Ping,
  GetEmployees,
  AddEmployee,
  UpdateEmployee,
  DeleteEmployee,
  GetEmployeeByEmail,
  GetTasks,
  GetTasksByEmployee,
  GetTasksBySupervisor,
  AddTask,
  UpdateTask,
  DeleteTask,
  UpdateTaskProgress,
  GetProgressByTask,
  AddProgress,
  UpdateProgress,
  DeleteProgress,
  GetSupervisorDashboard,
  GetEmployeeDashboard,
  GetKpiMetrics,
  AuthenticateUser,
  GetUserRole,
  VerifyPermissions,
}

impl Action {
  pub const ALL: &'static [Action] = &[
    Action::Test,
    Action::Ping,
    Action::GetEmployees,
    Action::AddEmployee,
    Action::UpdateEmployee,
    Action::DeleteEmployee,
    Action::GetEmployeeByEmail,
    Action::GetTasks,
    Action::GetTasksByEmployee,
    Action::GetTasksBySupervisor,
    Action::AddTask,
    Action::UpdateTask,
    Action::DeleteTask,
    Action::UpdateTaskProgress,
    Action::GetProgressByTask,
    Action::AddProgress,
    Action::UpdateProgress,
    Action::DeleteProgress,
    Action::GetSupervisorDashboard,
    Action::GetEmployeeDashboard,
    Action::GetKpiMetrics,
    Action::AuthenticateUser,
    Action::GetUserRole,
    Action::VerifyPermissions,
  ];

  /// Wire name of the action.
  pub fn as_str(self) -> &'static str {
    match self {
      Action::Test => "test",
      Action::Ping => "ping",
      Action::GetEmployees => "getEmployees",
      Action::AddEmployee => "addEmployee",
      Action::UpdateEmployee => "updateEmployee",
      Action::DeleteEmployee => "deleteEmployee",
      Action::GetEmployeeByEmail => "getEmployeeByEmail",
      Action::GetTasks => "getTasks",
      Action::GetTasksByEmployee => "getTasksByEmployee",
      Action::GetTasksBySupervisor => "getTasksBySupervisor",
      Action::AddTask => "addTask",
      Action::UpdateTask => "updateTask",
      Action::DeleteTask => "deleteTask",
      Action::UpdateTaskProgress => "updateTaskProgress",
      Action::GetProgressByTask => "getProgressByTask",
      Action::AddProgress => "addProgress",
      Action::UpdateProgress => "updateProgress",
      Action::DeleteProgress => "deleteProgress",
      Action::GetSupervisorDashboard => "getSupervisorDashboard",
      Action::GetEmployeeDashboard => "getEmployeeDashboard",
      Action::GetKpiMetrics => "getKPIMetrics",
      Action::AuthenticateUser => "authenticateUser",
      Action::GetUserRole => "getUserRole",
      Action::VerifyPermissions => "verifyPermissions",
    }
  }

  /// Read-only, low-cardinality actions go over GET; everything else is POSTed.
  pub fn transport(self) -> TransportKind {
    match self {
      Action::Test
      | Action::Ping
      | Action::GetEmployees
      | Action::GetTasks
      | Action::GetKpiMetrics
      | Action::AuthenticateUser
      | Action::GetUserRole
      | Action::GetEmployeeByEmail => TransportKind::Get,
      _ => TransportKind::Post,
    }
  }

  pub fn is_simple(self) -> bool {
    self.transport() == TransportKind::Get
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Action {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Action::ALL
      .iter()
      .copied()
      .find(|a| a.as_str() == s)
      .ok_or_else(|| format!("Unknown action: {}", s))
  }
}

impl Serialize for Action {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}
