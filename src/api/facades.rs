//! Named remote operations grouped by domain.
//!
//! Each facade is a copyable borrow of the [`ApiClient`] and maps one method
//! to one action with a shaped payload. Caching is left to the caller, which
//! knows which reads may be stale and which writes invalidate them.

use serde_json::Value;

use super::action::Action;
use super::client::ApiClient;
use super::envelope::{payload, with_id, Payload};
use super::error::ApiError;
use super::normalize::NormalizedResult;

type ApiResult = Result<NormalizedResult, ApiError>;

fn one(key: &str, value: &str) -> Payload {
  payload([(key, value)])
}

impl ApiClient {
  pub fn employees(&self) -> EmployeeApi<'_> {
    EmployeeApi { client: self }
  }

  pub fn tasks(&self) -> TaskApi<'_> {
    TaskApi { client: self }
  }

  pub fn progress(&self) -> ProgressApi<'_> {
    ProgressApi { client: self }
  }

  pub fn dashboard(&self) -> DashboardApi<'_> {
    DashboardApi { client: self }
  }

  pub fn auth(&self) -> AuthApi<'_> {
    AuthApi { client: self }
  }
}

#[derive(Clone, Copy)]
pub struct EmployeeApi<'a> {
  client: &'a ApiClient,
}

impl EmployeeApi<'_> {
  pub async fn get_all(self) -> ApiResult {
    self.client.call(Action::GetEmployees, Payload::new()).await
  }

  pub async fn add(self, data: Payload) -> ApiResult {
    self.client.call(Action::AddEmployee, data).await
  }

  pub async fn update(self, employee_id: &str, data: Payload) -> ApiResult {
    let data = with_id("employeeId", employee_id, data);
    self.client.call(Action::UpdateEmployee, data).await
  }

  pub async fn delete(self, employee_id: &str) -> ApiResult {
    let data = one("employeeId", employee_id);
    self.client.call(Action::DeleteEmployee, data).await
  }

  pub async fn get_by_email(self, email: &str) -> ApiResult {
    let data = one("email", email);
    self.client.call(Action::GetEmployeeByEmail, data).await
  }
}

#[derive(Clone, Copy)]
pub struct TaskApi<'a> {
  client: &'a ApiClient,
}

impl TaskApi<'_> {
  pub async fn get_all(self) -> ApiResult {
    self.client.call(Action::GetTasks, Payload::new()).await
  }

  pub async fn get_by_employee(self, employee_id: &str) -> ApiResult {
    let data = one("employeeId", employee_id);
    self.client.call(Action::GetTasksByEmployee, data).await
  }

  pub async fn get_by_supervisor(self, supervisor_id: &str) -> ApiResult {
    let data = one("supervisorId", supervisor_id);
    self.client.call(Action::GetTasksBySupervisor, data).await
  }

  pub async fn add(self, data: Payload) -> ApiResult {
    self.client.call(Action::AddTask, data).await
  }

  pub async fn update(self, task_id: &str, data: Payload) -> ApiResult {
    let data = with_id("taskId", task_id, data);
    self.client.call(Action::UpdateTask, data).await
  }

  pub async fn delete(self, task_id: &str) -> ApiResult {
    let data = one("taskId", task_id);
    self.client.call(Action::DeleteTask, data).await
  }

  pub async fn update_progress(self, task_id: &str, data: Payload) -> ApiResult {
    let data = with_id("taskId", task_id, data);
    self.client.call(Action::UpdateTaskProgress, data).await
  }
}

#[derive(Clone, Copy)]
pub struct ProgressApi<'a> {
  client: &'a ApiClient,
}

impl ProgressApi<'_> {
  pub async fn get_by_task(self, task_id: &str) -> ApiResult {
    let data = one("taskId", task_id);
    self.client.call(Action::GetProgressByTask, data).await
  }

  pub async fn add(self, data: Payload) -> ApiResult {
    self.client.call(Action::AddProgress, data).await
  }

  pub async fn update(self, progress_id: &str, data: Payload) -> ApiResult {
    let data = with_id("progressId", progress_id, data);
    self.client.call(Action::UpdateProgress, data).await
  }

  pub async fn delete(self, progress_id: &str) -> ApiResult {
    let data = one("progressId", progress_id);
    self.client.call(Action::DeleteProgress, data).await
  }
}

#[derive(Clone, Copy)]
pub struct DashboardApi<'a> {
  client: &'a ApiClient,
}

impl DashboardApi<'_> {
  pub async fn get_supervisor_data(self, supervisor_id: &str) -> ApiResult {
    let data = one("supervisorId", supervisor_id);
    self.client.call(Action::GetSupervisorDashboard, data).await
  }

  pub async fn get_employee_data(self, employee_id: &str) -> ApiResult {
    let data = one("employeeId", employee_id);
    self.client.call(Action::GetEmployeeDashboard, data).await
  }

  pub async fn get_kpi_metrics(self, filters: Payload) -> ApiResult {
    self.client.call(Action::GetKpiMetrics, filters).await
  }
}

#[derive(Clone, Copy)]
pub struct AuthApi<'a> {
  client: &'a ApiClient,
}

impl AuthApi<'_> {
  pub async fn authenticate(self, user_data: Payload) -> ApiResult {
    self.client.call(Action::AuthenticateUser, user_data).await
  }

  pub async fn get_user_role(self, email: &str) -> ApiResult {
    let data = one("email", email);
    self.client.call(Action::GetUserRole, data).await
  }

  pub async fn verify_permissions(self, action: &str) -> ApiResult {
    let data = payload([("action", Value::from(action))]);
    self.client.call(Action::VerifyPermissions, data).await
  }
}
