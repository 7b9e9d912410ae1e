use crate::api::{ApiClient, ApiError, Employee, NormalizedResult, ProgressEntry, Task};
use crate::auth::{IdentityProvider, Permission, Role, Screen, SessionIdentity};
use crate::commands::{self, Command};
use crate::config::Config;
use crate::event::{ApiEvent, ChannelNotifier, Event, EventHandler, Notice};
use crate::kpi::{self, KpiSummary};
use crate::notify::{safe_call, Notifier};
use crate::store::{self, ProgressUpdate, TaskScope, TASK_STATUSES};
use crate::ui;
use chrono::Utc;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use futures::future::{BoxFuture, FutureExt};
use ratatui::prelude::*;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Step applied by `+` and `-` in the task detail view.
const PROGRESS_STEP: f64 = 10.0;

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  Command,
  Search,
  /// Typing a progress note for the open task
  Note,
  /// Waiting for y/n on a pending delete
  Confirm,
}

/// View state - each variant owns its data
#[derive(Debug)]
pub enum ViewState {
  // Root views (set via : commands)
  TaskList {
    tasks: Vec<Task>,
    selected: usize,
    loading: bool,
  },
  EmployeeList {
    employees: Vec<Employee>,
    selected: usize,
    loading: bool,
  },
  Dashboard {
    summary: Option<KpiSummary>,
    loading: bool,
  },

  // Detail views (pushed via Enter)
  TaskDetail {
    task: Box<Task>,
    entries: Vec<ProgressEntry>,
    loading: bool,
  },
}

impl ViewState {
  fn tasks() -> Self {
    ViewState::TaskList {
      tasks: Vec::new(),
      selected: 0,
      loading: true,
    }
  }

  fn employees() -> Self {
    ViewState::EmployeeList {
      employees: Vec::new(),
      selected: 0,
      loading: true,
    }
  }

  fn dashboard() -> Self {
    ViewState::Dashboard {
      summary: None,
      loading: true,
    }
  }

  fn set_loading(&mut self, value: bool) {
    match self {
      ViewState::TaskList { loading, .. }
      | ViewState::EmployeeList { loading, .. }
      | ViewState::Dashboard { loading, .. }
      | ViewState::TaskDetail { loading, .. } => *loading = value,
    }
  }
}

/// What the top view needs from the backend.
enum Load {
  Tasks,
  Employees,
  Dashboard,
  Progress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
  Success,
  Error,
}

/// Transient message shown in the status bar
#[derive(Debug, Clone)]
pub struct StatusMessage {
  pub text: String,
  pub kind: StatusKind,
  shown_at: Instant,
}

impl StatusMessage {
  fn lifetime(&self) -> Duration {
    match self.kind {
      StatusKind::Success => Duration::from_secs(3),
      StatusKind::Error => Duration::from_secs(5),
    }
  }
}

/// A delete waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDelete {
  Task { id: String, label: String },
  Employee { id: String, name: String },
}

impl PendingDelete {
  pub fn prompt(&self) -> String {
    match self {
      PendingDelete::Task { label, .. } => format!("Delete task \"{}\"? (y/n)", label),
      PendingDelete::Employee { name, .. } => format!(
        "Delete employee \"{}\"? Their tasks will need to be reassigned. (y/n)",
        name
      ),
    }
  }
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<ViewState>,

  /// Current input mode
  mode: Mode,

  /// Command input buffer (after pressing :)
  command_input: String,

  /// Search filter input (after pressing /)
  search_filter: String,

  /// Task status shown in the task list; all when unset
  status_filter: Option<&'static str>,

  /// Note being typed for the open task (after pressing n)
  note_input: String,

  pending_delete: Option<PendingDelete>,

  /// Selected autocomplete suggestion index
  selected_suggestion: usize,

  /// Application configuration
  config: Config,

  /// Backend client
  client: ApiClient,

  /// Signed-in user, if any
  session: Arc<SessionIdentity>,

  /// Role reported by the backend; least privilege until resolved
  role: Role,

  /// Backend id of the signed-in user, from the role lookup
  user_id: Option<String>,

  /// Calls currently showing the loading indicator
  in_flight: usize,

  status: Option<StatusMessage>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, client: ApiClient, session: Arc<SessionIdentity>) -> Self {
    let (tx, _rx) = mpsc::unbounded_channel();

    Self {
      view_stack: vec![ViewState::tasks()],
      mode: Mode::Normal,
      command_input: String::new(),
      search_filter: String::new(),
      status_filter: None,
      note_input: String::new(),
      pending_delete: None,
      selected_suggestion: 0,
      config,
      client,
      session,
      role: Role::default(),
      user_id: None,
      in_flight: 0,
      status: None,
      event_tx: tx,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    self.start();

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  /// Resolve the user's role, then load the root view.
  fn start(&mut self) {
    if !self.config.api.is_backend_configured() {
      self.set_status(
        StatusKind::Error,
        "Backend not configured: set api.url to the deployed script URL.",
      );
      self.view_stack[0].set_loading(false);
      return;
    }

    let Some(identity) = self.session.current() else {
      info!("no identity token, continuing anonymously");
      self.load_current();
      return;
    };

    self.spawn_load("role", move |client, notifier| async move {
      let (role, user_id) = store::resolve_role(&client, &notifier, &identity.email).await;
      Some(ApiEvent::RoleResolved { role, user_id })
    });
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.expire_status(),
      Event::Api(api_event) => self.handle_api_event(api_event),
      Event::Notice(notice) => self.handle_notice(notice),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::Command => self.handle_command_mode_key(key),
      Mode::Search => self.handle_search_mode_key(key),
      Mode::Note => self.handle_note_mode_key(key),
      Mode::Confirm => self.handle_confirm_mode_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
      KeyCode::Enter => self.enter_selected(),
      KeyCode::Esc => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.search_filter.clear();
          self.status_filter = None;
        }
      }

      // Data
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('f') => self.cycle_status_filter(),
      KeyCode::Char('d') => self.request_delete(),
      KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_progress(PROGRESS_STEP),
      KeyCode::Char('-') => self.adjust_progress(-PROGRESS_STEP),
      KeyCode::Char('s') => self.advance_status(),
      KeyCode::Char('n') => self.start_note(),

      // Mode switches
      KeyCode::Char(':') => {
        self.mode = Mode::Command;
        self.command_input.clear();
      }
      KeyCode::Char('/') => {
        self.mode = Mode::Search;
        self.search_filter.clear();
      }

      _ => {}
    }
  }

  fn handle_command_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.command_input.clear();
        self.selected_suggestion = 0;
      }
      KeyCode::Enter => {
        self.execute_command();
        self.mode = Mode::Normal;
        self.selected_suggestion = 0;
      }
      KeyCode::Tab | KeyCode::Down => {
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = (self.selected_suggestion + 1) % suggestions.len();
        }
      }
      KeyCode::BackTab | KeyCode::Up => {
        let suggestions = commands::get_suggestions(&self.command_input);
        if !suggestions.is_empty() {
          self.selected_suggestion = if self.selected_suggestion == 0 {
            suggestions.len() - 1
          } else {
            self.selected_suggestion - 1
          };
        }
      }
      KeyCode::Backspace => {
        self.command_input.pop();
        self.selected_suggestion = 0;
      }
      KeyCode::Char(c) => {
        self.command_input.push(c);
        self.selected_suggestion = 0;
      }
      _ => {}
    }
  }

  fn handle_search_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.search_filter.clear();
      }
      KeyCode::Enter => {
        // Keep the filter applied
        self.mode = Mode::Normal;
      }
      KeyCode::Backspace => {
        self.search_filter.pop();
      }
      KeyCode::Char(c) => {
        self.search_filter.push(c);
      }
      _ => {}
    }
    self.clamp_selection();
  }

  fn handle_note_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.mode = Mode::Normal;
        self.note_input.clear();
      }
      KeyCode::Enter => {
        self.mode = Mode::Normal;
        let notes = std::mem::take(&mut self.note_input);
        if !notes.trim().is_empty() {
          self.save_progress_edit(|update| update.notes = notes);
        }
      }
      KeyCode::Backspace => {
        self.note_input.pop();
      }
      KeyCode::Char(c) => {
        self.note_input.push(c);
      }
      _ => {}
    }
  }

  fn handle_confirm_mode_key(&mut self, key: KeyEvent) {
    self.mode = Mode::Normal;
    let pending = self.pending_delete.take();
    if let (KeyCode::Char('y') | KeyCode::Char('Y'), Some(pending)) = (key.code, pending) {
      self.delete(pending);
    }
  }

  fn execute_command(&mut self) {
    let suggestions = commands::get_suggestions(&self.command_input);
    let cmd = match suggestions.get(self.selected_suggestion) {
      Some(command) => command.name.to_string(),
      None => self.command_input.trim().to_lowercase(),
    };
    self.command_input.clear();

    match cmd.as_str() {
      "tasks" => self.open_root(ViewState::tasks()),
      "employees" => {
        if self.role.can_open(Screen::Supervisor) {
          self.open_root(ViewState::employees());
        } else {
          self.deny();
        }
      }
      "dashboard" => self.open_root(ViewState::dashboard()),
      "refresh" => self.refresh(),
      "quit" => self.should_quit = true,
      "" => {}
      other => self.set_status(StatusKind::Error, &format!("Unknown command: {}", other)),
    }
  }

  fn open_root(&mut self, view: ViewState) {
    self.view_stack.truncate(1);
    self.view_stack[0] = view;
    self.search_filter.clear();
    self.status_filter = None;
    self.load_current();
  }

  fn deny(&mut self) {
    self.set_status(
      StatusKind::Error,
      "You don't have permission to perform this action.",
    );
  }

  /// Drop cached data behind the current view and load it again.
  fn refresh(&mut self) {
    let pattern = match self.view_stack.last() {
      Some(ViewState::TaskList { .. }) => Some(store::TASKS_KEY.to_string()),
      Some(ViewState::EmployeeList { .. }) => Some(store::EMPLOYEES_KEY.to_string()),
      Some(ViewState::TaskDetail { task, .. }) => Some(store::progress_key(&task.id)),
      Some(ViewState::Dashboard { .. }) | None => None,
    };
    self.client.invalidate(pattern.as_deref());
    self.load_current();
  }

  fn task_scope(&self) -> std::result::Result<TaskScope, ApiError> {
    TaskScope::for_viewer(
      self.role,
      self.user_id.as_deref(),
      self.session.current().is_some(),
    )
  }

  /// Scope for a task load, or an error in the status bar and no load.
  fn scope_or_report(&mut self) -> Option<TaskScope> {
    match self.task_scope() {
      Ok(scope) => Some(scope),
      Err(err) => {
        self.set_status(StatusKind::Error, &err.user_message());
        if let Some(view) = self.view_stack.last_mut() {
          view.set_loading(false);
        }
        None
      }
    }
  }

  /// Start loading the data behind the top view.
  fn load_current(&mut self) {
    let load = match self.view_stack.last_mut() {
      Some(view) => {
        view.set_loading(true);
        match view {
          ViewState::TaskList { .. } => Load::Tasks,
          ViewState::EmployeeList { .. } => Load::Employees,
          ViewState::Dashboard { .. } => Load::Dashboard,
          ViewState::TaskDetail { task, .. } => Load::Progress(task.id.clone()),
        }
      }
      None => return,
    };

    match load {
      Load::Tasks => {
        let Some(scope) = self.scope_or_report() else {
          return;
        };
        self.spawn_load("tasks", move |client, notifier| async move {
          let result = safe_call(&notifier, "tasks", store::fetch_tasks(&client, &scope)).await?;
          decode_list(&result, &notifier).map(ApiEvent::TasksLoaded)
        });
      }
      Load::Employees => {
        self.spawn_load("employees", move |client, notifier| async move {
          let result = safe_call(&notifier, "employees", store::fetch_employees(&client)).await?;
          decode_list(&result, &notifier).map(ApiEvent::EmployeesLoaded)
        });
      }
      Load::Dashboard => {
        let Some(scope) = self.scope_or_report() else {
          return;
        };
        let with_employees = self.role.can_open(Screen::Supervisor);
        self.spawn_load("dashboard", move |client, notifier| async move {
          load_dashboard(&client, &notifier, &scope, with_employees).await
        });
      }
      Load::Progress(task_id) => {
        self.spawn_load("progress", move |client, notifier| async move {
          let call = store::fetch_progress(&client, &task_id);
          let result = safe_call(&notifier, "progress", call).await?;
          decode_list(&result, &notifier).map(|entries| ApiEvent::ProgressLoaded { task_id, entries })
        });
      }
    }
  }

  /// Change the open task's progress by `delta` percentage points.
  fn adjust_progress(&mut self, delta: f64) {
    self.save_progress_edit(|update| {
      update.progress = (update.progress + delta).clamp(0.0, 100.0);
    });
  }

  /// Move the open task to the next status.
  fn advance_status(&mut self) {
    self.save_progress_edit(|update| {
      update.status = store::next_status(&update.status).to_string();
    });
  }

  fn start_note(&mut self) {
    if !matches!(self.view_stack.last(), Some(ViewState::TaskDetail { .. })) {
      return;
    }
    if !self.role.can_update_progress() {
      self.deny();
      return;
    }
    self.note_input.clear();
    self.mode = Mode::Note;
  }

  /// Save the open task with `edit` applied to its current progress report.
  fn save_progress_edit<F>(&mut self, edit: F)
  where
    F: FnOnce(&mut ProgressUpdate),
  {
    let Some(ViewState::TaskDetail { task, .. }) = self.view_stack.last() else {
      return;
    };
    let task = (**task).clone();

    if !self.role.can_update_progress() {
      self.deny();
      return;
    }

    let unchanged = ProgressUpdate::from_task(&task);
    let mut update = unchanged.clone();
    edit(&mut update);
    if update == unchanged {
      return;
    }

    let employee_id = self.user_id.clone();
    self.spawn_load("save progress", move |client, notifier| async move {
      let call = store::save_progress(&client, &task, &update, employee_id.as_deref(), Utc::now());
      let saved = safe_call(&notifier, "save progress", call).await?;
      notifier.success("Task updated successfully");
      Some(ApiEvent::TaskUpdated {
        task_id: task.id,
        progress: saved.progress,
        status: saved.status.to_string(),
      })
    });
  }

  /// Show the task list's next status filter, ending with all tasks.
  fn cycle_status_filter(&mut self) {
    if !matches!(self.view_stack.last(), Some(ViewState::TaskList { .. })) {
      return;
    }
    self.status_filter = match self.status_filter {
      None => Some(TASK_STATUSES[0]),
      Some(current) => TASK_STATUSES
        .iter()
        .position(|s| *s == current)
        .and_then(|i| TASK_STATUSES.get(i + 1))
        .copied(),
    };
    self.clamp_selection();
  }

  /// Ask to delete the selected task (admins) or employee (user managers).
  fn request_delete(&mut self) {
    let (pending, allowed) = match self.view_stack.last() {
      Some(ViewState::TaskList { tasks, selected, .. }) => (
        self.visible_tasks(tasks).get(*selected).map(|t| PendingDelete::Task {
          id: t.id.clone(),
          label: t.label().to_string(),
        }),
        self.role.can_open(Screen::Admin),
      ),
      Some(ViewState::EmployeeList {
        employees, selected, ..
      }) => (
        self
          .visible_employees(employees)
          .get(*selected)
          .map(|e| PendingDelete::Employee {
            id: e.id.clone(),
            name: e.name.clone(),
          }),
        self.role.has_permission(Permission::ManageUsers),
      ),
      _ => return,
    };

    if !allowed {
      self.deny();
      return;
    }
    if let Some(pending) = pending {
      self.pending_delete = Some(pending);
      self.mode = Mode::Confirm;
    }
  }

  fn delete(&mut self, pending: PendingDelete) {
    match pending {
      PendingDelete::Task { id, .. } => {
        self.spawn_load("delete task", move |client, notifier| async move {
          safe_call(&notifier, "delete task", store::delete_task(&client, &id)).await?;
          notifier.success("Task deleted successfully");
          Some(ApiEvent::TaskDeleted(id))
        });
      }
      PendingDelete::Employee { id, .. } => {
        self.spawn_load("delete employee", move |client, notifier| async move {
          safe_call(&notifier, "delete employee", store::delete_employee(&client, &id)).await?;
          notifier.success("Employee deleted successfully");
          Some(ApiEvent::EmployeeDeleted(id))
        });
      }
    }
  }

  /// Run a background load and post its result back to the loop.
  fn spawn_load<F, Fut>(&self, context: &'static str, load: F)
  where
    F: FnOnce(ApiClient, ChannelNotifier) -> Fut + Send + 'static,
    Fut: Future<Output = Option<ApiEvent>> + Send + 'static,
  {
    let client = self.client.clone();
    let tx = self.event_tx.clone();
    debug!(context, "spawning load");

    tokio::spawn(async move {
      let notifier = ChannelNotifier::new(tx.clone());
      let event = load(client, notifier).await.unwrap_or(ApiEvent::LoadFailed);
      let _ = tx.send(Event::Api(event));
    });
  }

  fn handle_api_event(&mut self, event: ApiEvent) {
    match event {
      ApiEvent::RoleResolved { role, user_id } => {
        info!(%role, user_id = ?user_id, "role resolved");
        self.role = role;
        self.user_id = user_id;
        self.load_current();
      }
      ApiEvent::TasksLoaded(loaded) => {
        if let Some(ViewState::TaskList {
          tasks,
          selected,
          loading,
        }) = self.view_stack.first_mut()
        {
          *tasks = loaded;
          *selected = 0;
          *loading = false;
        }
      }
      ApiEvent::EmployeesLoaded(loaded) => {
        if let Some(ViewState::EmployeeList {
          employees,
          selected,
          loading,
        }) = self.view_stack.first_mut()
        {
          *employees = loaded;
          *selected = 0;
          *loading = false;
        }
      }
      ApiEvent::DashboardLoaded { tasks, employees } => {
        if let Some(ViewState::Dashboard { summary, loading }) = self.view_stack.first_mut() {
          *summary = Some(kpi::summarize(&tasks, &employees, Utc::now()));
          *loading = false;
        }
      }
      ApiEvent::ProgressLoaded { task_id, entries: loaded } => {
        if let Some(ViewState::TaskDetail {
          task,
          entries,
          loading,
        }) = self.view_stack.last_mut()
        {
          if task.id == task_id {
            *entries = loaded;
            *loading = false;
          }
        }
      }
      ApiEvent::TaskUpdated {
        task_id,
        progress,
        status,
      } => {
        for view in &mut self.view_stack {
          let task = match view {
            ViewState::TaskList { tasks, .. } => tasks.iter_mut().find(|t| t.id == task_id),
            ViewState::TaskDetail { task, .. } if task.id == task_id => Some(task.as_mut()),
            _ => None,
          };
          if let Some(task) = task {
            task.progress = progress;
            task.status = status.clone();
          }
        }
        if matches!(self.view_stack.last(), Some(ViewState::TaskDetail { .. })) {
          self.load_current();
        }
      }
      ApiEvent::TaskDeleted(task_id) => {
        self
          .view_stack
          .retain(|view| !matches!(view, ViewState::TaskDetail { task, .. } if task.id == task_id));
        if let Some(ViewState::TaskList { tasks, .. }) = self.view_stack.first_mut() {
          tasks.retain(|t| t.id != task_id);
        }
        self.clamp_selection();
      }
      ApiEvent::EmployeeDeleted(employee_id) => {
        if let Some(ViewState::EmployeeList { employees, .. }) = self.view_stack.first_mut() {
          employees.retain(|e| e.id != employee_id);
        }
        self.clamp_selection();
      }
      ApiEvent::LoadFailed => {
        if let Some(view) = self.view_stack.last_mut() {
          view.set_loading(false);
        }
      }
    }
  }

  fn handle_notice(&mut self, notice: Notice) {
    match notice {
      Notice::Loading(true) => self.in_flight += 1,
      Notice::Loading(false) => self.in_flight = self.in_flight.saturating_sub(1),
      Notice::Error(text) => self.set_status(StatusKind::Error, &text),
      Notice::Success(text) => self.set_status(StatusKind::Success, &text),
      Notice::SessionExpired => {
        info!("session expired, signing out");
        self.session.sign_out();
        self.role = Role::default();
        self.user_id = None;
      }
    }
  }

  fn set_status(&mut self, kind: StatusKind, text: &str) {
    self.status = Some(StatusMessage {
      text: text.to_string(),
      kind,
      shown_at: Instant::now(),
    });
  }

  fn expire_status(&mut self) {
    if let Some(status) = &self.status {
      if status.shown_at.elapsed() >= status.lifetime() {
        self.status = None;
      }
    }
  }

  fn visible_len(&self) -> usize {
    match self.view_stack.last() {
      Some(ViewState::TaskList { tasks, .. }) => self.visible_tasks(tasks).len(),
      Some(ViewState::EmployeeList { employees, .. }) => self.visible_employees(employees).len(),
      _ => 0,
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.visible_len();
    if len == 0 {
      return;
    }
    if let Some(
      ViewState::TaskList { selected, .. } | ViewState::EmployeeList { selected, .. },
    ) = self.view_stack.last_mut()
    {
      *selected = (*selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  fn clamp_selection(&mut self) {
    let len = self.visible_len();
    if let Some(
      ViewState::TaskList { selected, .. } | ViewState::EmployeeList { selected, .. },
    ) = self.view_stack.last_mut()
    {
      *selected = (*selected).min(len.saturating_sub(1));
    }
  }

  fn enter_selected(&mut self) {
    let task = match self.view_stack.last() {
      Some(ViewState::TaskList { tasks, selected, .. }) => {
        self.visible_tasks(tasks).get(*selected).map(|t| (*t).clone())
      }
      _ => None,
    };

    if let Some(task) = task {
      self.view_stack.push(ViewState::TaskDetail {
        task: Box::new(task),
        entries: Vec::new(),
        loading: true,
      });
      self.load_current();
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> Option<&ViewState> {
    self.view_stack.last()
  }

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn command_input(&self) -> &str {
    &self.command_input
  }

  pub fn search_filter(&self) -> &str {
    &self.search_filter
  }

  pub fn status_filter(&self) -> Option<&'static str> {
    self.status_filter
  }

  pub fn note_input(&self) -> &str {
    &self.note_input
  }

  pub fn pending_delete(&self) -> Option<&PendingDelete> {
    self.pending_delete.as_ref()
  }

  pub fn title(&self) -> &str {
    self.config.title.as_deref().unwrap_or("KPI Dashboard")
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn user_email(&self) -> Option<String> {
    self.session.current().map(|identity| identity.email)
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight > 0
  }

  pub fn status(&self) -> Option<&StatusMessage> {
    self.status.as_ref()
  }

  /// Tasks matching the search and status filters, in list order
  pub fn visible_tasks<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
    let filter = self.search_filter.to_lowercase();
    tasks
      .iter()
      .filter(|t| store::matches_status(t, self.status_filter))
      .filter(|t| {
        filter.is_empty()
          || t.label().to_lowercase().contains(&filter)
          || t.status.to_lowercase().contains(&filter)
          || t.employee_id.to_lowercase().contains(&filter)
      })
      .collect()
  }

  /// Employees matching the search filter, in list order
  pub fn visible_employees<'a>(&self, employees: &'a [Employee]) -> Vec<&'a Employee> {
    let filter = self.search_filter.to_lowercase();
    employees
      .iter()
      .filter(|e| {
        filter.is_empty()
          || e.name.to_lowercase().contains(&filter)
          || e.email.to_lowercase().contains(&filter)
      })
      .collect()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn autocomplete_suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.command_input)
  }

  pub fn selected_suggestion(&self) -> usize {
    self.selected_suggestion
  }
}

impl ViewState {
  /// Get the label for this view in the breadcrumb
  fn breadcrumb_label(&self) -> String {
    match self {
      ViewState::TaskList { .. } => "Tasks".to_string(),
      ViewState::EmployeeList { .. } => "Employees".to_string(),
      ViewState::Dashboard { .. } => "Dashboard".to_string(),
      ViewState::TaskDetail { task, .. } => {
        if task.id.is_empty() {
          "Task".to_string()
        } else {
          format!("Task {}", task.id)
        }
      }
    }
  }
}

/// Tasks and (when visible to the role) employees, fetched side by side.
async fn load_dashboard(
  client: &ApiClient,
  notifier: &ChannelNotifier,
  scope: &TaskScope,
  with_employees: bool,
) -> Option<ApiEvent> {
  type Call<'a> = BoxFuture<'a, std::result::Result<NormalizedResult, ApiError>>;

  let mut calls: Vec<(String, Call<'_>)> =
    vec![("tasks".to_string(), store::fetch_tasks(client, scope).boxed())];
  if with_employees {
    calls.push(("employees".to_string(), store::fetch_employees(client).boxed()));
  }

  notifier.loading(true);
  let outcome = client.batch(calls).await;
  notifier.loading(false);

  for (name, err) in &outcome.errors {
    notifier.error(&format!("Failed to load {}: {}", name, err.user_message()));
  }
  if outcome.results.is_empty() {
    return None;
  }

  let mut tasks = Vec::new();
  let mut employees = Vec::new();
  for (name, result) in &outcome.results {
    match name.as_str() {
      "tasks" => tasks = decode_list(result, notifier).unwrap_or_default(),
      "employees" => employees = decode_list(result, notifier).unwrap_or_default(),
      _ => {}
    }
  }
  Some(ApiEvent::DashboardLoaded { tasks, employees })
}

fn decode_list<T: DeserializeOwned>(result: &NormalizedResult, notifier: &dyn Notifier) -> Option<Vec<T>> {
  match result.list() {
    Ok(items) => Some(items),
    Err(err) => {
      notifier.error(&err.user_message());
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::retry::testing::{RecordingSleeper, ScriptedTransport};
  use crate::api::retry::RetryPolicy;
  use crate::api::Action;
  use crate::auth::testing::make_token;
  use crate::auth::Identity;
  use crate::cache::ResponseCache;
  use serde_json::json;

  fn config(url: &str) -> Config {
    Config::parse(&format!("api:\n  url: {}\n", url)).unwrap()
  }

  fn app_with(transport: Arc<ScriptedTransport>, identity: Option<Identity>) -> App {
    let session = SessionIdentity::new(identity);
    let client = ApiClient::from_parts(
      transport,
      Arc::new(RecordingSleeper::default()),
      RetryPolicy::default(),
      session.clone(),
      Arc::new(ResponseCache::new(chrono::Duration::minutes(5))),
      Duration::from_secs(5),
    );
    App::new(config("https://example.com/exec"), client, session)
  }

  fn app() -> App {
    app_with(ScriptedTransport::always(Ok(json!([]))), None)
  }

  fn signed_in() -> Identity {
    Identity::from_token(&make_token(&json!({
      "sub": "1", "email": "ana@example.com", "exp": 4_000_000_000i64
    })))
    .unwrap()
  }

  fn task(id: &str, title: &str, progress: f64) -> Task {
    Task {
      id: id.to_string(),
      title: title.to_string(),
      status: "in_progress".to_string(),
      progress,
      ..Task::default()
    }
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
      app.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn run_command(app: &mut App, command: &str) {
    app.handle_key(key(KeyCode::Char(':')));
    type_text(app, command);
    app.handle_key(key(KeyCode::Enter));
  }

  /// Let spawned loads run until `action` shows up in the transport log.
  async fn wait_for(transport: &ScriptedTransport, action: Action) -> Vec<Action> {
    for _ in 0..500 {
      if transport.sent().iter().any(|s| s.action == action) {
        break;
      }
      tokio::task::yield_now().await;
    }
    transport.sent().iter().map(|s| s.action).collect()
  }

  #[tokio::test]
  async fn test_tasks_loaded_fill_root_view() {
    let mut app = app();
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));

    match app.current_view() {
      Some(ViewState::TaskList { tasks, loading, .. }) => {
        assert_eq!(tasks.len(), 1);
        assert!(!loading);
      }
      other => panic!("unexpected view: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_employee_cannot_open_employees() {
    let mut app = app();
    app.handle_api_event(ApiEvent::RoleResolved {
      role: Role::Employee,
      user_id: Some("emp1".into()),
    });

    run_command(&mut app, "employees");

    assert!(matches!(app.current_view(), Some(ViewState::TaskList { .. })));
    assert_eq!(app.status().map(|s| s.kind), Some(StatusKind::Error));
  }

  #[tokio::test]
  async fn test_supervisor_opens_employees() {
    let mut app = app();
    app.handle_api_event(ApiEvent::RoleResolved {
      role: Role::Supervisor,
      user_id: Some("sup-001".into()),
    });

    run_command(&mut app, "employees");

    assert!(matches!(
      app.current_view(),
      Some(ViewState::EmployeeList { loading: true, .. })
    ));
    assert_eq!(app.view_breadcrumb(), vec!["Employees"]);
  }

  #[tokio::test]
  async fn test_unknown_command_reports_error() {
    let mut app = app();
    run_command(&mut app, "xyz");
    assert_eq!(app.status().map(|s| s.text.as_str()), Some("Unknown command: xyz"));
  }

  #[tokio::test]
  async fn test_task_scope_follows_role() {
    let mut app = app_with(ScriptedTransport::always(Ok(json!([]))), Some(signed_in()));

    app.role = Role::Supervisor;
    app.user_id = Some("sup-001".into());
    assert_eq!(app.task_scope().unwrap().cache_key(), "tasks:supervisor:sup-001");

    app.role = Role::Admin;
    app.user_id = None;
    assert_eq!(app.task_scope(), Ok(TaskScope::All));

    app.role = Role::Employee;
    assert!(app.task_scope().is_err());
  }

  #[tokio::test]
  async fn test_anonymous_session_sees_all_tasks() {
    let app = app();
    assert_eq!(app.task_scope(), Ok(TaskScope::All));
  }

  #[tokio::test]
  async fn test_employee_without_id_loads_nothing() {
    let transport = ScriptedTransport::always(Ok(json!([])));
    let mut app = app_with(transport.clone(), Some(signed_in()));

    app.handle_api_event(ApiEvent::RoleResolved {
      role: Role::Employee,
      user_id: None,
    });
    for _ in 0..20 {
      tokio::task::yield_now().await;
    }

    assert!(transport.sent().is_empty());
    assert_eq!(
      app.status().map(|s| s.text.as_str()),
      Some(store::MISSING_EMPLOYEE_ID)
    );
    assert!(matches!(
      app.current_view(),
      Some(ViewState::TaskList { loading: false, .. })
    ));
  }

  #[tokio::test]
  async fn test_search_filters_and_enter_opens_detail() {
    let mut app = app();
    app.handle_api_event(ApiEvent::TasksLoaded(vec![
      task("T1", "Write report", 20.0),
      task("T2", "Client meeting", 40.0),
    ]));

    app.handle_key(key(KeyCode::Char('/')));
    type_text(&mut app, "client");
    app.handle_key(key(KeyCode::Enter));
    app.handle_key(key(KeyCode::Enter));

    match app.current_view() {
      Some(ViewState::TaskDetail { task, loading, .. }) => {
        assert_eq!(task.id, "T2");
        assert!(loading);
      }
      other => panic!("unexpected view: {:?}", other),
    }
    assert_eq!(app.view_breadcrumb(), vec!["Tasks", "Task T2"]);
  }

  #[tokio::test]
  async fn test_status_filter_cycles() {
    let mut app = app();
    let mut done = task("T2", "Client meeting", 100.0);
    done.status = "completed".into();
    let mut fresh = task("T3", "Plan offsite", 0.0);
    fresh.status = "not-started".into();
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0), done, fresh]));

    let visible = |app: &App| match app.current_view() {
      Some(ViewState::TaskList { tasks, .. }) => {
        app.visible_tasks(tasks).iter().map(|t| t.id.clone()).collect::<Vec<_>>()
      }
      _ => Vec::new(),
    };

    app.handle_key(key(KeyCode::Char('f')));
    assert_eq!(app.status_filter(), Some("not_started"));
    assert_eq!(visible(&app), vec!["T3"]);

    app.handle_key(key(KeyCode::Char('f')));
    app.handle_key(key(KeyCode::Char('f')));
    assert_eq!(visible(&app), vec!["T2"]);

    app.handle_key(key(KeyCode::Char('f')));
    assert_eq!(app.status_filter(), None);
    assert_eq!(visible(&app).len(), 3);
  }

  #[tokio::test]
  async fn test_task_updated_propagates_progress() {
    let mut app = app();
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));
    app.handle_key(key(KeyCode::Enter));

    app.handle_api_event(ApiEvent::TaskUpdated {
      task_id: "T1".into(),
      progress: 30.0,
      status: "completed".into(),
    });

    match app.current_view() {
      Some(ViewState::TaskDetail { task, .. }) => {
        assert_eq!(task.progress, 30.0);
        assert_eq!(task.status, "completed");
      }
      other => panic!("unexpected view: {:?}", other),
    }
    app.handle_key(key(KeyCode::Char('q')));
    match app.current_view() {
      Some(ViewState::TaskList { tasks, .. }) => assert_eq!(tasks[0].progress, 30.0),
      other => panic!("unexpected view: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_plus_saves_progress_and_history() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let mut app = app_with(transport.clone(), None);
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));
    app.handle_key(key(KeyCode::Enter));

    app.handle_key(key(KeyCode::Char('+')));
    let sent = wait_for(&transport, Action::AddProgress).await;

    assert!(sent.contains(&Action::UpdateTaskProgress));
    assert!(sent.contains(&Action::AddProgress));
    let log = transport.sent();
    let update = log
      .iter()
      .find(|s| s.action == Action::UpdateTaskProgress)
      .expect("progress update sent");
    assert_eq!(update.envelope.data.get("progress"), Some(&json!(30)));
    assert_eq!(update.envelope.data.get("status"), Some(&json!("in_progress")));
  }

  #[tokio::test]
  async fn test_note_is_recorded_with_progress_entry() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let mut app = app_with(transport.clone(), None);
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));
    app.handle_key(key(KeyCode::Enter));

    app.handle_key(key(KeyCode::Char('n')));
    assert_eq!(*app.mode(), Mode::Note);
    type_text(&mut app, "Outline done");
    assert_eq!(app.note_input(), "Outline done");
    app.handle_key(key(KeyCode::Enter));
    wait_for(&transport, Action::AddProgress).await;

    let log = transport.sent();
    let entry = log
      .iter()
      .find(|s| s.action == Action::AddProgress)
      .expect("progress entry sent");
    assert_eq!(entry.envelope.data.get("notes"), Some(&json!("Outline done")));
    assert_eq!(entry.envelope.data.get("progress"), Some(&json!(20)));
    assert_eq!(*app.mode(), Mode::Normal);
  }

  #[tokio::test]
  async fn test_status_key_advances_status() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let mut app = app_with(transport.clone(), None);
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 100.0)]));
    app.handle_key(key(KeyCode::Enter));

    app.handle_key(key(KeyCode::Char('s')));
    wait_for(&transport, Action::AddProgress).await;

    let log = transport.sent();
    let entry = log
      .iter()
      .find(|s| s.action == Action::AddProgress)
      .expect("progress entry sent");
    assert_eq!(entry.envelope.data.get("status"), Some(&json!("completed")));
  }

  #[tokio::test]
  async fn test_admin_deletes_task_after_confirming() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let mut app = app_with(transport.clone(), None);
    app.role = Role::Admin;
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));

    app.handle_key(key(KeyCode::Char('d')));
    assert_eq!(*app.mode(), Mode::Confirm);
    assert_eq!(
      app.pending_delete().map(PendingDelete::prompt).as_deref(),
      Some("Delete task \"Write report\"? (y/n)")
    );

    app.handle_key(key(KeyCode::Char('y')));
    let sent = wait_for(&transport, Action::DeleteTask).await;
    assert!(sent.contains(&Action::DeleteTask));
    assert_eq!(*app.mode(), Mode::Normal);

    app.handle_api_event(ApiEvent::TaskDeleted("T1".into()));
    match app.current_view() {
      Some(ViewState::TaskList { tasks, .. }) => assert!(tasks.is_empty()),
      other => panic!("unexpected view: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_declined_delete_sends_nothing() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let mut app = app_with(transport.clone(), None);
    app.role = Role::Admin;
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));

    app.handle_key(key(KeyCode::Char('d')));
    app.handle_key(key(KeyCode::Char('n')));
    for _ in 0..20 {
      tokio::task::yield_now().await;
    }

    assert!(app.pending_delete().is_none());
    assert!(transport.sent().is_empty());
  }

  #[tokio::test]
  async fn test_employee_cannot_delete_tasks() {
    let mut app = app();
    app.handle_api_event(ApiEvent::TasksLoaded(vec![task("T1", "Write report", 20.0)]));

    app.handle_key(key(KeyCode::Char('d')));

    assert_eq!(*app.mode(), Mode::Normal);
    assert_eq!(app.status().map(|s| s.kind), Some(StatusKind::Error));
  }

  #[tokio::test]
  async fn test_session_expired_signs_out() {
    let mut app = app_with(ScriptedTransport::always(Ok(json!([]))), Some(signed_in()));
    app.role = Role::Admin;

    app.handle_notice(Notice::SessionExpired);

    assert_eq!(app.user_email(), None);
    assert_eq!(app.role(), Role::Employee);
  }

  #[tokio::test]
  async fn test_loading_counter() {
    let mut app = app();
    app.handle_notice(Notice::Loading(true));
    app.handle_notice(Notice::Loading(true));
    app.handle_notice(Notice::Loading(false));
    assert!(app.is_busy());
    app.handle_notice(Notice::Loading(false));
    app.handle_notice(Notice::Loading(false));
    assert!(!app.is_busy());
  }

  #[tokio::test]
  async fn test_unconfigured_backend_skips_loading() {
    let transport = ScriptedTransport::always(Ok(json!([])));
    let mut app = app_with(transport.clone(), None);
    app.config = config("https://script.google.com/macros/s/YOUR_SCRIPT_ID/exec");

    app.start();

    assert!(transport.sent().is_empty());
    assert_eq!(app.status().map(|s| s.kind), Some(StatusKind::Error));
  }

  #[tokio::test]
  async fn test_dashboard_batch_builds_summary() {
    let transport = ScriptedTransport::always(Ok(json!([
      {"id": "T1", "status": "completed", "progress": 100},
      {"id": "T2", "status": "in_progress", "progress": 50}
    ])));
    let app = app_with(transport, None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    let event = load_dashboard(&app.client, &notifier, &TaskScope::All, true).await;

    match event {
      Some(ApiEvent::DashboardLoaded { tasks, employees }) => {
        assert_eq!(tasks.len(), 2);
        assert_eq!(employees.len(), 2);
      }
      other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(rx.try_recv(), Ok(Event::Notice(Notice::Loading(true)))));
  }

  #[test]
  fn test_employee_delete_prompt_mentions_tasks() {
    let pending = PendingDelete::Employee {
      id: "emp1".into(),
      name: "Ana".into(),
    };
    assert!(pending.prompt().contains("reassigned"));
  }
}
