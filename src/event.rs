use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::{Employee, ProgressEntry, Task};
use crate::auth::Role;
use crate::notify::Notifier;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and status expiry
  Tick,
  /// Data arriving from a background call
  Api(ApiEvent),
  /// Notification raised by a background call
  Notice(Notice),
}

#[derive(Debug)]
pub enum ApiEvent {
  RoleResolved {
    role: Role,
    user_id: Option<String>,
  },
  TasksLoaded(Vec<Task>),
  EmployeesLoaded(Vec<Employee>),
  DashboardLoaded {
    tasks: Vec<Task>,
    employees: Vec<Employee>,
  },
  ProgressLoaded {
    task_id: String,
    entries: Vec<ProgressEntry>,
  },
  /// A write finished; views showing the task should reload
  TaskUpdated {
    task_id: String,
    progress: f64,
    status: String,
  },
  TaskDeleted(String),
  EmployeeDeleted(String),
  /// A load finished without data (the error was already noticed)
  LoadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Loading(bool),
  Error(String),
  Success(String),
  SessionExpired,
}

/// Notifier that forwards to the event loop, for use from spawned tasks.
#[derive(Clone)]
pub struct ChannelNotifier {
  tx: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
  pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
    Self { tx }
  }

  fn send(&self, notice: Notice) {
    // The loop has exited when the receiver is gone
    let _ = self.tx.send(Event::Notice(notice));
  }
}

impl Notifier for ChannelNotifier {
  fn loading(&self, active: bool) {
    self.send(Notice::Loading(active));
  }

  fn error(&self, message: &str) {
    self.send(Notice::Error(message.to_string()));
  }

  fn success(&self, message: &str) {
    self.send(Notice::Success(message.to_string()));
  }

  fn session_expired(&self) {
    self.send(Notice::SessionExpired);
  }
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let input_tx = tx.clone();

    // Spawn terminal event reader
    tokio::spawn(async move {
      loop {
        if event::poll(tick_rate).unwrap_or(false) {
          if let Ok(CrosstermEvent::Key(key)) = event::read() {
            if input_tx.send(Event::Key(key)).is_err() {
              break;
            }
          }
        } else if input_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks to post events into the loop
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
