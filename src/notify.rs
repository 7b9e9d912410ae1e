//! User-facing notifications for remote calls.

use std::future::Future;
use tracing::{error, info};

use crate::api::ApiError;

/// Fire-and-forget sink for call progress and outcomes.
pub trait Notifier: Send + Sync {
  fn loading(&self, active: bool);
  fn error(&self, message: &str);
  fn success(&self, message: &str);

  /// The backend rejected our credentials; the session should end.
  fn session_expired(&self) {}
}

/// Notifier for one-shot commands: everything goes to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn loading(&self, _active: bool) {}

  fn error(&self, message: &str) {
    error!("{}", message);
  }

  fn success(&self, message: &str) {
    info!("{}", message);
  }
}

/// Run `call` with the loading indicator on, reporting any error through
/// `notifier` instead of returning it.
pub async fn safe_call<T, Fut>(notifier: &dyn Notifier, context: &str, call: Fut) -> Option<T>
where
  Fut: Future<Output = Result<T, ApiError>>,
{
  notifier.loading(true);
  let result = call.await;
  notifier.loading(false);

  match result {
    Ok(result) => Some(result),
    Err(err) => {
      error!(context, error = %err, "api call failed");
      notifier.error(&err.user_message());
      if err.is_auth() {
        notifier.session_expired();
      }
      None
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use std::sync::Mutex;

  /// Notifier that records every notification in order.
  #[derive(Default)]
  pub struct RecordingNotifier {
    pub events: Mutex<Vec<String>>,
  }

  impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
      self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
      self.events.lock().unwrap().push(event);
    }
  }

  impl Notifier for RecordingNotifier {
    fn loading(&self, active: bool) {
      self.push(format!("loading:{}", active));
    }

    fn error(&self, message: &str) {
      self.push(format!("error:{}", message));
    }

    fn success(&self, message: &str) {
      self.push(format!("success:{}", message));
    }

    fn session_expired(&self) {
      self.push("session_expired".to_string());
    }
  }
}
