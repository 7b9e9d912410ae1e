use chrono::Utc;
use color_eyre::Result;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::IdentityProvider;
use crate::cache::ResponseCache;
use crate::config::Config;

use super::action::Action;
use super::envelope::{Payload, RequestEnvelope};
use super::error::ApiError;
use super::normalize::NormalizedResult;
use super::retry::{Orchestrator, RetryPolicy, Sleeper, TokioSleeper};
use super::transport::{HttpTransport, Transport};

/// Named outcome of a batch: which calls succeeded and which failed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
  pub results: Vec<(String, NormalizedResult)>,
  pub errors: Vec<(String, ApiError)>,
}

/// Client for the spreadsheet script endpoint.
///
/// Every call goes through the retry orchestrator. Reads can be routed
/// through [`ApiClient::cached`]; writes are expected to call
/// [`ApiClient::invalidate`] with the affected key prefix.
#[derive(Clone)]
pub struct ApiClient {
  orchestrator: Orchestrator,
  identity: Arc<dyn IdentityProvider>,
  cache: Arc<ResponseCache<NormalizedResult>>,
  probe_timeout: Duration,
}

impl ApiClient {
  pub fn new(config: &Config, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
    let api = &config.api;
    let transport = HttpTransport::new(&api.url, api.timeout())?;
    let cache = ResponseCache::new(api.cache_ttl());

    Ok(Self::from_parts(
      Arc::new(transport),
      Arc::new(TokioSleeper),
      api.retry_policy(),
      identity,
      Arc::new(cache),
      api.probe_timeout(),
    ))
  }

  pub fn from_parts(
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    identity: Arc<dyn IdentityProvider>,
    cache: Arc<ResponseCache<NormalizedResult>>,
    probe_timeout: Duration,
  ) -> Self {
    Self {
      orchestrator: Orchestrator::new(transport, sleeper, policy),
      identity,
      cache,
      probe_timeout,
    }
  }

  /// Call `action` with `data`, retrying per the configured policy.
  pub async fn call(&self, action: Action, data: Payload) -> Result<NormalizedResult, ApiError> {
    let identity = Arc::clone(&self.identity);
    self
      .orchestrator
      .run(move || {
        let user = identity.current().map(|id| id.credentials(Utc::now()));
        RequestEnvelope::new(action, data.clone(), user)
      })
      .await
  }

  /// Serve `key` from the cache while fresh, otherwise run `fetch` and cache
  /// its successful result.
  pub async fn cached<F, Fut>(&self, key: &str, fetch: F) -> Result<NormalizedResult, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<NormalizedResult, ApiError>>,
  {
    if let Some(hit) = self.cache.get(key) {
      debug!(key, "cache hit");
      return Ok(hit);
    }

    let result = fetch().await?;
    if result.is_success() {
      self.cache.set(key, result.clone());
    }
    Ok(result)
  }

  /// Drop cached entries whose key contains `pattern`, or all of them.
  pub fn invalidate(&self, pattern: Option<&str>) {
    let removed = self.cache.invalidate(pattern);
    debug!(pattern = ?pattern, removed, "cache invalidated");
  }

  /// Run independent calls concurrently and collect them once all settle.
  ///
  /// Results keep input order within each list.
  pub async fn batch<Fut>(&self, calls: Vec<(String, Fut)>) -> BatchOutcome
  where
    Fut: Future<Output = Result<NormalizedResult, ApiError>>,
  {
    let (names, futures): (Vec<String>, Vec<Fut>) = calls.into_iter().unzip();
    let settled = join_all(futures).await;

    let mut outcome = BatchOutcome::default();
    for (name, result) in names.into_iter().zip(settled) {
      match result {
        Ok(r) => outcome.results.push((name, r)),
        Err(e) => {
          debug!(call = %name, error = %e, "batch call failed");
          outcome.errors.push((name, e));
        }
      }
    }
    outcome
  }

  /// Check that the backend answers `test`, giving up after the probe timeout.
  ///
  /// Never fails: problems come back as a failed result.
  pub async fn probe(&self) -> NormalizedResult {
    info!(timeout = ?self.probe_timeout, "probing backend");
    match tokio::time::timeout(self.probe_timeout, self.call(Action::Test, Payload::new())).await {
      Ok(Ok(result)) => result,
      Ok(Err(e)) => NormalizedResult::from(e),
      Err(_) => NormalizedResult::failure("Timeout"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::action::TransportKind;
  use crate::api::retry::testing::{RecordingSleeper, ScriptedTransport};
  use crate::auth::testing::make_token;
  use crate::auth::{Identity, SessionIdentity};
  use serde_json::json;

  fn client_with(transport: Arc<ScriptedTransport>, identity: Option<Identity>) -> ApiClient {
    ApiClient::from_parts(
      transport,
      Arc::new(RecordingSleeper::default()),
      RetryPolicy {
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
      },
      SessionIdentity::new(identity),
      Arc::new(ResponseCache::new(chrono::Duration::minutes(5))),
      Duration::from_millis(200),
    )
  }

  fn identity(exp: i64) -> Identity {
    Identity::from_token(&make_token(&json!({
      "sub": "1", "email": "ana@example.com", "name": "Ana", "exp": exp
    })))
    .unwrap()
  }

  #[tokio::test]
  async fn test_call_attaches_identity() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let client = client_with(transport.clone(), Some(identity(4_000_000_000)));

    client.call(Action::AddTask, Payload::new()).await.unwrap();

    let user = transport.sent()[0].envelope.user.clone().unwrap();
    assert_eq!(user.email, "ana@example.com");
    assert!(user.token.is_some());
  }

  #[tokio::test]
  async fn test_call_drops_expired_token() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let client = client_with(transport.clone(), Some(identity(1_000)));

    client.call(Action::AddTask, Payload::new()).await.unwrap();

    let user = transport.sent()[0].envelope.user.clone().unwrap();
    assert_eq!(user.token, None);
  }

  #[tokio::test]
  async fn test_call_without_identity_sends_no_user() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true})));
    let client = client_with(transport.clone(), None);

    client.call(Action::Ping, Payload::new()).await.unwrap();

    assert!(transport.sent()[0].envelope.user.is_none());
  }

  #[tokio::test]
  async fn test_cached_serves_second_read() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true, "data": [1]})));
    let client = client_with(transport.clone(), None);

    for _ in 0..2 {
      let result = client
        .cached("tasks:all", || client.call(Action::GetTasks, Payload::new()))
        .await
        .unwrap();
      assert_eq!(result.data(), Some(&json!([1])));
    }
    assert_eq!(transport.sent().len(), 1);

    client.invalidate(Some("tasks"));
    client
      .cached("tasks:all", || client.call(Action::GetTasks, Payload::new()))
      .await
      .unwrap();
    assert_eq!(transport.sent().len(), 2);
  }

  #[tokio::test]
  async fn test_cached_does_not_store_errors() {
    let transport = ScriptedTransport::always(Err(ApiError::Auth("HTTP 401".into())));
    let client = client_with(transport.clone(), None);

    for _ in 0..2 {
      let _ = client
        .cached("employees:all", || client.call(Action::GetEmployees, Payload::new()))
        .await;
    }
    assert_eq!(transport.sent().len(), 2);
  }

  #[tokio::test]
  async fn test_batch_tolerates_partial_failure() {
    let transport = ScriptedTransport::new(vec![
      Ok(json!({"success": true, "data": []})),
      Err(ApiError::Auth("HTTP 403".into())),
    ]);
    let client = client_with(transport, None);

    let outcome = client
      .batch(vec![
        ("tasks".to_string(), client.call(Action::GetTasks, Payload::new())),
        ("employees".to_string(), client.call(Action::AddEmployee, Payload::new())),
      ])
      .await;

    assert_eq!(outcome.results.len() + outcome.errors.len(), 2);
  }

  #[tokio::test]
  async fn test_probe_reports_failure_instead_of_error() {
    let transport = ScriptedTransport::always(Err(ApiError::Deployment("text/html".into())));
    let client = client_with(transport.clone(), None);

    let result = client.probe().await;

    assert!(!result.is_success());
    assert!(result.error().unwrap().contains("HTML"));
    assert_eq!(transport.sent()[0].kind, TransportKind::Get);
  }

  #[tokio::test]
  async fn test_probe_success() {
    let transport = ScriptedTransport::always(Ok(json!({"success": true, "message": "ok"})));
    let client = client_with(transport, None);

    assert!(client.probe().await.is_success());
  }
}
