//! Signed-in identity, roles and permissions.
//!
//! The identity provider issues a signed JWT. We never verify the signature
//! (the backend does); the payload is only read to fill in who the user is and
//! when the token stops being worth sending.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock, PoisonError};
use thiserror::Error;

use crate::api::UserCredentials;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
  #[error("identity token is not a JWT (expected three dot-separated parts)")]
  NotAJwt,
  #[error("identity token payload is not valid base64: {0}")]
  Encoding(String),
  #[error("identity token payload is not valid JSON: {0}")]
  Payload(String),
}

#[derive(Debug, Deserialize)]
struct Claims {
  sub: String,
  #[serde(default)]
  email: String,
  #[serde(default)]
  name: String,
  picture: Option<String>,
  exp: i64,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub sub: String,
  pub email: String,
  pub name: String,
  pub picture: Option<String>,
  pub token: String,
  pub expires_at: DateTime<Utc>,
}

impl Identity {
  /// Read the identity out of a JWT's payload segment.
  pub fn from_token(token: &str) -> Result<Self, TokenError> {
    let token = token.trim();
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(TokenError::NotAJwt);
    };

    // Some issuers pad the segment, URL_SAFE_NO_PAD does not accept that
    let bytes = URL_SAFE_NO_PAD
      .decode(payload.trim_end_matches('='))
      .map_err(|e| TokenError::Encoding(e.to_string()))?;
    let claims: Claims =
      serde_json::from_slice(&bytes).map_err(|e| TokenError::Payload(e.to_string()))?;

    let expires_at = Utc
      .timestamp_opt(claims.exp, 0)
      .single()
      .ok_or_else(|| TokenError::Payload(format!("exp out of range: {}", claims.exp)))?;

    Ok(Self {
      sub: claims.sub,
      email: claims.email,
      name: claims.name,
      picture: claims.picture,
      token: token.to_string(),
      expires_at,
    })
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }

  /// Credentials for an outgoing call. The token is only attached while it is
  /// still valid; the email always is.
  pub fn credentials(&self, now: DateTime<Utc>) -> UserCredentials {
    UserCredentials {
      email: self.email.clone(),
      token: (!self.is_expired(now)).then(|| self.token.clone()),
    }
  }
}

/// Accessor for the current identity, owned by whatever signs the user in.
pub trait IdentityProvider: Send + Sync {
  fn current(&self) -> Option<Identity>;
}

/// Identity fixed at startup (from the environment), replaceable on sign-out.
#[derive(Default)]
pub struct SessionIdentity {
  inner: RwLock<Option<Identity>>,
}

impl SessionIdentity {
  pub fn new(identity: Option<Identity>) -> Arc<Self> {
    Arc::new(Self {
      inner: RwLock::new(identity),
    })
  }

  pub fn sign_out(&self) {
    *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
  }
}

impl IdentityProvider for SessionIdentity {
  fn current(&self) -> Option<Identity> {
    self
      .inner
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

/// Coarse role returned by the backend for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
  Admin,
  Supervisor,
  #[default]
  Employee,
}

/// Capabilities granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  ReadAll,
  WriteAll,
  DeleteAll,
  ManageUsers,
  ManageTasks,
  ReadTeam,
  WriteTeam,
  ViewReports,
  ReadOwnTasks,
  WriteOwnTasks,
  UpdateProgress,
}

/// Areas of the dashboard a role can navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  Admin,
  Supervisor,
  Employee,
}

impl Role {
  /// Parse a role name. Unknown names fall back to the least-privileged role.
  pub fn parse(name: &str) -> Self {
    match name.trim().to_lowercase().as_str() {
      "admin" => Role::Admin,
      "supervisor" => Role::Supervisor,
      _ => Role::Employee,
    }
  }

  /// Role carried in a `getUserRole` response's `data.role`.
  pub fn from_role_data(data: Option<&Value>) -> Self {
    data
      .and_then(|d| d.get("role"))
      .and_then(Value::as_str)
      .map(Role::parse)
      .unwrap_or_default()
  }

  pub fn permissions(self) -> &'static [Permission] {
    use Permission::*;
    match self {
      Role::Admin => &[ReadAll, WriteAll, DeleteAll, ManageUsers, ManageTasks],
      Role::Supervisor => &[ReadTeam, WriteTeam, ManageTasks, ViewReports],
      Role::Employee => &[ReadOwnTasks, WriteOwnTasks, UpdateProgress],
    }
  }

  /// `WriteAll` implies every other permission.
  pub fn has_permission(self, permission: Permission) -> bool {
    let granted = self.permissions();
    granted.contains(&permission) || granted.contains(&Permission::WriteAll)
  }

  /// Own progress reports, or any task's for roles that manage tasks.
  pub fn can_update_progress(self) -> bool {
    self.has_permission(Permission::UpdateProgress) || self.has_permission(Permission::ManageTasks)
  }

  pub fn screens(self) -> &'static [Screen] {
    match self {
      Role::Admin => &[Screen::Admin, Screen::Supervisor, Screen::Employee],
      Role::Supervisor => &[Screen::Supervisor, Screen::Employee],
      Role::Employee => &[Screen::Employee],
    }
  }

  pub fn can_open(self, screen: Screen) -> bool {
    self.screens().contains(&screen)
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Role::Admin => "admin",
      Role::Supervisor => "supervisor",
      Role::Employee => "employee",
    })
  }
}


#[cfg(test)]
mod tests {
  use super::testing::make_token;
  use super::*;
  use serde_json::json;

  fn claims(exp: i64) -> Value {
    json!({
      "sub": "1234",
      "email": "ana@example.com",
      "name": "Ana Lima",
      "picture": "https://example.com/a.png",
      "exp": exp
    })
  }

  #[test]
  fn test_from_token_reads_claims() {
    let token = make_token(&claims(1_900_000_000));
    let identity = Identity::from_token(&token).unwrap();

    assert_eq!(identity.sub, "1234");
    assert_eq!(identity.email, "ana@example.com");
    assert_eq!(identity.name, "Ana Lima");
    assert_eq!(identity.picture.as_deref(), Some("https://example.com/a.png"));
    assert_eq!(identity.expires_at.timestamp(), 1_900_000_000);
    assert_eq!(identity.token, token);
  }

  #[test]
  fn test_from_token_rejects_garbage() {
    assert_eq!(Identity::from_token("nope"), Err(TokenError::NotAJwt));
    assert!(matches!(
      Identity::from_token("a.!!!.c"),
      Err(TokenError::Encoding(_))
    ));
  }

  #[test]
  fn test_expired_token_not_attached() {
    let identity = Identity::from_token(&make_token(&claims(1_000))).unwrap();
    let creds = identity.credentials(Utc::now());

    assert_eq!(creds.email, "ana@example.com");
    assert_eq!(creds.token, None);
  }

  #[test]
  fn test_valid_token_attached() {
    let identity = Identity::from_token(&make_token(&claims(4_000_000_000))).unwrap();
    let creds = identity.credentials(Utc::now());
    assert_eq!(creds.token.as_deref(), Some(identity.token.as_str()));
  }

  #[test]
  fn test_sign_out_clears_identity() {
    let identity = Identity::from_token(&make_token(&claims(4_000_000_000))).unwrap();
    let session = SessionIdentity::new(Some(identity));
    assert!(session.current().is_some());
    session.sign_out();
    assert!(session.current().is_none());
  }

  #[test]
  fn test_role_parse_and_fallback() {
    assert_eq!(Role::parse("Admin"), Role::Admin);
    assert_eq!(Role::parse("supervisor"), Role::Supervisor);
    assert_eq!(Role::parse("intern"), Role::Employee);
    assert_eq!(
      Role::from_role_data(Some(&json!({"role": "supervisor", "userId": "sup-001"}))),
      Role::Supervisor
    );
    assert_eq!(Role::from_role_data(Some(&json!({}))), Role::Employee);
    assert_eq!(Role::from_role_data(None), Role::Employee);
  }

  #[test]
  fn test_write_all_grants_everything() {
    assert!(Role::Admin.has_permission(Permission::UpdateProgress));
    assert!(Role::Supervisor.has_permission(Permission::ViewReports));
    assert!(!Role::Supervisor.has_permission(Permission::ManageUsers));
    assert!(!Role::Employee.has_permission(Permission::ManageTasks));
  }

  #[test]
  fn test_screens_by_role() {
    assert!(Role::Admin.can_open(Screen::Admin));
    assert!(Role::Supervisor.can_open(Screen::Supervisor));
    assert!(!Role::Supervisor.can_open(Screen::Admin));
    assert_eq!(Role::Employee.screens(), &[Screen::Employee]);
  }
}
