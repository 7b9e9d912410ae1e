//! Client for the spreadsheet script backend.
//!
//! Layers, leaf first: [`action`] picks the transport, [`transport`] moves
//! bytes, [`normalize`] folds bodies into [`NormalizedResult`], [`retry`]
//! drives attempts, [`client`] adds identity, caching and batching, and
//! [`facades`] names the remote operations.

pub mod action;
pub mod client;
pub mod envelope;
pub mod error;
pub mod facades;
pub mod normalize;
pub mod retry;
pub mod transport;
pub mod types;

pub use action::{Action, TransportKind};
pub use client::{ApiClient, BatchOutcome};
pub use envelope::{payload, Payload, RequestEnvelope, UserCredentials};
pub use error::ApiError;
pub use normalize::NormalizedResult;
pub use transport::Transport;
pub use types::{Employee, ProgressEntry, Task};
