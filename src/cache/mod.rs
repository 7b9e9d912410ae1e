//! Generic response caching.
//!
//! Entries live for a fixed TTL measured against an injectable [`Clock`], and
//! can be dropped early by key substring. The cache knows nothing about the
//! remote API; callers choose the keys (e.g. `"tasks:all"`).

mod clock;
mod response;

#[cfg(test)]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use response::ResponseCache;
