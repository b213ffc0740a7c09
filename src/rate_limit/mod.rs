//! Rate Limiting Module
//!
//! Per-identity admission control in front of the quota check.
//!
//! # Features
//!
//! - Fixed-window counter (default 10 requests per 60 s per identity)
//! - Window restarts at the first request after it expires, not on an epoch grid
//! - Idle entries are swept on an interval and the table is bounded
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RateLimiter                  │
//! │   clock ──► RwLock<WindowTable> ◄── sweeper  │
//! ├──────────────────────────────────────────────┤
//! │  WindowTable: identity → {count,             │
//! │               window_start, last_seen}       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod manager;
pub mod store;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::RateLimitConfig;
pub use manager::{RateLimitResult, RateLimiter};
pub use store::{Admission, WindowEntry, WindowTable};
