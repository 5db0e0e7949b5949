//! Session aggregation and status publishing
//!
//! Host reports are buffered per host and published as a single status line
//! after a short coalescing delay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SessionAggregator                         │
//! │                                                               │
//! │  update(host, table) ──► AggregateState (latest per host)     │
//! │          │                                                    │
//! │          └──► DebounceTimer: Idle ──► Pending ──► Idle         │
//! │                                          │                    │
//! │                                 render_status (pure)          │
//! │                                          │                    │
//! └──────────────────────────────────────────┼────────────────────┘
//!                                            ▼
//!                               PresencePublisher::publish
//! ```

pub mod aggregator;
pub mod debounce;

pub use aggregator::{AggregatorOptions, SessionAggregator};
pub use debounce::DebounceTimer;

use anyhow::Result;

/// Destination for rendered status lines (Discord, logs, test doubles)
pub trait PresencePublisher: Send + Sync {
    /// Returns the name of this publisher (for logging)
    fn name(&self) -> &'static str;

    /// Publish a status line. An empty line clears the status.
    fn publish(&self, status: &str) -> Result<()>;
}

/// Publisher that only writes the status to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl PresencePublisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&self, status: &str) -> Result<()> {
        tracing::info!("Status: {}", status);
        Ok(())
    }
}
