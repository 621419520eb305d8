//! Candela Reconcile
//!
//! Keeps cached candle history gap-free around disconnects and at
//! timeframe boundaries:
//! - Post-reconnect backfill of stale series
//! - Boundary-triggered, batched fetch of coarser timeframes
//! - Pure gap detection plus a cache-backed scanner
//!
//! ```text
//!  AdapterEvent ──► ReconciliationService
//!                     ├─ Connected (reconnected | gap) ──► Backfiller ──┐
//!                     └─ CandleClose on boundary ──► BoundaryFetcher ───┤
//!                                                                       ▼
//!                                              CandleFetcher ──► add_candle_if_newer
//! ```

pub mod backfill;
pub mod boundary;
pub mod config;
pub mod error;
pub mod gaps;
mod history;
pub mod service;

pub use backfill::{BackfillReport, BackfillRequest, Backfiller};
pub use boundary::{
    BoundaryFetcher, BoundaryJob, BoundaryReport, BoundaryTracker, TimeframeBoundary,
    close_instant,
};
pub use config::{BackfillConfig, BoundaryConfig, ReconcileConfig};
pub use error::{ReconcileError, ReconcileResult};
pub use gaps::{GapInfo, GapScanner, detect_gaps};
pub use service::ReconciliationService;
