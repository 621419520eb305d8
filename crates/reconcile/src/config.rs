use candela_core::Timeframe;
use std::time::Duration;

/// Post-reconnect backfill settings
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Latest cached bar older than this triggers a fetch
    pub threshold: Duration,
    /// Pause between consecutive REST requests
    pub request_delay: Duration,
    /// History fetched for symbols with nothing cached, in bars
    pub lookback_bars: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        BackfillConfig {
            threshold: Duration::from_secs(5 * 60),
            request_delay: Duration::from_millis(100),
            lookback_bars: 60,
        }
    }
}

/// Boundary-triggered coarser fetch settings
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Closes of this timeframe drive boundary checks
    pub trigger: Timeframe,
    /// Coarser timeframes refreshed at their boundaries
    pub timeframes: Vec<Timeframe>,
    /// Concurrent requests per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_delay: Duration,
    /// How long a processed boundary is remembered
    pub retention: Duration,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        BoundaryConfig {
            trigger: Timeframe::M1,
            timeframes: vec![Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1],
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    pub backfill: BackfillConfig,
    pub boundary: BoundaryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.backfill.threshold, Duration::from_secs(300));
        assert_eq!(config.backfill.request_delay, Duration::from_millis(100));
        assert_eq!(config.backfill.lookback_bars, 60);
        assert_eq!(config.boundary.batch_size, 5);
        assert_eq!(config.boundary.trigger, Timeframe::M1);
        assert!(config.boundary.timeframes.contains(&Timeframe::H4));
    }
}
