use candela_core::{ExchangeId, Timeframe, Trade, UnifiedCandle};
use std::collections::HashMap;

/// Outcome of folding one trade into the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// Trade landed in the current window
    Updated,
    /// Trade opened a new window; carries the finalized previous bar
    Closed(UnifiedCandle),
    /// First trade seen for this symbol
    Started,
    /// Trade belongs to an already-superseded window and was dropped
    Late,
}

/// Builds synthetic candles of one timeframe from raw trade prints
///
/// One in-progress bar per symbol. A print whose floored timestamp is past
/// the current bar closes it; prints older than the current bar are dropped.
#[derive(Debug)]
pub struct TradeAggregator {
    exchange: ExchangeId,
    timeframe: Timeframe,
    bars: HashMap<String, UnifiedCandle>,
    late_trades: u64,
}

impl TradeAggregator {
    pub fn new(exchange: ExchangeId, timeframe: Timeframe) -> Self {
        TradeAggregator {
            exchange,
            timeframe,
            bars: HashMap::new(),
            late_trades: 0,
        }
    }

    pub fn apply(&mut self, trade: &Trade) -> AggregateOutcome {
        let window = self.timeframe.floor(trade.timestamp);

        match self.bars.get_mut(&trade.symbol) {
            Some(bar) if window == bar.timestamp => {
                bar.apply_trade(trade.price, trade.size);
                AggregateOutcome::Updated
            }
            Some(bar) if window < bar.timestamp => {
                self.late_trades += 1;
                AggregateOutcome::Late
            }
            Some(bar) => {
                let next = Self::seed(&self.exchange, self.timeframe, trade);
                let finished = std::mem::replace(bar, next);
                AggregateOutcome::Closed(finished.closed())
            }
            None => {
                let bar = Self::seed(&self.exchange, self.timeframe, trade);
                self.bars.insert(trade.symbol.clone(), bar);
                AggregateOutcome::Started
            }
        }
    }

    /// Current in-progress bar for a symbol
    pub fn current(&self, symbol: &str) -> Option<&UnifiedCandle> {
        self.bars.get(symbol)
    }

    pub fn late_trades(&self) -> u64 {
        self.late_trades
    }

    /// Forget a symbol's in-progress bar
    pub fn remove(&mut self, symbol: &str) -> Option<UnifiedCandle> {
        self.bars.remove(symbol)
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    fn seed(exchange: &ExchangeId, timeframe: Timeframe, trade: &Trade) -> UnifiedCandle {
        UnifiedCandle::from_price(
            exchange.clone(),
            trade.symbol.clone(),
            timeframe,
            trade.timestamp,
            trade.price,
            trade.size,
        )
    }
}
