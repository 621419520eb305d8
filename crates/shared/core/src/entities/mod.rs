mod candle;
mod ticker;
mod trade;

pub use candle::UnifiedCandle;
pub use ticker::{Ticker, change_from_percent};
pub use trade::Trade;
