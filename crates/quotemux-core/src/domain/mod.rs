mod interval;
mod quote;
mod series;
mod symbol;
mod timestamp;

pub use interval::{Interval, Range};
pub use quote::{QuoteFields, UnifiedQuote};
pub use series::{PricePoint, PriceSeries};
pub use symbol::{classify, AssetClass, SecurityIdentifier, Symbol};
pub use timestamp::UtcDateTime;
