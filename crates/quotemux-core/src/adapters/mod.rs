//! Provider adapters translating canonical requests into provider APIs.

mod alphavantage;
mod polygon;
pub mod testing;
mod yahoo;

pub use alphavantage::AlphavantageAdapter;
pub use polygon::PolygonAdapter;
pub use yahoo::YahooAdapter;

use std::sync::Arc;

use crate::config::Credentials;
use crate::data_source::DataSource;
use crate::http_client::HttpClient;
use crate::ProviderId;

/// Build the default adapter for a provider, wired to the given transport
/// and credentials.
pub fn build_adapter(
    provider: ProviderId,
    http: Arc<dyn HttpClient>,
    credentials: &Credentials,
) -> Arc<dyn DataSource> {
    match provider {
        ProviderId::Yahoo => Arc::new(YahooAdapter::new(http)),
        ProviderId::Polygon => Arc::new(PolygonAdapter::new(
            http,
            credentials.polygon_api_key.clone(),
        )),
        ProviderId::Alphavantage => Arc::new(AlphavantageAdapter::new(
            http,
            credentials.alphavantage_api_key.clone(),
        )),
    }
}
