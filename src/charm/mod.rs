mod channel;
mod series;
mod url;

pub use channel::Channel;
pub use series::{series_rank, BUNDLE_SERIES};
pub use url::CharmUrl;
