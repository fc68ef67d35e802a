pub mod cache;
pub mod live_data_manager;
pub mod quality;

pub use cache::{CachedEntry, QuoteCache};
pub use live_data_manager::LiveDataManager;
pub use quality::{DataQuality, DataQualityValidator, Freshness};
