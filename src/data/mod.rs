pub mod batch;
pub mod cache;
pub mod parse;
pub mod store;
pub mod types;

pub use batch::{Batch, BatchSource, CellValue, JsonDirSource, Row};
pub use cache::QuoteCache;
pub use store::{DataStore, MemoryStore};
pub use types::{
    day_bucket, normalize_ticker, Bar, BarInterval, BarKey, HistoryPeriod, NewsArticle, NewsKey, Quote,
    QuoteKey, SourceHealthRecord, SourceStatus,
};
