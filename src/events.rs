use crate::data::types::SourceStatus;
use crate::services::importer::ImportStats;
use crate::services::worker::WorkerState;

/// Notifications for downstream consumers of curated data.
#[derive(Clone, Debug)]
pub enum CuratorEvent {
    QuoteIngested {
        ticker: String,
        price: f64,
        source: String,
        persisted: bool,
    },
    NewsIngested {
        source: String,
        fetched: usize,
        persisted: usize,
    },
    BarsIngested {
        ticker: String,
        source: String,
        fetched: usize,
        persisted: usize,
    },
    SourceStatusChanged {
        source: String,
        from: SourceStatus,
        to: SourceStatus,
    },
    ImportCompleted {
        batch: String,
        stats: ImportStats,
    },
    WorkerStateChanged(WorkerState),
}
