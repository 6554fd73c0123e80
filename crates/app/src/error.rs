//! Application error types.

use common::StreamId;
use event_store::EventStoreError;
use runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// The saga did not bring the stock to the expected level in time.
    #[error("Stock of {product_id} is {actual}, expected {expected}")]
    StockMismatch {
        product_id: StreamId,
        expected: u64,
        actual: u64,
    },
}
