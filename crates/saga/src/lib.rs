//! Saga layer: routing journal events to saga instances and coordinating
//! saga instances through a per-type manager.
//!
//! - [`SagaRouter`] follows a typed journal and forwards each event to the
//!   saga instance its correlation function names.
//! - [`SagaManagerEntity`] tracks running sagas of one type and broadcasts
//!   events to them until every one acknowledges.
//! - [`DecreaseStockOnShipment`] is the sample saga tying orders to inventory.

pub mod decrease_stock;
pub mod error;
pub mod journal;
pub mod manager;
pub mod router;

pub use decrease_stock::{DECREASE_STOCK_SAGA_TYPE, DecreaseStockOnShipment, OrderJournalEvent};
pub use error::{Result, SagaError};
pub use journal::{JournalEvent, decoded_journal};
pub use manager::{
    MANAGER_ID, SagaManagerBehaviour, SagaManagerClient, SagaManagerCommand, SagaManagerEntity,
    SagaManagerEvent, SagaManagerState, SagaMessage,
};
pub use router::{Correlate, SagaRouter};
