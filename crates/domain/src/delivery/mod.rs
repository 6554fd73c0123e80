//! Guards against duplicate message delivery.
//!
//! - [`AtMostOnce`] remembers which message ids a recipient has seen and
//!   runs the handler only for the first delivery of each.
//! - [`AtLeastOnce`] durably records a message before it is handled so a
//!   recovery scan can find it after a crash.
//!
//! Together they give an exactly-once effect on top of redelivering senders.

mod at_least_once;
mod at_most_once;

pub use at_least_once::{
    AT_LEAST_ONCE_STREAM_TYPE, AtLeastOnce, AtLeastOnceEntity, DeliveryLog, DeliveryRecord,
    EventStoreDeliveryLog,
};
pub use at_most_once::{
    AT_MOST_ONCE_STREAM_TYPE, AtMostOnce, AtMostOnceEntity, Delivery, MessageReceived,
    SeenMessages,
};
