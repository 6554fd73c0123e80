//! Message envelope carrying identity and causality metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MessageId;

/// Wraps a message or event body with its id and causality chain.
///
/// `causation_id` points at the message that directly caused this one;
/// `correlation_id` points at the root of the conversation and is inherited
/// unchanged by everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: MessageId,
    pub body: T,
    pub created_at: DateTime<Utc>,
    pub causation_id: Option<MessageId>,
    pub correlation_id: Option<MessageId>,
}

impl<T> Envelope<T> {
    /// Creates a root envelope with a fresh id and no causality.
    pub fn new(body: T) -> Self {
        Self {
            id: MessageId::random(),
            body,
            created_at: Utc::now(),
            causation_id: None,
            correlation_id: None,
        }
    }

    /// Creates an envelope caused by `self`.
    ///
    /// The correlation id is inherited from `self`, or set to `self.id` when
    /// `self` is the root of the conversation.
    pub fn caused<U>(&self, body: U) -> Envelope<U> {
        Envelope {
            id: MessageId::random(),
            body,
            created_at: Utc::now(),
            causation_id: Some(self.id.clone()),
            correlation_id: Some(
                self.correlation_id
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            ),
        }
    }

    /// Maps the body while keeping the envelope metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            id: self.id,
            body: f(self.body),
            created_at: self.created_at,
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_envelope_has_no_causality() {
        let env = Envelope::new(42);
        assert!(env.causation_id.is_none());
        assert!(env.correlation_id.is_none());
    }

    #[test]
    fn caused_envelope_links_to_parent_and_root() {
        let root = Envelope::new("place order");
        let child = root.caused("order placed");
        assert_eq!(child.causation_id.as_ref(), Some(&root.id));
        assert_eq!(child.correlation_id.as_ref(), Some(&root.id));

        let grandchild = child.caused("decrease stock");
        assert_eq!(grandchild.causation_id.as_ref(), Some(&child.id));
        assert_eq!(grandchild.correlation_id.as_ref(), Some(&root.id));
        assert_ne!(grandchild.id, child.id);
    }

    #[test]
    fn map_keeps_metadata() {
        let env = Envelope::new(2).map(|n| n * 10);
        assert_eq!(env.body, 20);
    }
}
