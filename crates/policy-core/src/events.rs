//! Change events for live queries.
//!
//! The engine emits one event per committed change. Events only say *what*
//! changed; subscribers re-fetch the state they care about.

use crate::primitives::DEFAULT_EVENT_CAPACITY;
use crate::{ContractNumber, ContractStatus, PersonId, RelationshipId, Role};
use tokio::sync::broadcast;

/// A committed change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    RelationshipAttached {
        contract_number: ContractNumber,
        relationship_id: RelationshipId,
        role: Role,
    },
    RelationshipDetached {
        contract_number: ContractNumber,
        relationship_id: RelationshipId,
        role: Role,
    },
    AttributesChanged {
        contract_number: ContractNumber,
        relationship_id: RelationshipId,
        role: Role,
    },
    /// Status, plan or options of a contract changed.
    ContractChanged {
        contract_number: ContractNumber,
        status: ContractStatus,
    },
    PersonChanged {
        person_id: PersonId,
    },
}

impl LedgerEvent {
    /// The contract the event belongs to. Person changes belong to none.
    #[must_use]
    pub fn contract_number(&self) -> Option<&ContractNumber> {
        match self {
            Self::RelationshipAttached {
                contract_number, ..
            }
            | Self::RelationshipDetached {
                contract_number, ..
            }
            | Self::AttributesChanged {
                contract_number, ..
            }
            | Self::ContractChanged {
                contract_number, ..
            } => Some(contract_number),
            Self::PersonChanged { .. } => None,
        }
    }

    /// The relationship role the event touches, if any.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::RelationshipAttached { role, .. }
            | Self::RelationshipDetached { role, .. }
            | Self::AttributesChanged { role, .. } => Some(*role),
            Self::ContractChanged { .. } | Self::PersonChanged { .. } => None,
        }
    }
}

/// Broadcast channel for [`LedgerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to every subscriber.
    pub fn emit(&self, event: LedgerEvent) {
        tracing::trace!(?event, "ledger event");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
