//! Live queries.
//!
//! A watch yields the current state on its first `next()`, then a fresh
//! snapshot after each relevant change. Bursts of events from one edit are
//! coalesced into a single snapshot. A watch ends (`None`) once every
//! [`PolicyEngine`] handle is gone.

use crate::aggregator::ContractView;
use crate::engine::{EngineInner, PolicyEngine};
use crate::events::LedgerEvent;
use crate::ledger::LedgerEntry;
use crate::storage::DocumentStore;
use crate::{ContractNumber, PolicyError, Role};
use std::sync::Weak;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Relationships on one contract, optionally of one role.
pub struct RelationshipWatch<S> {
    engine: Weak<EngineInner<S>>,
    events: broadcast::Receiver<LedgerEvent>,
    contract_number: ContractNumber,
    role: Option<Role>,
    primed: bool,
}

impl<S: DocumentStore + Send + Sync + 'static> RelationshipWatch<S> {
    pub(crate) fn new(
        engine: &PolicyEngine<S>,
        contract_number: ContractNumber,
        role: Option<Role>,
    ) -> Self {
        Self {
            engine: engine.downgrade(),
            events: engine.events(),
            contract_number,
            role,
            primed: false,
        }
    }

    pub async fn next(&mut self) -> Option<Result<Vec<LedgerEntry>, PolicyError>> {
        if self.primed {
            let (contract_number, role) = (&self.contract_number, self.role);
            next_relevant(&mut self.events, |event| {
                event.contract_number() == Some(contract_number)
                    && event
                        .role()
                        .is_some_and(|changed| role.is_none_or(|wanted| wanted == changed))
            })
            .await?;
        }
        self.primed = true;

        let engine = PolicyEngine::from_inner(self.engine.upgrade()?);
        Some(
            engine
                .relationship_entries(&self.contract_number, self.role)
                .await,
        )
    }
}

/// The assembled view of one contract.
pub struct ContractWatch<S> {
    engine: Weak<EngineInner<S>>,
    events: broadcast::Receiver<LedgerEvent>,
    contract_number: ContractNumber,
    primed: bool,
}

impl<S: DocumentStore + Send + Sync + 'static> ContractWatch<S> {
    pub(crate) fn new(engine: &PolicyEngine<S>, contract_number: ContractNumber) -> Self {
        Self {
            engine: engine.downgrade(),
            events: engine.events(),
            contract_number,
            primed: false,
        }
    }

    /// Person edits may touch any contract, so they always trigger a refresh.
    pub async fn next(&mut self) -> Option<Result<ContractView, PolicyError>> {
        if self.primed {
            let contract_number = &self.contract_number;
            next_relevant(&mut self.events, |event| match event {
                LedgerEvent::PersonChanged { .. } => true,
                other => other.contract_number() == Some(contract_number),
            })
            .await?;
        }
        self.primed = true;

        let engine = PolicyEngine::from_inner(self.engine.upgrade()?);
        Some(engine.build_contract_view(&self.contract_number).await)
    }
}

/// Wait for a relevant event, then drop whatever else is already queued.
/// Returns `None` when the bus is closed.
async fn next_relevant(
    events: &mut broadcast::Receiver<LedgerEvent>,
    relevant: impl Fn(&LedgerEvent) -> bool,
) -> Option<()> {
    loop {
        match events.recv().await {
            Ok(event) if relevant(&event) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "live query lagged, refreshing");
                break;
            }
            Err(RecvError::Closed) => return None,
        }
    }

    loop {
        match events.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Some(()),
        }
    }
}
