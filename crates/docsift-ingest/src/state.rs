//! Job state machine.
//!
//! Applies lifecycle transitions to the metadata store. Every transition is
//! a compare-and-swap against the status it was computed from, so two actors
//! racing on one document can never both win.

use docsift_core::lifecycle;
use docsift_core::{
    CasOutcome, DocumentRecord, DocumentStatus, Error, MetadataStore, Result, StoreError,
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::retry::RetryPolicy;

/// Result of a transition attempt that did not hit a store or lifecycle error.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The record now has the target status
    Applied(DocumentRecord),
    /// The record no longer exists
    Missing,
    /// The record was not in the expected status
    Conflict(DocumentStatus),
}

/// Applies status transitions for ingestion jobs.
#[derive(Clone)]
pub struct JobStateMachine {
    store: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
}

impl JobStateMachine {
    /// Create a state machine writing to `store`.
    pub fn new(store: Arc<dyn MetadataStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying metadata store.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Move document `id` from `from` to `to`.
    ///
    /// `detail` is recorded only for `FAILED`. An edge outside the lifecycle
    /// fails with [`Error::InvalidTransition`] before anything is written.
    /// Store errors are retried; if the final write reports the record
    /// already at `to` after an earlier attempt errored, the earlier write is
    /// taken to have landed.
    pub async fn transition(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        detail: Option<&str>,
    ) -> Result<Transition> {
        if !lifecycle::can_transition(from, to) {
            error!(
                "Refusing illegal transition {} -> {} for document {}",
                from, to, id
            );
            return Err(Error::InvalidTransition { id, from, to });
        }

        let what = format!("{from} -> {to} for {id}");
        let outcome = self
            .retry
            .run(&what, move |attempt| {
                self.try_transition(id, from, to, detail, attempt)
            })
            .await?;

        if let Transition::Applied(record) = &outcome {
            debug!("Document {} is now {}", id, record.status);
        }
        Ok(outcome)
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        detail: Option<&str>,
        attempt: u32,
    ) -> std::result::Result<Transition, StoreError> {
        let Some(current) = self.store.get(id).await? else {
            return Ok(Transition::Missing);
        };

        if current.status != from {
            if attempt > 0 && current.status == to {
                return Ok(Transition::Applied(current));
            }
            return Ok(Transition::Conflict(current.status));
        }

        // `from` matched and the edge was checked up front.
        let next = match lifecycle::apply(&current, to, detail) {
            Ok(next) => next,
            Err(e) => return Err(StoreError::Query(e.to_string())),
        };

        match self.store.compare_and_swap(from, &next).await? {
            CasOutcome::Applied => Ok(Transition::Applied(next)),
            CasOutcome::NotFound => Ok(Transition::Missing),
            CasOutcome::Conflict(actual) if attempt > 0 && actual == to => {
                Ok(self
                    .store
                    .get(id)
                    .await?
                    .map_or(Transition::Missing, Transition::Applied))
            }
            CasOutcome::Conflict(actual) => Ok(Transition::Conflict(actual)),
        }
    }
}
