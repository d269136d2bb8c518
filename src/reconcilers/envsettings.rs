//! Env-settings reconciler.
//!
//! Settings objects carry no remote state of their own; the reconciler
//! keeps their status honest and exists chiefly as the wake target for
//! snapshot changes: when the matching per-environment snapshot moves,
//! the settings key re-reconciles and its overrides flow into the next
//! binding pass.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, Resource};
use crate::domain::models::EnvSettings;
use crate::domain::ports::store::ResourceStore;
use crate::runtime::{
    condition, set_condition, ReconcileOutcome, Reconciler, CONDITION_READY,
};

/// Reconciler for [`EnvSettings`].
pub struct EnvSettingsReconciler {
    store: Arc<dyn ResourceStore>,
}

impl EnvSettingsReconciler {
    /// New reconciler over the store.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Reconciler for EnvSettingsReconciler {
    fn kind(&self) -> Kind {
        Kind::EnvSettings
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let mut settings: EnvSettings = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if settings.meta.is_terminating() {
            return Ok(ReconcileOutcome::Done);
        }

        if !settings.spec.overrides.is_null() && settings.spec.overrides.as_map().is_none() {
            return Err(ReconcileError::InvalidInput(format!(
                "spec.overrides: expected object, got {}",
                settings.spec.overrides.type_name()
            )));
        }

        let generation = settings.meta.generation;
        let mut changed = false;
        if settings.observed_generation() != generation {
            settings.set_observed_generation(generation);
            changed = true;
        }
        changed |= set_condition(
            settings.conditions_mut(),
            condition(
                CONDITION_READY,
                ConditionStatus::True,
                "Reconciled",
                "overrides accepted",
                generation,
            ),
        );

        if changed {
            match self.store.update_status(settings.into()).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => return Ok(ReconcileOutcome::Requeue),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}
