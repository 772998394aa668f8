//! Request coordination for one control instance.
//!
//! The host drives the control through explicit entry points (`update_view`, `refresh`,
//! `destroy`) and observes it through a `watch` channel of [`ControlSnapshot`]s.
//! Overlapping computations are resolved by a request sequence: only the most recently
//! started request may apply its result.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::autosave::{AutoSave, DEFAULT_AUTO_SAVE_DELAY};
use crate::pipeline::ResolutionPipeline;
use crate::store::{EnvironmentStore, FieldMetadata, RecordStore, SaveTrigger};
use crate::types::{BoundInputs, RequestKey};

/// External services the control consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub environment: Arc<dyn EnvironmentStore>,
    pub metadata: Arc<dyn FieldMetadata>,
    pub saver: Arc<dyn SaveTrigger>,
}

/// Per-instance settings supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Logical name of the field the composite value is written to.
    pub bound_field: String,
    /// Delay before an auto-save fires.
    pub auto_save_delay_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            bound_field: String::new(),
            auto_save_delay_ms: DEFAULT_AUTO_SAVE_DELAY.as_millis() as u64,
        }
    }
}

impl ControlSettings {
    pub fn for_field(bound_field: impl Into<String>) -> Self {
        Self {
            bound_field: bound_field.into(),
            ..Default::default()
        }
    }

    pub fn auto_save_delay(&self) -> Duration {
        Duration::from_millis(self.auto_save_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Idle,
    Computing,
    Error,
}

/// What the rendering surface shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub value: String,
    pub loading: bool,
    pub error: Option<String>,
    pub state: ControlState,
}

/// Result of one entry-point call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Inputs matched the last started request (or the control is destroyed).
    Unchanged,
    /// Result applied; `changed` tells whether the emitted value differs.
    Applied { changed: bool },
    /// Computation failed and the error was surfaced.
    Failed,
    /// A newer request started meanwhile; the result was dropped.
    Superseded,
}

struct ControlInner {
    /// Monotonic request sequence; the latest value owns the output.
    request_seq: u64,
    last_key: Option<RequestKey>,
    last_inputs: BoundInputs,
    destroyed: bool,
}

pub struct CompositeControl {
    pipeline: ResolutionPipeline,
    auto_save: AutoSave,
    inner: Mutex<ControlInner>,
    outputs: watch::Sender<ControlSnapshot>,
}

impl CompositeControl {
    /// Initialize with the host's current bindings. The emitted value starts as the
    /// value already persisted in the bound field.
    pub fn new(collaborators: Collaborators, settings: ControlSettings, initial: BoundInputs) -> Self {
        let pipeline = ResolutionPipeline::new(
            collaborators.records,
            collaborators.environment,
            collaborators.metadata,
            settings.bound_field.clone(),
        );
        let auto_save = AutoSave::new(collaborators.saver, settings.auto_save_delay());
        let (outputs, _) = watch::channel(ControlSnapshot {
            value: initial.bound_value.clone().unwrap_or_default(),
            loading: false,
            error: None,
            state: ControlState::Idle,
        });

        Self {
            pipeline,
            auto_save,
            inner: Mutex::new(ControlInner {
                request_seq: 0,
                last_key: None,
                last_inputs: initial,
                destroyed: false,
            }),
            outputs,
        }
    }

    pub fn outputs(&self) -> ControlSnapshot {
        self.outputs.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSnapshot> {
        self.outputs.subscribe()
    }

    /// Current request sequence value.
    pub fn request_seq(&self) -> u64 {
        self.inner().request_seq
    }

    /// Host update: recompute when `(config, entity id, entity name)` changed since the
    /// last started request.
    pub async fn update_view(&self, inputs: BoundInputs) -> UpdateOutcome {
        let request = {
            let mut inner = self.inner();
            if inner.destroyed {
                return UpdateOutcome::Unchanged;
            }
            inner.last_inputs = inputs.clone();
            let key = inputs.key();
            if inner.last_key.as_ref() == Some(&key) {
                return UpdateOutcome::Unchanged;
            }
            inner.last_key = Some(key);
            inner.request_seq += 1;
            self.outputs.send_modify(|snapshot| {
                snapshot.loading = true;
                snapshot.error = None;
                snapshot.state = ControlState::Computing;
            });
            inner.request_seq
        };

        debug!(request, entity = ?inputs.entity_name, "Composite computation started");
        let result = self.pipeline.compute(&inputs).await;

        let inner = self.inner();
        if inner.request_seq != request {
            debug!(request, latest = inner.request_seq, "Dropping superseded result");
            return UpdateOutcome::Superseded;
        }

        match result {
            Ok(composition) => {
                let mut changed = false;
                self.outputs.send_modify(|snapshot| {
                    changed = snapshot.value != composition.value;
                    snapshot.value = composition.value;
                    snapshot.loading = false;
                    snapshot.error = None;
                    snapshot.state = ControlState::Idle;
                });
                drop(inner);

                info!(request, changed, "Composite value resolved");
                if changed && composition.auto_save {
                    self.auto_save.schedule();
                }
                UpdateOutcome::Applied { changed }
            }
            Err(e) => {
                let message = e.user_message();
                self.outputs.send_modify(|snapshot| {
                    snapshot.value = String::new();
                    snapshot.loading = false;
                    snapshot.error = Some(message.clone());
                    snapshot.state = ControlState::Error;
                });
                drop(inner);

                warn!(request, kind = e.kind(), error = %message, "Composite computation failed");
                UpdateOutcome::Failed
            }
        }
    }

    /// User-initiated refresh: forget the tracked request key, clear cached environment
    /// configuration, re-arm auto-save and recompute from the last seen inputs.
    pub async fn refresh(&self) -> UpdateOutcome {
        let inputs = {
            let mut inner = self.inner();
            if inner.destroyed {
                return UpdateOutcome::Unchanged;
            }
            inner.last_key = None;
            inner.last_inputs.clone()
        };
        self.pipeline.resolver().clear_cache();
        self.auto_save.reset();
        info!("Composite refresh requested");
        self.update_view(inputs).await
    }

    /// Teardown: in-flight results are dropped and pending saves aborted.
    pub fn destroy(&self) {
        {
            let mut inner = self.inner();
            inner.destroyed = true;
            inner.request_seq += 1;
        }
        self.pipeline.resolver().clear_cache();
        self.auto_save.cancel_pending();
        info!("Composite control destroyed");
    }

    pub fn auto_save_fired(&self) -> bool {
        self.auto_save.has_fired()
    }

    fn inner(&self) -> MutexGuard<'_, ControlInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::{
        MemoryEnvironmentStore, MemoryRecordStore, RecordingSaveTrigger, StaticFieldMetadata,
    };
    use serde_json::json;

    struct Harness {
        control: CompositeControl,
        records: Arc<MemoryRecordStore>,
        saver: Arc<RecordingSaveTrigger>,
    }

    fn harness(bound_value: Option<&str>) -> Harness {
        let records = Arc::new(MemoryRecordStore::new().with_record(
            "account",
            json!({ "accountid": "a1", "name": "Contoso", "city": "Oslo" })
                .as_object()
                .cloned()
                .unwrap(),
        ));
        let saver = Arc::new(RecordingSaveTrigger::new());
        let collaborators = Collaborators {
            records: records.clone(),
            environment: Arc::new(MemoryEnvironmentStore::new()),
            metadata: Arc::new(StaticFieldMetadata::new()),
            saver: saver.clone(),
        };
        let initial = BoundInputs {
            bound_value: bound_value.map(str::to_string),
            ..Default::default()
        };
        Harness {
            control: CompositeControl::new(
                collaborators,
                ControlSettings::for_field("new_summary"),
                initial,
            ),
            records,
            saver,
        }
    }

    fn inputs(config: &str) -> BoundInputs {
        BoundInputs {
            config_raw: Some(config.to_string()),
            entity_id: Some("a1".to_string()),
            entity_name: Some("account".to_string()),
            bound_value: None,
        }
    }

    const NAME_ROW: &str = r#"{"rows":[[{"fieldname":"name"}]]}"#;

    #[tokio::test]
    async fn initial_value_is_bound_value() {
        let h = harness(Some("persisted"));
        let snapshot = h.control.outputs();
        assert_eq!(snapshot.value, "persisted");
        assert_eq!(snapshot.state, ControlState::Idle);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn unchanged_inputs_do_not_refetch() {
        let h = harness(None);
        let first = h.control.update_view(inputs(NAME_ROW)).await;
        assert_eq!(first, UpdateOutcome::Applied { changed: true });

        let second = h.control.update_view(inputs(NAME_ROW)).await;
        assert_eq!(second, UpdateOutcome::Unchanged);
        assert_eq!(h.records.fetch_count(), 1);
        assert_eq!(h.control.outputs().value, "Contoso");
        assert_eq!(h.control.request_seq(), 1);
    }

    #[tokio::test]
    async fn bound_value_change_alone_does_not_recompute() {
        let h = harness(None);
        h.control.update_view(inputs(NAME_ROW)).await;
        let mut edited = inputs(NAME_ROW);
        edited.bound_value = Some("typed by user".into());
        assert_eq!(h.control.update_view(edited).await, UpdateOutcome::Unchanged);
    }

    #[tokio::test]
    async fn failure_clears_value_and_sets_error() {
        let h = harness(Some("old"));
        let outcome = h
            .control
            .update_view(inputs(r#"{"source":"contact"}"#))
            .await;
        assert_eq!(outcome, UpdateOutcome::Failed);

        let snapshot = h.control.outputs();
        assert_eq!(snapshot.value, "");
        assert_eq!(snapshot.state, ControlState::Error);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("No fields referenced in rows or formatted output")
        );
    }

    #[tokio::test]
    async fn success_after_error_returns_to_idle() {
        let h = harness(None);
        h.control.update_view(inputs("{oops")).await;
        assert_eq!(h.control.outputs().state, ControlState::Error);

        h.control.update_view(inputs(NAME_ROW)).await;
        let snapshot = h.control.outputs();
        assert_eq!(snapshot.state, ControlState::Idle);
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.value, "Contoso");
    }

    #[tokio::test]
    async fn refresh_recomputes_same_inputs() {
        let h = harness(None);
        h.control.update_view(inputs(NAME_ROW)).await;
        let outcome = h.control.refresh().await;
        assert_eq!(outcome, UpdateOutcome::Applied { changed: false });
        assert_eq!(h.records.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_value_does_not_auto_save() {
        let h = harness(Some("Contoso"));
        let outcome = h.control.update_view(inputs(NAME_ROW)).await;
        assert_eq!(outcome, UpdateOutcome::Applied { changed: false });
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(h.saver.save_count(), 0);
        assert!(!h.control.auto_save_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_save_disabled_by_config() {
        let h = harness(None);
        h.control
            .update_view(inputs(r#"{"autoSave":false,"rows":[[{"fieldname":"name"}]]}"#))
            .await;
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(h.saver.save_count(), 0);
    }

    #[tokio::test]
    async fn destroyed_control_ignores_updates() {
        let h = harness(None);
        h.control.destroy();
        assert_eq!(h.control.update_view(inputs(NAME_ROW)).await, UpdateOutcome::Unchanged);
        assert_eq!(h.control.refresh().await, UpdateOutcome::Unchanged);
        assert_eq!(h.records.fetch_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_applied_value() {
        let h = harness(None);
        let mut rx = h.control.subscribe();
        h.control.update_view(inputs(NAME_ROW)).await;
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.value, "Contoso");
        assert!(!snapshot.loading);
    }
}
