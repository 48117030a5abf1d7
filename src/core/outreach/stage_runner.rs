// Stage runner - walks the handle registry and advances each handle through
// the two-stage outreach sequence.
//
// Each send-and-record pair is one unit: the timestamp write is awaited
// before the next handle is considered, so a committed flag is durable before
// any further transport call. If the send succeeds but the flag write fails,
// the run aborts; the transport's duplicate-content detection makes the
// single replay on the next run safe.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::registry::{OutreachStore, Stage, StoreError};

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Soft outcomes of a transport call. Hard failures are errors and abort the
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The transport already saw this exact text. Retryable on a later run
    /// with a fresh random message choice, never fatal.
    Duplicate,
}

/// Trait for the outbound messaging collaborator.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: &str) -> Result<SendOutcome, OutreachError>;
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("invalid outreach config: {0}")]
    Config(String),
    #[error("message transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Room a candidate must leave for the mention prefix: "@" plus a handle of
/// up to 15 characters plus the separating space.
const MENTION_OVERHEAD: usize = 17;

/// Configuration for the stage runner.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Candidate texts for the stage-1 message.
    pub stage_one_messages: Vec<String>,
    /// Candidate texts for the stage-2 message.
    pub stage_two_messages: Vec<String>,
    /// Hard cap on transport calls per run, protection against a
    /// misconfigured run spamming the whole registry at once.
    pub max_sends_per_run: usize,
    /// Pause after every successful send, sampled uniformly.
    pub throttle_secs: RangeInclusive<u64>,
    /// Shorter pause after a duplicate-content outcome.
    pub duplicate_backoff_secs: RangeInclusive<u64>,
    /// The transport's maximum message length.
    pub max_message_len: usize,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            stage_one_messages: vec![
                "Hi! We think you might like what we are building - https://example.com"
                    .to_string(),
            ],
            stage_two_messages: vec![
                "Also, we are probably cheaper than the competition https://example.com/prices"
                    .to_string(),
                "Also, our feature list is longer than the Mississippi https://example.com/features"
                    .to_string(),
                "Also, our team page has some very nice photos https://example.com/team"
                    .to_string(),
            ],
            max_sends_per_run: 10,
            throttle_secs: 30..=120,
            duplicate_backoff_secs: 10..=20,
            max_message_len: 280,
        }
    }
}

impl OutreachConfig {
    /// Checks the invariants the runner relies on. Every candidate must fit
    /// the transport limit with the mention prefix included.
    pub fn validate(&self) -> Result<(), String> {
        if self.stage_one_messages.is_empty() || self.stage_two_messages.is_empty() {
            return Err("both message candidate lists must be non-empty".to_string());
        }
        if self.max_sends_per_run == 0 {
            return Err("max sends per run must be at least 1".to_string());
        }
        if self.throttle_secs.is_empty() || self.duplicate_backoff_secs.is_empty() {
            return Err("pause ranges must satisfy min <= max".to_string());
        }
        for candidate in self
            .stage_one_messages
            .iter()
            .chain(self.stage_two_messages.iter())
        {
            if candidate.chars().count() + MENTION_OVERHEAD > self.max_message_len {
                return Err(format!(
                    "message candidate too long for transport limit of {}: {}",
                    self.max_message_len, candidate
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// STAGE RUNNER
// ============================================================================

/// Counts reported after one outreach run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Messages the transport accepted.
    pub sent: usize,
    /// Sends skipped because the transport reported duplicate content.
    pub duplicates: usize,
    /// Handles already at the terminal stage.
    pub complete: usize,
}

pub struct StageRunner<T: MessageTransport> {
    store: Arc<dyn OutreachStore>,
    transport: T,
    config: OutreachConfig,
    rng: StdRng,
}

impl<T: MessageTransport> StageRunner<T> {
    /// Creates a runner with a validated config and an explicit randomness
    /// source (seedable for deterministic tests).
    pub fn new(
        store: Arc<dyn OutreachStore>,
        transport: T,
        config: OutreachConfig,
        rng: StdRng,
    ) -> Result<Self, OutreachError> {
        config.validate().map_err(OutreachError::Config)?;
        Ok(Self {
            store,
            transport,
            config,
            rng,
        })
    }

    /// Walks the registry in handle order and advances each handle one stage
    /// at most. Stops once the per-run cap of transport calls is reached;
    /// remaining handles are picked up on the next run.
    pub async fn run(&mut self) -> Result<RunSummary, OutreachError> {
        let handles = self.store.all_handles().await?;
        let mut summary = RunSummary::default();

        for record in handles {
            if summary.sent + summary.duplicates >= self.config.max_sends_per_run {
                info!(
                    cap = self.config.max_sends_per_run,
                    "per-run send cap reached, leaving remaining handles for the next run"
                );
                break;
            }

            let stage = record.stage();
            let candidate = match stage {
                Stage::New => self.pick(true),
                Stage::FirstSent => self.pick(false),
                Stage::Complete => {
                    summary.complete += 1;
                    continue;
                }
            };

            let message = format!("@{} {}", record.handle, candidate);
            debug!(handle = %record.handle, ?stage, "sending outreach message");

            match self.transport.send(&message).await? {
                SendOutcome::Sent => {
                    let now = Utc::now();
                    match stage {
                        Stage::New => self.store.mark_first_sent(&record.handle, now).await?,
                        Stage::FirstSent => {
                            self.store.mark_second_sent(&record.handle, now).await?
                        }
                        Stage::Complete => {}
                    }
                    summary.sent += 1;
                    info!(handle = %record.handle, ?stage, at = %now, "outreach message sent");
                    self.pause(self.config.throttle_secs.clone()).await;
                }
                SendOutcome::Duplicate => {
                    // Stage fields stay untouched; the handle is retried on a
                    // later run with a fresh random candidate.
                    summary.duplicates += 1;
                    warn!(handle = %record.handle, "transport reported duplicate content, retrying next run");
                    self.pause(self.config.duplicate_backoff_secs.clone()).await;
                }
            }
        }

        Ok(summary)
    }

    fn pick(&mut self, first_stage: bool) -> String {
        let list = if first_stage {
            &self.config.stage_one_messages
        } else {
            &self.config.stage_two_messages
        };
        // Non-empty per validate().
        let index = self.rng.gen_range(0..list.len());
        list[index].clone()
    }

    async fn pause(&mut self, range: RangeInclusive<u64>) {
        let secs = self.rng.gen_range(range);
        if secs > 0 {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{FileRecord, HandleRecord};
    use crate::infra::registry::MemoryOutreachStore;
    use rand::SeedableRng;
    use std::sync::Mutex;

    /// Transport fake that records every message and answers from a script.
    struct ScriptedTransport {
        sent: Mutex<Vec<String>>,
        script: Mutex<Vec<Result<SendOutcome, String>>>,
    }

    impl ScriptedTransport {
        fn accepting() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                script: Mutex::new(Vec::new()),
            }
        }

        fn scripted(outcomes: Vec<Result<SendOutcome, String>>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                script: Mutex::new(outcomes),
            }
        }

        fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageTransport for Arc<ScriptedTransport> {
        async fn send(&self, message: &str) -> Result<SendOutcome, OutreachError> {
            self.sent.lock().unwrap().push(message.to_string());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(SendOutcome::Sent);
            }
            script.remove(0).map_err(OutreachError::Transport)
        }
    }

    fn quiet_config() -> OutreachConfig {
        OutreachConfig {
            stage_one_messages: vec!["stage one".to_string()],
            stage_two_messages: vec!["stage two".to_string()],
            throttle_secs: 0..=0,
            duplicate_backoff_secs: 0..=0,
            ..OutreachConfig::default()
        }
    }

    async fn store_with_handles(handles: &[&str]) -> Arc<MemoryOutreachStore> {
        let store = Arc::new(MemoryOutreachStore::new());
        let file = FileRecord {
            id: "F1".to_string(),
            title: "Leads batch 1".to_string(),
            created_at: Utc::now(),
            processed: false,
        };
        store.insert_file_if_unseen(&file).await.unwrap();
        let records: Vec<HandleRecord> = handles
            .iter()
            .map(|h| HandleRecord::new(h.to_string(), file.created_at, Utc::now(), file.id.clone()))
            .collect();
        store.commit_extraction("F1", &records).await.unwrap();
        store
    }

    fn runner(
        store: Arc<MemoryOutreachStore>,
        transport: Arc<ScriptedTransport>,
        config: OutreachConfig,
    ) -> StageRunner<Arc<ScriptedTransport>> {
        StageRunner::new(store, transport, config, StdRng::seed_from_u64(7)).unwrap()
    }

    #[test]
    fn config_rejects_oversized_candidates() {
        let config = OutreachConfig {
            stage_one_messages: vec!["x".repeat(280)],
            ..OutreachConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(OutreachConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_empty_candidate_lists() {
        let config = OutreachConfig {
            stage_one_messages: vec![],
            ..OutreachConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn new_handle_gets_stage_one_only() {
        let store = store_with_handles(&["foo"]).await;
        let transport = Arc::new(ScriptedTransport::accepting());
        let mut runner = runner(store.clone(), transport.clone(), quiet_config());

        let summary = runner.run().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(transport.messages(), vec!["@foo stage one"]);

        let record = &store.all_handles().await.unwrap()[0];
        assert!(record.first_message_at.is_some());
        assert!(record.second_message_at.is_none());
    }

    #[tokio::test]
    async fn stages_progress_monotonically_across_runs() {
        let store = store_with_handles(&["foo"]).await;
        let transport = Arc::new(ScriptedTransport::accepting());

        for _ in 0..3 {
            let mut runner = runner(store.clone(), transport.clone(), quiet_config());
            runner.run().await.unwrap();
        }

        // Two stages total, never a third message no matter how many runs.
        assert_eq!(
            transport.messages(),
            vec!["@foo stage one", "@foo stage two"]
        );
        let record = &store.all_handles().await.unwrap()[0];
        assert_eq!(record.stage(), Stage::Complete);
        assert!(record.second_message_at >= record.first_message_at);
    }

    #[tokio::test]
    async fn per_run_cap_bounds_sends() {
        let store = store_with_handles(&["a", "b", "c", "d", "e"]).await;
        let transport = Arc::new(ScriptedTransport::accepting());
        let config = OutreachConfig {
            max_sends_per_run: 2,
            ..quiet_config()
        };

        let mut runner = runner(store.clone(), transport.clone(), config.clone());
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(transport.messages().len(), 2);

        // The remaining handles are eligible on the next run.
        let mut runner = runner_with(store.clone(), transport.clone(), config);
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(transport.messages().len(), 4);
    }

    fn runner_with(
        store: Arc<MemoryOutreachStore>,
        transport: Arc<ScriptedTransport>,
        config: OutreachConfig,
    ) -> StageRunner<Arc<ScriptedTransport>> {
        StageRunner::new(store, transport, config, StdRng::seed_from_u64(11)).unwrap()
    }

    #[tokio::test]
    async fn duplicate_outcome_leaves_stage_untouched() {
        let store = store_with_handles(&["foo", "goo"]).await;
        let transport = Arc::new(ScriptedTransport::scripted(vec![
            Ok(SendOutcome::Duplicate),
            Ok(SendOutcome::Sent),
        ]));
        let mut runner = runner(store.clone(), transport.clone(), quiet_config());

        let summary = runner.run().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.duplicates, 1);

        let handles = store.all_handles().await.unwrap();
        let foo = handles.iter().find(|h| h.handle == "foo").unwrap();
        let goo = handles.iter().find(|h| h.handle == "goo").unwrap();
        // The run continued past the duplicate to the next handle.
        assert!(foo.first_message_at.is_none());
        assert!(goo.first_message_at.is_some());
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_run() {
        let store = store_with_handles(&["foo", "goo"]).await;
        let transport = Arc::new(ScriptedTransport::scripted(vec![Err(
            "rate limited".to_string()
        )]));
        let mut runner = runner(store.clone(), transport.clone(), quiet_config());

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, OutreachError::Transport(_)));

        // Nothing was marked and only the failing send was attempted.
        assert_eq!(transport.messages().len(), 1);
        for record in store.all_handles().await.unwrap() {
            assert!(record.first_message_at.is_none());
        }
    }

    #[tokio::test]
    async fn complete_handles_are_skipped_without_transport_calls() {
        let store = store_with_handles(&["foo"]).await;
        store.mark_first_sent("foo", Utc::now()).await.unwrap();
        store.mark_second_sent("foo", Utc::now()).await.unwrap();

        let transport = Arc::new(ScriptedTransport::accepting());
        let mut runner = runner(store.clone(), transport.clone(), quiet_config());

        let summary = runner.run().await.unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.complete, 1);
        assert!(transport.messages().is_empty());
    }
}
