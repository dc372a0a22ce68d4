use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use crate::db::{MatchResultInsert, MatchStore, NotificationInsert, RunOutcomeRecord, StoreError};
use crate::embedding::{self, EmbeddingFailure, EmbeddingProvider};
use crate::judge::{self, clamp_score, JudgeConfig, SemanticJudge};
use crate::matching::index::SimilarityIndex;
use crate::matching::ranker::{self, RankedCandidate, RankerConfig, ScoredCandidate};
use crate::normalize;
use crate::notify::{self, NotificationDelivery, NotificationStatus, NotifyConfig};
use crate::workflow::{
    WorkflowProgress, WorkflowStatus, STEP_JD_PARSED, STEP_PROFILES_COMPARED,
    STEP_PROFILES_RANKED, STEP_RESULTS_PERSISTED,
};
use crate::{ConsultantProfile, JobDescription};

/// Fatal failure kinds of a ranking run. Judge and delivery failures have a
/// defined degraded behavior and never surface here.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("embedding stage failed: {0}")]
    Embedding(#[from] EmbeddingFailure),
    #[error("failed to persist ranking run: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub run_id: String,
    /// First entries of the full ranked order, for the notification summary.
    pub top_matches: Vec<RankedCandidate>,
    /// Every candidate at or above the score threshold; this is what gets
    /// persisted as the match result set.
    pub all_matches: Vec<RankedCandidate>,
    pub workflow: WorkflowStatus,
}

/// Serializes ranking runs per job description. Concurrent runs for the same
/// id race on the same delete-then-insert target, so the second caller waits
/// for the first to finish instead of interleaving with it.
#[derive(Clone, Default)]
pub struct RunGuard {
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl RunGuard {
    pub async fn acquire(&self, job_description_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries are tiny and reused by later runs for the same id.
            locks
                .entry(job_description_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ranker: RankerConfig,
    /// Upper bound on concurrent judge calls within one run.
    pub judge_concurrency: usize,
    /// Deadline for one judge call, covering the judge's internal retries.
    /// A candidate whose call outlives it scores 0.0 like any other judge
    /// failure.
    pub judge_call_timeout: Duration,
    /// Notification recipient when the job description names none.
    pub default_recipient: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ranker: RankerConfig::default(),
            judge_concurrency: 4,
            judge_call_timeout: Duration::from_secs(JudgeConfig::default().call_budget_secs()),
            default_recipient: NotifyConfig::default().default_recipient,
        }
    }
}

/// The ranking pipeline: normalize, embed, scan, judge, blend, persist,
/// notify. The stage graph is a fixed linear sequence with one bounded
/// fan-out (judge scoring); storage is passed into `run_ranking` explicitly.
pub struct RankingPipeline {
    config: PipelineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    judge: Arc<dyn SemanticJudge>,
    delivery: Arc<dyn NotificationDelivery>,
    guard: RunGuard,
}

impl RankingPipeline {
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        judge: Arc<dyn SemanticJudge>,
        delivery: Arc<dyn NotificationDelivery>,
    ) -> Self {
        Self {
            config,
            embedder,
            judge,
            delivery,
            guard: RunGuard::default(),
        }
    }

    /// Assemble the pipeline from environment configuration.
    pub fn from_env() -> Self {
        let judge_config = JudgeConfig::from_env();
        let notify_config = NotifyConfig::from_env();

        let config = PipelineConfig {
            ranker: RankerConfig::from_env(),
            judge_concurrency: judge_config.concurrency,
            judge_call_timeout: Duration::from_secs(judge_config.call_budget_secs()),
            default_recipient: notify_config.default_recipient.clone(),
        };

        Self::new(
            config,
            embedding::provider_from_env(),
            judge::create_judge(judge_config),
            notify::delivery_from_config(&notify_config),
        )
    }

    /// Run one end-to-end ranking for a job description against its profile
    /// pool. Persistence happens inside this call; callers get the ranked
    /// views back and persist nothing themselves.
    #[instrument(skip_all, fields(job_description_id = jd.id))]
    pub async fn run_ranking(
        &self,
        store: &dyn MatchStore,
        jd: &JobDescription,
        profiles: &[ConsultantProfile],
    ) -> Result<RankingOutcome, RankingError> {
        let _in_flight = self.guard.acquire(jd.id).await;

        let eligible: Vec<&ConsultantProfile> =
            profiles.iter().filter(|p| p.is_eligible()).collect();

        let mut workflow = WorkflowStatus::new(jd.id);
        store.upsert_workflow(&workflow).await?;

        info!(
            run_id = %workflow.id,
            eligible = eligible.len(),
            total = profiles.len(),
            "starting ranking run"
        );

        if eligible.is_empty() {
            workflow.steps.mark(STEP_JD_PARSED);
            workflow.steps.set(STEP_PROFILES_COMPARED, false);
            return self
                .finish_run(store, jd, workflow, Vec::new(), Vec::new())
                .await;
        }

        // Embedding stage. One call per distinct text; a failure here is
        // fatal since no ranking is possible without vectors.
        let mut cache: HashMap<String, Vec<f32>> = HashMap::new();
        let jd_text = normalize::job_description_text(jd);
        let jd_embedding = self.embed_cached(&mut cache, &jd_text).await?;

        let mut profile_embeddings = Vec::with_capacity(eligible.len());
        for profile in &eligible {
            let text = normalize::profile_text(profile);
            profile_embeddings.push(self.embed_cached(&mut cache, &text).await?);
        }

        workflow.steps.mark(STEP_JD_PARSED);
        workflow.steps.mark(STEP_PROFILES_COMPARED);
        workflow.advance(WorkflowProgress::Processing);
        store.upsert_workflow(&workflow).await?;

        let index = SimilarityIndex::new(jd_embedding);
        let vector_scores = index.score_all(&profile_embeddings)?;

        let judge_scores = self.judge_all(&jd_text, &eligible).await;

        let scored: Vec<ScoredCandidate> = eligible
            .iter()
            .zip(vector_scores)
            .zip(judge_scores)
            .map(|((profile, vector_score), judge_score)| ScoredCandidate {
                profile: (*profile).clone(),
                vector_score,
                judge_score,
            })
            .collect();

        let ranked = ranker::rank_candidates(scored, &self.config.ranker.weights);
        workflow.steps.mark(STEP_PROFILES_RANKED);

        let top = ranker::top_matches(&ranked, self.config.ranker.top_matches);
        let all = ranker::all_matches(&ranked, self.config.ranker.score_threshold);

        self.finish_run(store, jd, workflow, top, all).await
    }

    async fn embed_cached(
        &self,
        cache: &mut HashMap<String, Vec<f32>>,
        text: &str,
    ) -> Result<Vec<f32>, EmbeddingFailure> {
        if let Some(vector) = cache.get(text) {
            return Ok(vector.clone());
        }

        let vector = self.embedder.embed(text).await?;
        cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Score every eligible profile with the semantic judge. Calls run
    /// concurrently up to the configured bound, each under the per-call
    /// deadline; a failure or timeout on one candidate degrades that
    /// candidate to 0.0 and never aborts the run.
    async fn judge_all(&self, jd_text: &str, eligible: &[&ConsultantProfile]) -> Vec<f64> {
        let concurrency = self.config.judge_concurrency.max(1);
        let deadline = self.config.judge_call_timeout;

        let results: Vec<(usize, f64)> = stream::iter(eligible.iter().enumerate())
            .map(|(idx, profile)| {
                let judge = Arc::clone(&self.judge);
                let snippet = normalize::judge_snippet(profile);
                async move {
                    let score = match tokio::time::timeout(
                        deadline,
                        judge.score(jd_text, &snippet),
                    )
                    .await
                    {
                        Ok(Ok(raw)) => clamp_score(raw),
                        Ok(Err(err)) => {
                            warn!(
                                consultant_id = profile.id,
                                error = %err,
                                "semantic judge failed; scoring candidate 0.0"
                            );
                            0.0
                        }
                        Err(_) => {
                            warn!(
                                consultant_id = profile.id,
                                deadline_secs = deadline.as_secs(),
                                "semantic judge call timed out; scoring candidate 0.0"
                            );
                            0.0
                        }
                    };
                    (idx, score)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut scores = vec![0.0; eligible.len()];
        for (idx, score) in results {
            scores[idx] = score;
        }
        scores
    }

    async fn finish_run(
        &self,
        store: &dyn MatchStore,
        jd: &JobDescription,
        mut workflow: WorkflowStatus,
        top: Vec<RankedCandidate>,
        all: Vec<RankedCandidate>,
    ) -> Result<RankingOutcome, RankingError> {
        workflow.steps.mark(STEP_RESULTS_PERSISTED);
        workflow.advance(WorkflowProgress::Completed);

        let matched_at = Utc::now();
        let matches: Vec<MatchResultInsert> = all
            .iter()
            .map(|candidate| MatchResultInsert {
                job_description_id: jd.id,
                consultant_id: candidate.profile.id,
                similarity_score: candidate.hybrid_score,
                rank: candidate.rank as i32,
                matched_at,
            })
            .collect();

        let recipient = jd
            .requestor_email
            .clone()
            .unwrap_or_else(|| self.config.default_recipient.clone());
        let content = notify::build_notification_content(jd.id, &top);

        let record = RunOutcomeRecord {
            workflow: workflow.clone(),
            matches,
            notification: NotificationInsert {
                job_description_id: jd.id,
                workflow_status_id: workflow.id.clone(),
                recipient_email: recipient.clone(),
                content: content.clone(),
            },
        };

        let notification_id = store.persist_run(&record).await?;

        info!(
            run_id = %workflow.id,
            matches = record.matches.len(),
            notification_id,
            "ranking run persisted"
        );

        self.deliver(store, notification_id, &recipient, jd.id, &content)
            .await;

        Ok(RankingOutcome {
            run_id: workflow.id.clone(),
            top_matches: top,
            all_matches: all,
            workflow,
        })
    }

    /// Best-effort delivery of the already-persisted notification.
    async fn deliver(
        &self,
        store: &dyn MatchStore,
        notification_id: i64,
        recipient: &str,
        job_description_id: i64,
        content: &str,
    ) {
        let subject = notify::notification_subject(job_description_id);

        let (status, sent_at) = match self.delivery.send(recipient, &subject, content).await {
            Ok(()) => (NotificationStatus::Sent, Some(Utc::now())),
            Err(err) => {
                warn!(
                    error = %err,
                    notification_id,
                    "notification delivery failed; persisted results are unaffected"
                );
                (NotificationStatus::Failed, None)
            }
        };

        if let Err(err) = store.mark_notification(notification_id, status, sent_at).await {
            warn!(error = %err, notification_id, "failed to record delivery outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeFailure;
    use crate::matching::ranker::RankWeights;
    use crate::notify::{DeliveryFailure, LogDelivery};
    use crate::Availability;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeEmbedder {
        dimension: usize,
        vectors: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeEmbedder {
        fn constant(dimension: usize) -> Self {
            Self {
                dimension,
                vectors: HashMap::new(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        /// Vectors keyed by the first whitespace token of the normalized
        /// text (the job title's first word, or the profile name).
        fn keyed(dimension: usize, entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                dimension,
                vectors: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::constant(2)
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingFailure::Transport("injected".into()));
            }

            let key = text.split_whitespace().next().unwrap_or("");
            Ok(self
                .vectors
                .get(key)
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.dimension]))
        }
    }

    struct FakeJudge {
        scores: HashMap<String, f64>,
        default: f64,
        fail_names: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeJudge {
        fn with_scores(entries: &[(&str, f64)]) -> Self {
            Self {
                scores: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect(),
                default: 0.0,
                fail_names: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn constant(default: f64) -> Self {
            Self {
                scores: HashMap::new(),
                default,
                fail_names: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_for(mut self, name: &str) -> Self {
            self.fail_names.insert(name.to_string());
            self
        }
    }

    #[async_trait]
    impl SemanticJudge for FakeJudge {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn score(&self, _job_text: &str, snippet: &str) -> Result<f64, JudgeFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = snippet.split(',').next().unwrap_or("");
            if self.fail_names.contains(name) {
                return Err(JudgeFailure::Transport("injected".into()));
            }
            Ok(self.scores.get(name).copied().unwrap_or(self.default))
        }
    }

    struct FailDelivery;

    #[async_trait]
    impl NotificationDelivery for FailDelivery {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn send(
            &self,
            _recipient: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<(), DeliveryFailure> {
            Err(DeliveryFailure::Transport("injected".into()))
        }
    }

    #[derive(Clone)]
    struct StoredNotification {
        id: i64,
        insert: NotificationInsert,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    }

    #[derive(Default)]
    struct StoreState {
        workflows: Vec<WorkflowStatus>,
        matches: HashMap<i64, Vec<MatchResultInsert>>,
        notifications: Vec<StoredNotification>,
        next_notification_id: i64,
    }

    #[derive(Default)]
    struct InMemoryStore {
        state: std::sync::Mutex<StoreState>,
        fail_persist: AtomicBool,
    }

    impl InMemoryStore {
        fn failing_persist() -> Self {
            let store = Self::default();
            store.fail_persist.store(true, Ordering::SeqCst);
            store
        }

        fn seed_matches(&self, job_description_id: i64, rows: Vec<MatchResultInsert>) {
            self.state
                .lock()
                .unwrap()
                .matches
                .insert(job_description_id, rows);
        }

        fn latest_workflow(&self, job_description_id: i64) -> Option<WorkflowStatus> {
            self.state
                .lock()
                .unwrap()
                .workflows
                .iter()
                .filter(|w| w.job_description_id == job_description_id)
                .last()
                .cloned()
        }

        fn rows(&self, job_description_id: i64) -> Vec<MatchResultInsert> {
            self.state
                .lock()
                .unwrap()
                .matches
                .get(&job_description_id)
                .cloned()
                .unwrap_or_default()
        }

        fn notifications(&self) -> Vec<StoredNotification> {
            self.state.lock().unwrap().notifications.clone()
        }
    }

    #[async_trait]
    impl MatchStore for InMemoryStore {
        async fn upsert_workflow(&self, workflow: &WorkflowStatus) -> Result<(), StoreError> {
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.workflows.iter_mut().find(|w| w.id == workflow.id) {
                *existing = workflow.clone();
            } else {
                state.workflows.push(workflow.clone());
            }
            Ok(())
        }

        async fn persist_run(&self, record: &RunOutcomeRecord) -> Result<i64, StoreError> {
            if self.fail_persist.load(Ordering::SeqCst) {
                return Err(StoreError::Mapping("injected persistence failure".into()));
            }

            let mut state = self.state.lock().unwrap();
            state
                .matches
                .insert(record.workflow.job_description_id, record.matches.clone());

            if let Some(existing) = state
                .workflows
                .iter_mut()
                .find(|w| w.id == record.workflow.id)
            {
                *existing = record.workflow.clone();
            } else {
                state.workflows.push(record.workflow.clone());
            }

            state.next_notification_id += 1;
            let id = state.next_notification_id;
            state.notifications.push(StoredNotification {
                id,
                insert: record.notification.clone(),
                status: NotificationStatus::Pending,
                sent_at: None,
            });

            Ok(id)
        }

        async fn mark_notification(
            &self,
            notification_id: i64,
            status: NotificationStatus,
            sent_at: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            let mut state = self.state.lock().unwrap();
            if let Some(stored) = state
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id)
            {
                stored.status = status;
                stored.sent_at = sent_at;
            }
            Ok(())
        }
    }

    fn sample_jd(id: i64) -> JobDescription {
        JobDescription {
            id,
            title: "Backend Engineer".into(),
            department: Some("Platform".into()),
            location: Some("Berlin".into()),
            experience: Some("5+ years".into()),
            description: Some("Own the matching service".into()),
            skills: vec!["Rust".into(), "PostgreSQL".into()],
            requestor_email: Some("requestor@example.com".into()),
        }
    }

    fn profile(id: i64, name: &str) -> ConsultantProfile {
        ConsultantProfile {
            id,
            name: name.into(),
            skills: vec!["Rust".into()],
            experience: Some(5),
            location: Some("Berlin".into()),
            past_projects: None,
            availability: Availability::Available,
        }
    }

    fn judge_driven_config() -> PipelineConfig {
        PipelineConfig {
            ranker: RankerConfig {
                weights: RankWeights {
                    vector: 0.0,
                    judge: 1.0,
                },
                ..RankerConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn judge_driven_pipeline(judge: FakeJudge) -> RankingPipeline {
        RankingPipeline::new(
            judge_driven_config(),
            Arc::new(FakeEmbedder::constant(2)),
            Arc::new(judge),
            Arc::new(LogDelivery),
        )
    }

    #[tokio::test]
    async fn persists_contiguous_ranks_for_all_matches() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::with_scores(&[
            ("ann", 0.9),
            ("bob", 0.5),
            ("cleo", 0.8),
            ("dev", 0.3),
        ]));

        let jd = sample_jd(1);
        let profiles = vec![
            profile(1, "ann"),
            profile(2, "bob"),
            profile(3, "cleo"),
            profile(4, "dev"),
        ];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(outcome.all_matches.len(), 4);
        assert_eq!(outcome.top_matches.len(), 3);

        let rows = store.rows(1);
        assert_eq!(
            rows.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            rows.iter().map(|r| r.consultant_id).collect::<Vec<_>>(),
            vec![1, 3, 2, 4]
        );

        let workflow = store.latest_workflow(1).unwrap();
        assert_eq!(workflow.progress, WorkflowProgress::Completed);
        assert!(workflow.completed_at.is_some());
        assert!(workflow.steps.is_done(STEP_JD_PARSED));
        assert!(workflow.steps.is_done(STEP_PROFILES_COMPARED));
        assert!(workflow.steps.is_done(STEP_PROFILES_RANKED));
        assert!(workflow.steps.is_done(STEP_RESULTS_PERSISTED));

        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].insert.workflow_status_id, outcome.run_id);
    }

    #[tokio::test]
    async fn equal_scores_order_by_ascending_profile_id() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::constant(0.75));

        let jd = sample_jd(2);
        // Deliberately out of id order on input.
        let profiles = vec![profile(9, "zoe"), profile(4, "ann")];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(
            outcome
                .all_matches
                .iter()
                .map(|c| c.profile.id)
                .collect::<Vec<_>>(),
            vec![4, 9]
        );
    }

    #[tokio::test]
    async fn score_threshold_is_inclusive() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::with_scores(&[
            ("ann", 0.2),
            ("bob", 0.1999),
        ]));

        let jd = sample_jd(3);
        let profiles = vec![profile(1, "ann"), profile(2, "bob")];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(outcome.all_matches.len(), 1);
        assert_eq!(outcome.all_matches[0].profile.id, 1);
        // top_matches is a view of the full order, independent of threshold.
        assert_eq!(outcome.top_matches.len(), 2);
        assert_eq!(store.rows(3).len(), 1);
    }

    #[tokio::test]
    async fn five_profiles_yield_three_top_matches() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::with_scores(&[
            ("a", 0.9),
            ("b", 0.8),
            ("c", 0.7),
            ("d", 0.6),
            ("e", 0.5),
        ]));

        let jd = sample_jd(4);
        let profiles = vec![
            profile(1, "a"),
            profile(2, "b"),
            profile(3, "c"),
            profile(4, "d"),
            profile(5, "e"),
        ];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(outcome.top_matches.len(), 3);
        assert_eq!(outcome.all_matches.len(), 5);
        assert_eq!(
            outcome
                .top_matches
                .iter()
                .map(|c| c.profile.id)
                .collect::<Vec<_>>(),
            outcome
                .all_matches
                .iter()
                .take(3)
                .map(|c| c.profile.id)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn rerun_replaces_prior_results_without_duplicates() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::with_scores(&[
            ("ann", 0.9),
            ("bob", 0.6),
        ]));

        let jd = sample_jd(5);
        let profiles = vec![profile(1, "ann"), profile(2, "bob")];

        pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();
        pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        let rows = store.rows(5);
        assert_eq!(rows.len(), 2);
        let mut ranks: Vec<i32> = rows.iter().map(|r| r.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2]);

        // Both runs recorded their own notification and workflow.
        assert_eq!(store.notifications().len(), 2);
    }

    #[tokio::test]
    async fn zero_eligible_profiles_short_circuits() {
        let store = InMemoryStore::default();
        // Stale rows from an earlier run must be cleared by the empty run.
        store.seed_matches(
            6,
            vec![MatchResultInsert {
                job_description_id: 6,
                consultant_id: 99,
                similarity_score: 0.9,
                rank: 1,
                matched_at: Utc::now(),
            }],
        );

        let embedder = Arc::new(FakeEmbedder::constant(2));
        let judge = Arc::new(FakeJudge::constant(0.9));
        let pipeline = RankingPipeline::new(
            judge_driven_config(),
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            Arc::clone(&judge) as Arc<dyn SemanticJudge>,
            Arc::new(LogDelivery),
        );

        let jd = sample_jd(6);
        let mut unavailable = profile(1, "ann");
        unavailable.availability = Availability::Unavailable;

        let outcome = pipeline
            .run_ranking(&store, &jd, &[unavailable])
            .await
            .unwrap();

        assert!(outcome.all_matches.is_empty());
        assert!(outcome.top_matches.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
        assert!(store.rows(6).is_empty());

        let workflow = store.latest_workflow(6).unwrap();
        assert_eq!(workflow.progress, WorkflowProgress::Completed);
        assert!(workflow.steps.is_done(STEP_JD_PARSED));
        assert!(!workflow.steps.is_done(STEP_PROFILES_COMPARED));

        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].insert.content,
            "No suitable matches found for Job ID: 6. Please review manually."
        );
    }

    #[tokio::test]
    async fn embedding_failure_is_fatal_and_leaves_workflow_pending() {
        let store = InMemoryStore::default();
        let pipeline = RankingPipeline::new(
            PipelineConfig::default(),
            Arc::new(FakeEmbedder::failing()),
            Arc::new(FakeJudge::constant(0.9)),
            Arc::new(LogDelivery),
        );

        let jd = sample_jd(7);
        let result = pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await;

        assert!(matches!(result, Err(RankingError::Embedding(_))));
        assert!(store.rows(7).is_empty());
        assert!(store.notifications().is_empty());

        // The run never reached PROCESSING; the row stays queryable as-is.
        let workflow = store.latest_workflow(7).unwrap();
        assert_eq!(workflow.progress, WorkflowProgress::Pending);
    }

    #[tokio::test]
    async fn persistence_failure_leaves_workflow_processing() {
        let store = InMemoryStore::failing_persist();
        let pipeline = judge_driven_pipeline(FakeJudge::constant(0.9));

        let jd = sample_jd(8);
        let result = pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await;

        assert!(matches!(result, Err(RankingError::Persistence(_))));

        let workflow = store.latest_workflow(8).unwrap();
        assert_eq!(workflow.progress, WorkflowProgress::Processing);
        assert!(workflow.steps.is_done(STEP_PROFILES_COMPARED));
        assert!(workflow.completed_at.is_none());
    }

    #[tokio::test]
    async fn judge_failure_degrades_one_candidate_to_zero() {
        let store = InMemoryStore::default();
        let judge = FakeJudge::with_scores(&[("ann", 0.9), ("bob", 0.9)]).failing_for("bob");
        let pipeline = judge_driven_pipeline(judge);

        let jd = sample_jd(9);
        let profiles = vec![profile(1, "ann"), profile(2, "bob")];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        // bob degraded to 0.0 and fell below the threshold; ann unaffected.
        assert_eq!(outcome.all_matches.len(), 1);
        assert_eq!(outcome.all_matches[0].profile.id, 1);

        let bob = outcome
            .top_matches
            .iter()
            .find(|c| c.profile.id == 2)
            .unwrap();
        assert_eq!(bob.judge_score, 0.0);
        assert_eq!(bob.hybrid_score, 0.0);
    }

    struct HangingJudge;

    #[async_trait]
    impl SemanticJudge for HangingJudge {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn score(&self, _job_text: &str, _snippet: &str) -> Result<f64, JudgeFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0.9)
        }
    }

    #[tokio::test]
    async fn judge_call_timeout_degrades_candidate_to_zero() {
        let store = InMemoryStore::default();
        let pipeline = RankingPipeline::new(
            PipelineConfig {
                judge_call_timeout: Duration::from_millis(20),
                ..judge_driven_config()
            },
            Arc::new(FakeEmbedder::constant(2)),
            Arc::new(HangingJudge),
            Arc::new(LogDelivery),
        );

        let jd = sample_jd(16);
        let outcome = pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await
            .unwrap();

        assert!(outcome.all_matches.is_empty());
        assert_eq!(outcome.top_matches[0].judge_score, 0.0);
    }

    #[tokio::test]
    async fn out_of_range_judge_scores_are_zeroed() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::with_scores(&[
            ("ann", 1.7),
            ("bob", -0.4),
            ("cleo", 0.6),
        ]));

        let jd = sample_jd(10);
        let profiles = vec![profile(1, "ann"), profile(2, "bob"), profile(3, "cleo")];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(outcome.all_matches.len(), 1);
        assert_eq!(outcome.all_matches[0].profile.id, 3);
        for candidate in &outcome.top_matches {
            assert!((0.0..=1.0).contains(&candidate.judge_score));
        }
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed_and_recorded() {
        let store = InMemoryStore::default();
        let pipeline = RankingPipeline::new(
            judge_driven_config(),
            Arc::new(FakeEmbedder::constant(2)),
            Arc::new(FakeJudge::constant(0.9)),
            Arc::new(FailDelivery),
        );

        let jd = sample_jd(11);
        let outcome = pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await
            .unwrap();

        assert_eq!(outcome.all_matches.len(), 1);
        assert_eq!(store.rows(11).len(), 1);

        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].status, NotificationStatus::Failed);
        assert!(notifications[0].sent_at.is_none());
    }

    #[tokio::test]
    async fn successful_delivery_marks_notification_sent() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::constant(0.9));

        let jd = sample_jd(12);
        pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await
            .unwrap();

        let notifications = store.notifications();
        assert_eq!(notifications[0].status, NotificationStatus::Sent);
        assert!(notifications[0].sent_at.is_some());
        assert_eq!(
            notifications[0].insert.recipient_email,
            "requestor@example.com"
        );
    }

    #[tokio::test]
    async fn missing_requestor_email_falls_back_to_default_recipient() {
        let store = InMemoryStore::default();
        let pipeline = judge_driven_pipeline(FakeJudge::constant(0.9));

        let mut jd = sample_jd(13);
        jd.requestor_email = None;

        pipeline
            .run_ranking(&store, &jd, &[profile(1, "ann")])
            .await
            .unwrap();

        let notifications = store.notifications();
        assert_eq!(
            notifications[0].insert.recipient_email,
            NotifyConfig::default().default_recipient
        );
    }

    #[tokio::test]
    async fn identical_profile_texts_share_one_embedding_call() {
        let store = InMemoryStore::default();
        let embedder = Arc::new(FakeEmbedder::constant(2));
        let pipeline = RankingPipeline::new(
            judge_driven_config(),
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            Arc::new(FakeJudge::constant(0.9)),
            Arc::new(LogDelivery),
        );

        let jd = sample_jd(14);
        // Same text, different ids: the second profile hits the run cache.
        let profiles = vec![profile(1, "ann"), profile(2, "ann")];

        pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        // One call for the job description, one for the shared profile text.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn vector_scores_drive_ranking_when_judge_is_disabled() {
        let store = InMemoryStore::default();
        let embedder = FakeEmbedder::keyed(
            2,
            &[
                ("Backend", vec![1.0, 0.0]),
                ("ann", vec![0.9, 0.0]),
                ("bob", vec![0.2, 0.0]),
            ],
        );
        let pipeline = RankingPipeline::new(
            PipelineConfig {
                ranker: RankerConfig {
                    weights: RankWeights {
                        vector: 1.0,
                        judge: 0.0,
                    },
                    ..RankerConfig::default()
                },
                ..PipelineConfig::default()
            },
            Arc::new(embedder),
            Arc::new(FakeJudge::constant(0.0)),
            Arc::new(LogDelivery),
        );

        let jd = sample_jd(15);
        let profiles = vec![profile(2, "bob"), profile(1, "ann")];

        let outcome = pipeline.run_ranking(&store, &jd, &profiles).await.unwrap();

        assert_eq!(outcome.all_matches[0].profile.id, 1);
        assert!(outcome.all_matches[0].vector_score > outcome.all_matches[1].vector_score);
    }

    #[tokio::test]
    async fn runs_for_the_same_job_description_are_serialized() {
        let guard = RunGuard::default();

        let held = guard.acquire(42).await;

        // A second acquire for the same id must wait.
        let second = tokio::time::timeout(Duration::from_millis(50), guard.acquire(42));
        assert!(second.await.is_err());

        // A different id is unaffected.
        let other = tokio::time::timeout(Duration::from_millis(50), guard.acquire(7));
        assert!(other.await.is_ok());

        drop(held);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), guard.acquire(42));
        assert!(reacquired.await.is_ok());
    }
}
