//! Background jobs.
//!
//! One ordered queue, one job at a time. The scheduler drains the queue on
//! every tick and enqueues the periodic sweeps on their own cadence. A job
//! that fails is logged and dropped.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use skillgraph_core::{CandidateId, VerificationStatus};
use skillgraph_store::Store;

use crate::aggregation::SkillGraphService;
use crate::config::JobsConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Recompute one candidate's graph.
    RefreshSkillGraph(CandidateId),
    /// Revoke verified credentials past their expiry.
    ExpirySweep,
    /// Recompute recency scores across all graphs.
    RecencyRefresh,
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::RefreshSkillGraph(_) => "refresh_skill_graph",
            Job::ExpirySweep => "expiry_sweep",
            Job::RecencyRefresh => "recency_refresh",
        }
    }
}

pub struct JobQueue {
    store: Arc<dyn Store>,
    graphs: SkillGraphService,
    pending: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>, graphs: SkillGraphService) -> Self {
        Self {
            store,
            graphs,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, job: Job) {
        tracing::debug!(job = job.name(), "enqueued job");
        self.pending.lock().await.push_back(job);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Run the job at the head of the queue. Returns false when empty.
    pub async fn run_next(&self) -> bool {
        let Some(job) = self.pending.lock().await.pop_front() else {
            return false;
        };
        if let Err(e) = self.run(&job, Utc::now()).await {
            tracing::error!(job = job.name(), error = %e, "job failed, dropping");
        }
        true
    }

    /// Run jobs until the queue is empty, including any they enqueue.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        ran
    }

    async fn run(&self, job: &Job, now: DateTime<Utc>) -> Result<()> {
        match job {
            Job::RefreshSkillGraph(candidate_id) => {
                self.graphs.on_credential_changed(candidate_id).await?;
            }
            Job::ExpirySweep => {
                let expired = self.store.expired_credentials(now).await?;
                let mut candidates = BTreeSet::new();
                let mut revoked = 0;
                let mut first_error = None;
                for credential in &expired {
                    match self
                        .store
                        .set_credential_status(&credential.id, VerificationStatus::Revoked, None)
                        .await
                    {
                        Ok(_) => {
                            revoked += 1;
                            candidates.insert(credential.candidate_id.as_str().to_string());
                        }
                        Err(e) => {
                            tracing::warn!(
                                credential_id = %credential.id,
                                error = %e,
                                "failed to revoke expired credential"
                            );
                            first_error.get_or_insert(e);
                        }
                    }
                }
                tracing::info!(
                    revoked,
                    failed = expired.len() - revoked,
                    candidates = candidates.len(),
                    "expiry sweep finished"
                );
                // Graphs of revoked credentials are refreshed even when part of the sweep failed.
                for candidate in candidates {
                    self.enqueue(Job::RefreshSkillGraph(CandidateId::new(candidate)))
                        .await;
                }
                if let Some(e) = first_error {
                    return Err(e.into());
                }
            }
            Job::RecencyRefresh => {
                self.graphs.refresh_recency(now).await?;
            }
        }
        Ok(())
    }
}

/// Drive the queue from timers until the task is aborted.
pub fn spawn_scheduler(queue: Arc<JobQueue>, config: &JobsConfig) -> JoinHandle<()> {
    let mut tick = interval(config.tick());
    let mut expiry = interval(config.expiry_sweep());
    let mut recency = interval(config.recency_refresh());
    for timer in [&mut tick, &mut expiry, &mut recency] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    queue.drain().await;
                }
                _ = expiry.tick() => queue.enqueue(Job::ExpirySweep).await,
                _ = recency.tick() => queue.enqueue(Job::RecencyRefresh).await,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use skillgraph_core::{
        Action, CandidateSkillGraph, Credential, CredentialId, Issuer, IssuerId, Role, Skill,
        TransactionLog, VerificationLog, WorkflowId,
    };
    use skillgraph_store::{InsertResult, MemoryStore, Result as StoreResult, StoreError};
    use skillgraph_testkit::fixtures;

    fn queue(store: Arc<MemoryStore>) -> JobQueue {
        JobQueue::new(store.clone(), SkillGraphService::new(store))
    }

    #[tokio::test]
    async fn test_expiry_sweep_revokes_and_refreshes() {
        let store = Arc::new(MemoryStore::new());
        let cand = CandidateId::new("cand-1");
        let now = Utc::now();

        let mut expired = fixtures::credential("old", &cand, &["Java"], now - Duration::days(400));
        expired.expires_at = Some(now - Duration::days(1));
        store.insert_credential(&expired).await.unwrap();
        store
            .insert_credential(&fixtures::credential("fresh", &cand, &["Rust"], now))
            .await
            .unwrap();

        let jobs = queue(store.clone());
        jobs.graphs.recompute(&cand).await.unwrap();
        jobs.enqueue(Job::ExpirySweep).await;

        // The sweep plus the refresh it enqueued.
        assert_eq!(jobs.drain().await, 2);

        let old = store.get_credential(&CredentialId::new("old")).await.unwrap().unwrap();
        assert_eq!(old.verification_status, VerificationStatus::Revoked);

        let graph = store.get_skill_graph(&cand).await.unwrap().unwrap();
        let names: Vec<_> = graph.skills.iter().map(|s| s.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["rust"]);
    }

    /// Delegates to a memory store but refuses to revoke one credential.
    struct RevokeFails {
        inner: Arc<MemoryStore>,
        broken: CredentialId,
    }

    #[async_trait::async_trait]
    impl Store for RevokeFails {
        async fn insert_credential(&self, c: &Credential) -> StoreResult<InsertResult> {
            self.inner.insert_credential(c).await
        }
        async fn get_credential(&self, id: &CredentialId) -> StoreResult<Option<Credential>> {
            self.inner.get_credential(id).await
        }
        async fn delete_credential(&self, id: &CredentialId) -> StoreResult<bool> {
            self.inner.delete_credential(id).await
        }
        async fn credentials_for_candidate(
            &self,
            candidate_id: &CandidateId,
            statuses: &[VerificationStatus],
        ) -> StoreResult<Vec<Credential>> {
            self.inner.credentials_for_candidate(candidate_id, statuses).await
        }
        async fn set_credential_status(
            &self,
            id: &CredentialId,
            status: VerificationStatus,
            verified_at: Option<DateTime<Utc>>,
        ) -> StoreResult<bool> {
            if *id == self.broken {
                return Err(StoreError::InvalidData(format!("cannot update {id}")));
            }
            self.inner.set_credential_status(id, status, verified_at).await
        }
        async fn mark_pending_verified(
            &self,
            candidate_id: &CandidateId,
            at: DateTime<Utc>,
        ) -> StoreResult<usize> {
            self.inner.mark_pending_verified(candidate_id, at).await
        }
        async fn expired_credentials(&self, now: DateTime<Utc>) -> StoreResult<Vec<Credential>> {
            self.inner.expired_credentials(now).await
        }
        async fn find_or_create_skill(&self, skill: &Skill) -> StoreResult<Skill> {
            self.inner.find_or_create_skill(skill).await
        }
        async fn get_skill_by_key(&self, key: &str) -> StoreResult<Option<Skill>> {
            self.inner.get_skill_by_key(key).await
        }
        async fn upsert_skill_graph(&self, graph: &CandidateSkillGraph) -> StoreResult<()> {
            self.inner.upsert_skill_graph(graph).await
        }
        async fn get_skill_graph(
            &self,
            candidate_id: &CandidateId,
        ) -> StoreResult<Option<CandidateSkillGraph>> {
            self.inner.get_skill_graph(candidate_id).await
        }
        async fn list_skill_graphs(&self) -> StoreResult<Vec<CandidateSkillGraph>> {
            self.inner.list_skill_graphs().await
        }
        async fn upsert_issuer(&self, issuer: &Issuer) -> StoreResult<()> {
            self.inner.upsert_issuer(issuer).await
        }
        async fn get_issuer(&self, id: &IssuerId) -> StoreResult<Option<Issuer>> {
            self.inner.get_issuer(id).await
        }
        async fn append_transaction_log(&self, log: &TransactionLog) -> StoreResult<()> {
            self.inner.append_transaction_log(log).await
        }
        async fn latest_transaction_log(
            &self,
            transaction_id: &str,
            action: Action,
            role: Role,
        ) -> StoreResult<Option<TransactionLog>> {
            self.inner.latest_transaction_log(transaction_id, action, role).await
        }
        async fn transaction_logs(&self, transaction_id: &str) -> StoreResult<Vec<TransactionLog>> {
            self.inner.transaction_logs(transaction_id).await
        }
        async fn save_verification_log(&self, log: &VerificationLog) -> StoreResult<()> {
            self.inner.save_verification_log(log).await
        }
        async fn get_verification_log(
            &self,
            id: &WorkflowId,
        ) -> StoreResult<Option<VerificationLog>> {
            self.inner.get_verification_log(id).await
        }
    }

    #[tokio::test]
    async fn test_expiry_sweep_refreshes_despite_failed_revocation() {
        let memory = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let alice = CandidateId::new("alice");
        let bob = CandidateId::new("bob");

        for (id, cand, skill) in [("a-old", &alice, "Java"), ("b-old", &bob, "Go")] {
            let mut credential =
                fixtures::credential(id, cand, &[skill], now - Duration::days(400));
            credential.expires_at = Some(now - Duration::days(1));
            memory.insert_credential(&credential).await.unwrap();
        }
        memory
            .insert_credential(&fixtures::credential("a-new", &alice, &["Rust"], now))
            .await
            .unwrap();

        let store: Arc<dyn Store> = Arc::new(RevokeFails {
            inner: memory.clone(),
            broken: CredentialId::new("b-old"),
        });
        let jobs = JobQueue::new(store.clone(), SkillGraphService::new(store));
        jobs.graphs.recompute(&alice).await.unwrap();

        assert!(jobs.run(&Job::ExpirySweep, now).await.is_err());
        assert_eq!(
            jobs.pending.lock().await.front(),
            Some(&Job::RefreshSkillGraph(alice.clone()))
        );
        assert_eq!(jobs.len().await, 1);
        jobs.drain().await;

        let a_old = memory.get_credential(&CredentialId::new("a-old")).await.unwrap().unwrap();
        assert_eq!(a_old.verification_status, VerificationStatus::Revoked);
        let b_old = memory.get_credential(&CredentialId::new("b-old")).await.unwrap().unwrap();
        assert_eq!(b_old.verification_status, VerificationStatus::Verified);

        let graph = memory.get_skill_graph(&alice).await.unwrap().unwrap();
        let names: Vec<_> = graph.skills.iter().map(|s| s.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["rust"]);
    }

    #[tokio::test]
    async fn test_recency_refresh_leaves_proficiency() {
        let store = Arc::new(MemoryStore::new());
        let cand = CandidateId::new("cand-1");
        let issued = Utc::now() - Duration::days(40);
        store
            .insert_credential(&fixtures::credential("c1", &cand, &["SQL"], issued))
            .await
            .unwrap();

        let jobs = queue(store.clone());
        let before = jobs.graphs.recompute_at(&cand, issued).await.unwrap();
        jobs.enqueue(Job::RecencyRefresh).await;
        jobs.drain().await;

        let after = store.get_skill_graph(&cand).await.unwrap().unwrap();
        assert_eq!(after.skills[0].proficiency, before.skills[0].proficiency);
        assert_eq!(before.skills[0].recency_score, 100);
        assert_eq!(after.skills[0].recency_score, 90);
        assert!(after.last_updated > before.last_updated);
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let store = Arc::new(MemoryStore::new());
        let jobs = queue(store);
        jobs.enqueue(Job::RecencyRefresh).await;
        jobs.enqueue(Job::RefreshSkillGraph(CandidateId::new("nobody"))).await;
        assert_eq!(jobs.len().await, 2);

        assert!(jobs.run_next().await);
        assert_eq!(
            jobs.pending.lock().await.front(),
            Some(&Job::RefreshSkillGraph(CandidateId::new("nobody")))
        );
        assert!(jobs.run_next().await);
        assert!(!jobs.run_next().await);
        assert!(jobs.is_empty().await);
    }
}
