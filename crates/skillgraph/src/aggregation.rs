//! Skill graph aggregation.
//!
//! Turns a candidate's verified and pending credentials into one scored,
//! deduplicated [`CandidateSkillGraph`]. Recomputing is idempotent: the same
//! credentials and clock always produce the same graph.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use skillgraph_core::{
    map_skill_to_nsqf, normalize_skill_name, proficiency, recency_score, source_weight,
    CandidateId, CandidateSkillGraph, Credential, Skill, SkillId, SkillNode, SkillSource,
    VerificationStatus,
};
use skillgraph_store::Store;

use crate::error::Result;

/// Statuses whose credentials feed the graph.
pub const CONTRIBUTING: [VerificationStatus; 2] =
    [VerificationStatus::Verified, VerificationStatus::Pending];

/// Proficiency assumed for a skill entry that carries none.
const DEFAULT_ENTRY_PROFICIENCY: u32 = 50;

#[derive(Clone)]
pub struct SkillGraphService {
    store: Arc<dyn Store>,
}

impl SkillGraphService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, candidate_id: &CandidateId) -> Result<Option<CandidateSkillGraph>> {
        Ok(self.store.get_skill_graph(candidate_id).await?)
    }

    /// Rebuild and store the candidate's graph from their credentials.
    pub async fn recompute(&self, candidate_id: &CandidateId) -> Result<CandidateSkillGraph> {
        self.recompute_at(candidate_id, Utc::now()).await
    }

    pub async fn recompute_at(
        &self,
        candidate_id: &CandidateId,
        now: DateTime<Utc>,
    ) -> Result<CandidateSkillGraph> {
        let credentials = self
            .store
            .credentials_for_candidate(candidate_id, &CONTRIBUTING)
            .await?;

        let mut nodes: Vec<SkillNode> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for credential in &credentials {
            for node in self.map_credential(credential).await? {
                match index.get(&node.normalized_name) {
                    Some(&i) => merge_into(&mut nodes[i], node),
                    None => {
                        index.insert(node.normalized_name.clone(), nodes.len());
                        nodes.push(node);
                    }
                }
            }
        }

        for node in &mut nodes {
            rescore(node, now);
        }

        let graph = CandidateSkillGraph::from_nodes(candidate_id.clone(), nodes, now);
        self.store.upsert_skill_graph(&graph).await?;

        tracing::info!(
            candidate_id = %candidate_id,
            credentials = credentials.len(),
            skills = graph.skill_count,
            overall_score = graph.overall_score,
            "recomputed skill graph"
        );
        Ok(graph)
    }

    /// Merge graph nodes whose normalized names collide.
    ///
    /// Returns `None` when the candidate has no graph.
    pub async fn deduplicate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<CandidateSkillGraph>> {
        let Some(graph) = self.store.get_skill_graph(candidate_id).await? else {
            return Ok(None);
        };

        let before = graph.skills.len();
        let mut merged: Vec<SkillNode> = Vec::with_capacity(before);
        for node in graph.skills {
            let key = normalize_skill_name(&node.skill_name);
            match merged
                .iter_mut()
                .find(|n| normalize_skill_name(&n.skill_name) == key)
            {
                Some(existing) => merge_into(existing, node),
                None => merged.push(node),
            }
        }

        if merged.len() != before {
            tracing::warn!(
                candidate_id = %candidate_id,
                removed = before - merged.len(),
                "merged duplicate skill nodes"
            );
        }

        let graph = CandidateSkillGraph::from_nodes(candidate_id.clone(), merged, graph.last_updated);
        self.store.upsert_skill_graph(&graph).await?;
        Ok(Some(graph))
    }

    /// Hook for anything that adds, deletes or re-statuses a credential.
    pub async fn on_credential_changed(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<CandidateSkillGraph> {
        let graph = self.recompute(candidate_id).await?;
        Ok(self.deduplicate(candidate_id).await?.unwrap_or(graph))
    }

    /// Refresh every graph's recency scores. Proficiency is left alone.
    ///
    /// Returns the number of graphs that changed.
    pub async fn refresh_recency(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;
        for mut graph in self.store.list_skill_graphs().await? {
            let mut updated = false;
            for node in &mut graph.skills {
                let score = recency_score(node.last_verified, now);
                if node.recency_score != score {
                    node.recency_score = score;
                    updated = true;
                }
            }
            if updated {
                graph.last_updated = now;
                self.store.upsert_skill_graph(&graph).await?;
                changed += 1;
            }
        }
        tracing::info!(changed, "refreshed recency scores");
        Ok(changed)
    }

    /// One node per non-blank skill entry of a credential.
    async fn map_credential(&self, credential: &Credential) -> Result<Vec<SkillNode>> {
        let mut nodes = Vec::with_capacity(credential.skills.len());
        let experience = credential.experience_years();
        let verified_date = credential.source_date();

        for claim in &credential.skills {
            let name = claim.skill_name.trim();
            if name.is_empty() {
                tracing::warn!(credential_id = %credential.id, "skipping blank skill entry");
                continue;
            }

            let key = normalize_skill_name(name);
            let mapping = map_skill_to_nsqf(name, credential.credential_type, experience);
            let skill = self
                .store
                .find_or_create_skill(&Skill {
                    id: SkillId::new(uuid::Uuid::new_v4().to_string()),
                    name: name.to_string(),
                    normalized_key: key.clone(),
                    category: mapping.category,
                    nsqf_level: mapping.level,
                    synonyms: vec![key.clone()],
                })
                .await?;

            nodes.push(SkillNode {
                skill_id: skill.id,
                skill_name: skill.name,
                normalized_name: key,
                category: skill.category,
                nsqf_level: mapping.level,
                proficiency: claim.proficiency.unwrap_or(DEFAULT_ENTRY_PROFICIENCY),
                recency_score: 0,
                sources: vec![SkillSource {
                    credential_id: credential.id.clone(),
                    issuer_name: credential.issuer.name.clone(),
                    verified_date,
                    weight: source_weight(credential.credential_type, credential.verification_status),
                }],
                last_verified: Some(verified_date),
            });
        }
        Ok(nodes)
    }
}

fn merge_into(existing: &mut SkillNode, other: SkillNode) {
    existing.sources.extend(other.sources);
    existing.proficiency = existing.proficiency.max(other.proficiency);
    existing.last_verified = existing.last_verified.max(other.last_verified);
}

fn rescore(node: &mut SkillNode, now: DateTime<Utc>) {
    node.recency_score = recency_score(node.last_verified, now);
    node.proficiency = proficiency(node.sources.len(), node.recency_score);
}
