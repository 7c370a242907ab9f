//! Brute-force cosine-similarity vector search over SOP documents
//! (spec.md §4.3 step 5), grounded on `vector-store`'s similarity-scan
//! approach but without its HNSW index — the corpus size this system
//! targets (a few hundred SOP documents) doesn't need it.

use crate::embedding_cache::EmbeddingCache;
use crate::error::ResolverResult;
use docflow_tools::llm::LlmClient;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorCandidate {
    pub doc_id: String,
    pub score: f32,
}

struct IndexedText {
    doc_id: String,
    text: String,
    embedding: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<IndexedText>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorIndex {
    /// Build the index by embedding `<doc_id>`, `<doc_id>: <description>`,
    /// and every alias for each document, separately, pulling from (and
    /// populating) the shared cache.
    pub async fn build(
        docs: &[(String, String, Vec<String>)],
        client: &LlmClient,
        cache: &mut EmbeddingCache,
    ) -> ResolverResult<Self> {
        let mut entries = Vec::new();
        for (doc_id, description, aliases) in docs {
            let mut texts = vec![doc_id.clone(), format!("{doc_id}: {description}")];
            texts.extend(aliases.iter().cloned());
            for text in texts {
                let embedding = match cache.get(&text) {
                    Some(e) => e.clone(),
                    None => {
                        let e = client.embed(&text).await?;
                        cache.insert(text.clone(), e.clone());
                        e
                    }
                };
                entries.push(IndexedText { doc_id: doc_id.clone(), text, embedding });
            }
        }
        Ok(Self { entries })
    }

    /// Top-K candidates, deduped by `doc_id` keeping the best score.
    pub fn query(&self, query_embedding: &[f32], top_k: usize) -> Vec<VectorCandidate> {
        let mut best: HashMap<String, f32> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for entry in &self.entries {
            let score = cosine_similarity(query_embedding, &entry.embedding);
            match best.get(&entry.doc_id) {
                Some(existing) if *existing >= score => {}
                _ => {
                    if !best.contains_key(&entry.doc_id) {
                        order.push(entry.doc_id.clone());
                    }
                    best.insert(entry.doc_id.clone(), score);
                }
            }
        }
        let mut candidates: Vec<VectorCandidate> =
            order.into_iter().map(|doc_id| VectorCandidate { score: best[&doc_id], doc_id }).collect();
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(top_k);
        candidates
    }
}

/// Merge original-query and rewritten-query results: dedup by `doc_id`,
/// best score wins, ties broken by first appearance (original-query list
/// first, per spec.md §4.3 step 5).
pub fn merge_vector_results(original: Vec<VectorCandidate>, rewritten: Vec<VectorCandidate>) -> Vec<VectorCandidate> {
    let mut best: IndexMapScore = IndexMapScore::default();
    for candidate in original.into_iter().chain(rewritten) {
        best.insert_if_better(candidate);
    }
    let mut merged = best.into_vec();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[derive(Default)]
struct IndexMapScore {
    order: Vec<String>,
    scores: HashMap<String, f32>,
}

impl IndexMapScore {
    fn insert_if_better(&mut self, candidate: VectorCandidate) {
        match self.scores.get(&candidate.doc_id) {
            Some(existing) if *existing >= candidate.score => {}
            _ => {
                if !self.scores.contains_key(&candidate.doc_id) {
                    self.order.push(candidate.doc_id.clone());
                }
                self.scores.insert(candidate.doc_id, candidate.score);
            }
        }
    }

    fn into_vec(self) -> Vec<VectorCandidate> {
        self.order.into_iter().map(|doc_id| VectorCandidate { score: self.scores[&doc_id], doc_id }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_dedupes_keeping_best_score_ties_broken_by_first_appearance() {
        let original = vec![VectorCandidate { doc_id: "a".into(), score: 0.4 }, VectorCandidate { doc_id: "b".into(), score: 0.9 }];
        let rewritten = vec![VectorCandidate { doc_id: "a".into(), score: 0.8 }, VectorCandidate { doc_id: "c".into(), score: 0.4 }];
        let merged = merge_vector_results(original, rewritten);
        assert_eq!(merged[0].doc_id, "b");
        assert_eq!(merged[1].doc_id, "a");
        assert_eq!(merged[1].score, 0.8);
        assert_eq!(merged.iter().filter(|c| c.doc_id == "a").count(), 1);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
