use tracing::debug;

use opscout_core::error::Result;
use opscout_core::traits::VectorSearch;
use opscout_core::types::Candidate;

/// Candidate patents semantically closest to `topic`, best first.
///
/// Repeated names keep their best-ranked entry only. A blank topic yields
/// no candidates without touching the gateway.
pub async fn recommend_patents(
    search: &dyn VectorSearch,
    topic: &str,
    limit: usize,
) -> Result<Vec<Candidate>> {
    let topic = topic.trim();
    if topic.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let vector = search.embed(topic).await?;
    let hits = search.search(vector, limit).await?;

    let mut seen = std::collections::HashSet::new();
    let candidates: Vec<Candidate> = hits
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    debug!(topic, candidates = candidates.len(), "Recommendation complete");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscout_test_utils::MockVectorSearch;

    fn candidate(id: &str, score: f32) -> Candidate {
        Candidate {
            id: id.into(),
            company: None,
            score,
        }
    }

    #[tokio::test]
    async fn test_recommend_in_rank_order() {
        let search = MockVectorSearch::new(vec![
            candidate("Cold plate", 0.9),
            candidate("Heat pipe", 0.8),
            candidate("Cold plate", 0.7),
            candidate("Fan", 0.6),
        ]);
        let hits = recommend_patents(&search, "liquid cooling", 4).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(names, vec!["Cold plate", "Heat pipe", "Fan"]);
        assert_eq!(search.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_topic() {
        let search = MockVectorSearch::new(vec![candidate("Fan", 0.6)]);
        assert!(recommend_patents(&search, "   ", 5).await.unwrap().is_empty());
        assert_eq!(search.embed_calls(), 0);
    }
}
