//! Rarity scoring and ranking
//!
//! Pure post-pass over a finished [`RunResult`]. Each attribute instance
//! scores `1 / (occurrences / total_items)`; an item's score is the sum of its
//! attribute scores, accumulated in attribute order starting from zero.
//! Ranks use exact float equality for ties. Near-equal scores produced by a
//! different summation order would not tie.

use indexmap::IndexMap;

use crate::models::{RankedDataset, RankedItem, RunResult, ScoredAttribute};

/// Score and rank every item of a run
pub fn rank_collection(run: &RunResult) -> RankedDataset {
    let total_items = run.items.len() as f64;

    let mut items: Vec<RankedItem> = run
        .items
        .iter()
        .map(|record| {
            let mut attributes = IndexMap::with_capacity(record.attributes.len());
            let mut occurrences = 0u64;
            let mut score = 0.0f64;

            for (name, instance) in &record.attributes {
                let count = run.layers.count(name, &instance.value_key());
                let attribute_score = 1.0 / (count as f64 / total_items);

                occurrences += count;
                score += attribute_score;
                attributes.insert(
                    name.clone(),
                    ScoredAttribute {
                        value: instance.value.clone(),
                        occurrences: count,
                        score: attribute_score,
                    },
                );
            }

            RankedItem {
                id: record.id,
                name: record.name.clone(),
                image: record.image.clone(),
                attributes,
                occurrences,
                score,
                rank: 0,
            }
        })
        .collect();

    items.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    let scores: Vec<f64> = items.iter().map(|item| item.score).collect();
    for (item, rank) in items.iter_mut().zip(assign_ranks(&scores)) {
        item.rank = rank;
    }

    tracing::debug!(items = items.len(), "Ranked collection");

    RankedDataset {
        items,
        total_attribute_instances: run.total_attribute_instances,
    }
}

/// Competition ranks for scores already sorted in descending order.
///
/// An item tying the previous score shares its rank; any other item takes its
/// 1-based position: `[10, 10, 8, 5, 5]` gives `[1, 1, 3, 4, 4]`.
#[allow(clippy::float_cmp)]
pub fn assign_ranks(sorted_scores: &[f64]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted_scores.len());
    let mut previous: Option<(f64, usize)> = None;

    for (position, &score) in sorted_scores.iter().enumerate() {
        let rank = match previous {
            Some((previous_score, previous_rank)) if previous_score == score => previous_rank,
            _ => position + 1,
        };
        ranks.push(rank);
        previous = Some((score, rank));
    }

    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_ranks_ties_share_first_position() {
        assert_eq!(assign_ranks(&[10.0, 10.0, 8.0, 5.0, 5.0]), vec![1, 1, 3, 4, 4]);
    }

    #[test]
    fn test_assign_ranks_edge_cases() {
        assert!(assign_ranks(&[]).is_empty());
        assert_eq!(assign_ranks(&[3.0]), vec![1]);
        assert_eq!(assign_ranks(&[2.0, 2.0, 2.0]), vec![1, 1, 1]);
        assert_eq!(assign_ranks(&[9.0, 7.0, 7.0, 7.0, 1.0]), vec![1, 2, 2, 2, 5]);
    }

    #[test]
    fn test_empty_run_ranks_nothing() {
        let dataset = rank_collection(&RunResult::new());
        assert!(dataset.is_empty());
    }
}
