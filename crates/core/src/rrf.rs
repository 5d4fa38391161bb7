use std::collections::HashMap;
use std::hash::Hash;

/// Reciprocal Rank Fusion constant shared by Recall and Graph Search.
pub const RRF_K: f64 = 60.0;

/// Fuse any number of ranked lists of the same key type. `score(d) = Σ 1/(K + rank)`
/// over every list the key appears in (1-indexed rank). Ties are broken by the
/// order keys first appear across the input lists, which keeps fusion
/// deterministic for identical inputs.
pub fn reciprocal_rank_fuse<K: Eq + Hash + Clone>(lists: &[Vec<K>]) -> Vec<(K, f64)> {
  let mut scores: HashMap<K, f64> = HashMap::new();
  let mut order: Vec<K> = Vec::new();

  for list in lists {
    for (rank, key) in list.iter().enumerate() {
      let entry = scores.entry(key.clone()).or_insert_with(|| {
        order.push(key.clone());
        0.0
      });
      *entry += 1.0 / (RRF_K + (rank + 1) as f64);
    }
  }

  let mut fused: Vec<(K, f64)> = order
    .into_iter()
    .map(|k| {
      let score = scores[&k];
      (k, score)
    })
    .collect();

  fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
  fused
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fuses_reversed_identical_lists_to_a_stable_order() {
    let a = vec!["x", "y", "z"];
    let b = vec!["z", "y", "x"];
    let fused = reciprocal_rank_fuse(&[a, b]);
    let keys: Vec<_> = fused.iter().map(|(k, _)| *k).collect();
    // Every key appears once in each list at a different rank, so all three
    // should tie; symmetric fusion keeps the order keys were first seen in.
    assert_eq!(keys, vec!["x", "y", "z"]);
  }

  #[test]
  fn prefers_documents_ranked_highly_in_either_list() {
    let a = vec!["top_a", "mid", "bottom"];
    let b = vec!["top_b", "mid", "bottom"];
    let fused = reciprocal_rank_fuse(&[a, b]);
    let keys: Vec<_> = fused.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys[0], "mid");
  }

  #[test]
  fn empty_lists_produce_empty_fusion() {
    let fused: Vec<(&str, f64)> = reciprocal_rank_fuse::<&str>(&[]);
    assert!(fused.is_empty());
  }
}
