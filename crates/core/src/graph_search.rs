use std::collections::HashMap;

use plastmem_entities::LinkType;
use plastmem_shared::AppError;
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement};
use uuid::Uuid;

use crate::rrf::reciprocal_rank_fuse;

const ALPHA: f64 = 0.15;
const PRUNE_THRESHOLD: f64 = 1e-6;
const FANOUT: i64 = 20;

/// A 2-hop meta-path: the edge type to follow at each hop.
#[derive(Debug, Clone, Copy)]
pub struct MetaPath(pub LinkType, pub LinkType);

const SEMANTIC_SEED_PATTERNS: [MetaPath; 5] = [
  MetaPath(LinkType::Semantic, LinkType::Semantic),
  MetaPath(LinkType::Entity, LinkType::Temporal),
  MetaPath(LinkType::Semantic, LinkType::Causes),
  MetaPath(LinkType::Semantic, LinkType::CausedBy),
  MetaPath(LinkType::Entity, LinkType::Semantic),
];

const TEMPORAL_SEED_PATTERNS: [MetaPath; 2] =
  [MetaPath(LinkType::Temporal, LinkType::Semantic), MetaPath(LinkType::Temporal, LinkType::Entity)];

fn link_type_str(link_type: LinkType) -> &'static str {
  match link_type {
    LinkType::Semantic => "semantic",
    LinkType::Temporal => "temporal",
    LinkType::Entity => "entity",
    LinkType::Causes => "causes",
    LinkType::CausedBy => "caused_by",
  }
}

struct Pattern {
  hops: [LinkType; 2],
  frontier: HashMap<Uuid, f64>,
  scores: HashMap<Uuid, f64>,
}

#[derive(FromQueryResult)]
struct Neighbour {
  from_unit: Uuid,
  to_unit: Uuid,
  weight: f64,
}

/// Loads, for every `(from_node, hop_edge_type)` in `keys` not already in
/// `cache`, the top-`FANOUT` neighbours by raw weight, in one round trip.
async fn fetch_neighbours<C: ConnectionTrait>(
  db: &C,
  keys: &[(Uuid, LinkType)],
  cache: &mut HashMap<(Uuid, LinkType), Vec<(Uuid, f64)>>,
) -> Result<(), AppError> {
  let uncached: Vec<&(Uuid, LinkType)> = keys.iter().filter(|k| !cache.contains_key(*k)).collect();
  if uncached.is_empty() {
    return Ok(());
  }

  let mut by_type: HashMap<LinkType, Vec<Uuid>> = HashMap::new();
  for (node, link_type) in &uncached {
    by_type.entry(*link_type).or_default().push(*node);
  }

  for (link_type, nodes) in by_type {
    let sql = r"
      SELECT l.from_unit AS from_unit, l.to_unit AS to_unit, l.weight AS weight
      FROM (
        SELECT from_unit, to_unit, weight,
               ROW_NUMBER() OVER (PARTITION BY from_unit ORDER BY weight DESC) AS rn
        FROM memory_link
        WHERE from_unit = ANY($1::uuid[]) AND link_type = $2
      ) l
      WHERE l.rn <= $3;
    ";
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      sql,
      [
        sea_orm::sea_query::Value::Array(
          sea_orm::sea_query::ArrayType::Uuid,
          Some(Box::new(nodes.iter().copied().map(Into::into).collect())),
        ),
        link_type_str(link_type).into(),
        FANOUT.into(),
      ],
    );
    let rows = Neighbour::find_by_statement(stmt).all(db).await?;

    let mut grouped: HashMap<Uuid, Vec<(Uuid, f64)>> = HashMap::new();
    for row in rows {
      grouped.entry(row.from_unit).or_default().push((row.to_unit, row.weight));
    }
    for node in nodes {
      cache.insert((node, link_type), grouped.remove(&node).unwrap_or_default());
    }
  }

  Ok(())
}

/// Hop-synchronised meta-path random walk from `seeds` (§4.4). `seeds` pairs
/// a seed unit with its normalised starting mass before entry; this
/// function normalises per-pattern regardless. `from_temporal_seeds`
/// selects which pattern set applies.
pub async fn search<C: ConnectionTrait>(
  db: &C,
  seeds: &[(Uuid, f64)],
  from_temporal_seeds: bool,
  budget: u64,
) -> Result<Vec<(Uuid, f64)>, AppError> {
  if seeds.is_empty() {
    return Ok(Vec::new());
  }

  let total_mass: f64 = seeds.iter().map(|(_, m)| m).sum();
  let normalised_seeds: Vec<(Uuid, f64)> = if total_mass > 0.0 {
    seeds.iter().map(|(id, m)| (*id, m / total_mass)).collect()
  } else {
    seeds.iter().map(|(id, _)| (*id, 1.0 / seeds.len() as f64)).collect()
  };

  let meta_paths: &[MetaPath] = if from_temporal_seeds { &TEMPORAL_SEED_PATTERNS } else { &SEMANTIC_SEED_PATTERNS };

  let mut patterns: Vec<Pattern> = meta_paths
    .iter()
    .map(|mp| Pattern {
      hops: [mp.0, mp.1],
      frontier: normalised_seeds.iter().cloned().collect(),
      scores: HashMap::new(),
    })
    .collect();

  let mut cache: HashMap<(Uuid, LinkType), Vec<(Uuid, f64)>> = HashMap::new();

  for hop in 0..2usize {
    let fetch_keys: Vec<(Uuid, LinkType)> = patterns
      .iter()
      .flat_map(|p| p.frontier.keys().map(move |&node| (node, p.hops[hop])))
      .collect();
    fetch_neighbours(db, &fetch_keys, &mut cache).await?;

    for pattern in &mut patterns {
      let mut next_frontier: HashMap<Uuid, f64> = HashMap::new();
      for (&node, &mass) in &pattern.frontier {
        *pattern.scores.entry(node).or_insert(0.0) += ALPHA * mass;

        let neighbours = cache.get(&(node, pattern.hops[hop])).cloned().unwrap_or_default();
        let total_weight: f64 = neighbours.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
          continue;
        }
        let push_mass = (1.0 - ALPHA) * mass;
        for (neighbour, weight) in neighbours {
          let share = push_mass * (weight / total_weight);
          if share < PRUNE_THRESHOLD {
            continue;
          }
          *next_frontier.entry(neighbour).or_insert(0.0) += share;
        }
      }
      pattern.frontier = next_frontier;
    }
  }

  // Fold residual frontier mass into scores after the last hop.
  for pattern in &mut patterns {
    for (&node, &mass) in &pattern.frontier {
      *pattern.scores.entry(node).or_insert(0.0) += mass;
    }
  }

  let ranked_lists: Vec<Vec<Uuid>> = patterns
    .iter()
    .map(|p| {
      let mut ranked: Vec<(Uuid, f64)> = p.scores.iter().map(|(&id, &s)| (id, s)).collect();
      ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
      ranked.into_iter().map(|(id, _)| id).collect()
    })
    .collect();

  let fused = reciprocal_rank_fuse(&ranked_lists);
  Ok(fused.into_iter().take(budget as usize).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_seed_normalises_to_full_mass() {
    let seeds = vec![(Uuid::nil(), 2.0)];
    let total: f64 = seeds.iter().map(|(_, m)| m).sum();
    assert!((total - 2.0).abs() < 1e-9);
  }

  #[test]
  fn semantic_patterns_cover_five_meta_paths() {
    assert_eq!(SEMANTIC_SEED_PATTERNS.len(), 5);
  }

  #[test]
  fn temporal_patterns_cover_two_meta_paths() {
    assert_eq!(TEMPORAL_SEED_PATTERNS.len(), 2);
  }
}
