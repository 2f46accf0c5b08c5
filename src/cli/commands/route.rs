use anyhow::Context;
use serde::Serialize;
use std::num::NonZeroUsize;

use super::shard_count;
use crate::cli::utils::{output, percent};
use crate::cli::OutputFormat;
use crate::sharding::hash::{restaurant_key, shard_for};

#[derive(Debug, Serialize)]
pub struct Placement {
    pub restaurant_id: i64,
    pub key: String,
    pub shard: usize,
}

#[derive(Debug, Serialize)]
pub struct Distribution {
    pub shards: usize,
    pub total: usize,
    pub counts: Vec<usize>,
}

impl Distribution {
    pub fn spread(&self) -> usize {
        let max = self.counts.iter().max().copied().unwrap_or(0);
        let min = self.counts.iter().min().copied().unwrap_or(0);
        max - min
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Move {
    pub restaurant_id: i64,
    pub from_shard: usize,
    pub to_shard: usize,
}

#[derive(Debug, Serialize)]
pub struct MovePlan {
    pub from: usize,
    pub to: usize,
    pub checked: usize,
    pub moves: Vec<Move>,
}

fn id_range(start: i64, count: u32) -> impl Iterator<Item = i64> {
    (0..i64::from(count)).map_while(move |offset| start.checked_add(offset))
}

pub fn placements(ids: &[i64], shards: NonZeroUsize) -> Vec<Placement> {
    ids.iter()
        .map(|&restaurant_id| Placement {
            restaurant_id,
            key: format!("{:016x}", restaurant_key(restaurant_id)),
            shard: shard_for(restaurant_id, shards),
        })
        .collect()
}

pub fn distribution_of(start: i64, count: u32, shards: NonZeroUsize) -> Distribution {
    let mut counts = vec![0; shards.get()];
    let mut total = 0;
    for id in id_range(start, count) {
        counts[shard_for(id, shards)] += 1;
        total += 1;
    }
    Distribution {
        shards: shards.get(),
        total,
        counts,
    }
}

/// Restaurants whose shard differs between the two counts. Read-only: nothing is migrated.
pub fn plan_moves(from: NonZeroUsize, to: NonZeroUsize, start: i64, count: u32) -> MovePlan {
    let mut checked = 0;
    let moves = id_range(start, count)
        .inspect(|_| checked += 1)
        .filter_map(|restaurant_id| {
            let from_shard = shard_for(restaurant_id, from);
            let to_shard = shard_for(restaurant_id, to);
            (from_shard != to_shard).then_some(Move {
                restaurant_id,
                from_shard,
                to_shard,
            })
        })
        .collect();

    MovePlan {
        from: from.get(),
        to: to.get(),
        checked,
        moves,
    }
}

pub fn route(ids: &[i64], shards: Option<usize>, output_format: OutputFormat) -> anyhow::Result<()> {
    let shards = shard_count(shards)?;
    let placements = placements(ids, shards);

    output(output_format, &placements, || {
        println!("{:>14}  {:>16}  SHARD", "RESTAURANT", "KEY");
        for p in &placements {
            println!("{:>14}  {}  {}", p.restaurant_id, p.key, p.shard);
        }
    })
}

pub fn distribution(start: i64, count: u32, shards: Option<usize>, output_format: OutputFormat) -> anyhow::Result<()> {
    let shards = shard_count(shards)?;
    let dist = distribution_of(start, count, shards);

    output(output_format, &dist, || {
        println!("{} restaurant ids over {} shards", dist.total, dist.shards);
        for (shard, count) in dist.counts.iter().enumerate() {
            println!("  shard {:>3}: {:>8} ({:>5.1}%)", shard, count, percent(*count, dist.total));
        }
        println!("spread (max - min): {}", dist.spread());
    })
}

pub fn moves(from: usize, to: usize, start: i64, count: u32, output_format: OutputFormat) -> anyhow::Result<()> {
    let from = NonZeroUsize::new(from).context("--from must be at least 1")?;
    let to = NonZeroUsize::new(to).context("--to must be at least 1")?;
    let plan = plan_moves(from, to, start, count);

    output(output_format, &plan, || {
        println!(
            "{} of {} restaurant ids move going from {} to {} shards ({:.1}%)",
            plan.moves.len(),
            plan.checked,
            plan.from,
            plan.to,
            percent(plan.moves.len(), plan.checked)
        );
        for m in plan.moves.iter().take(20) {
            println!("  restaurant {:>10}: shard {} -> {}", m.restaurant_id, m.from_shard, m.to_shard);
        }
        if plan.moves.len() > 20 {
            println!("  ... {} more (use --json for the full list)", plan.moves.len() - 20);
        }
    })
}
