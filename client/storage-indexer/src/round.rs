//! Round (session) aggregates.
//!
//! Rewards of round `n` are paid out while round `n + 1` runs, so the paid totals
//! of a round only become known at the boundary that closes its successor.

use hippius_storage_primitives::{Balance, BlockNumber, RewardInfo, RoundIndex, SummaryStats, Terminology};

use crate::chain::{decode_value, query_batch, ChainQuery, StorageKey};
use crate::entities::Round;
use crate::error::Result;
use crate::store::{EntityStore, EntityStoreExt};
use crate::LOG_TARGET;

/// Rounds written by one boundary.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RoundBoundary {
	pub ended: Round,
	pub previous: Option<Round>,
}

pub async fn get_or_create_round<C, S>(
	chain: &C,
	store: &S,
	terms: &Terminology,
	index: RoundIndex,
) -> Result<Round>
where
	C: ChainQuery + ?Sized,
	S: EntityStore + ?Sized,
{
	if let Some(round) = store.load::<Round>(&index.to_string()).await? {
		return Ok(round);
	}

	let keys = [StorageKey::new(terms.rounds_summary, index), StorageKey::new(terms.rounds_reward, index)];
	let mut values = query_batch(chain, &keys).await?.into_iter();
	let summary: Option<SummaryStats> = decode_value(&keys[0], values.next().flatten())?;
	let reward: Option<RewardInfo> = decode_value(&keys[1], values.next().flatten())?;

	let mut round = Round::new(index);
	merge_chain_state(&mut round, summary.as_ref(), reward.as_ref());
	round.begin_at = ended_at_before(store, index).await?;
	store.save(&round).await?;
	Ok(round)
}

/// Closes round `index` at `block` and settles the paid totals of round `index - 1`.
///
/// Values the chain reports overwrite stored ones; values it no longer has keep
/// what is stored. `ended_at` is only ever set once.
pub async fn finalize_round_boundary<C, S>(
	chain: &C,
	store: &S,
	terms: &Terminology,
	index: RoundIndex,
	unpaid: Balance,
	block: BlockNumber,
) -> Result<RoundBoundary>
where
	C: ChainQuery + ?Sized,
	S: EntityStore + ?Sized,
{
	let prev_index = previous_index(index);
	let mut keys = vec![StorageKey::new(terms.rounds_reward, index), StorageKey::new(terms.rounds_summary, index)];
	if let Some(prev) = prev_index {
		keys.push(StorageKey::new(terms.rounds_reward, prev));
		keys.push(StorageKey::new(terms.rounds_summary, prev));
	}
	let mut values = query_batch(chain, &keys).await?.into_iter();
	let reward: Option<RewardInfo> = decode_value(&keys[0], values.next().flatten())?;
	let summary: Option<SummaryStats> = decode_value(&keys[1], values.next().flatten())?;

	let mut ended = load_round(store, index).await?;
	merge_chain_state(&mut ended, summary.as_ref(), reward.as_ref());
	ended.ended_at.get_or_insert(block);

	let previous = match prev_index {
		Some(prev) => {
			let prev_reward: Option<RewardInfo> = decode_value(&keys[2], values.next().flatten())?;
			let prev_summary: Option<SummaryStats> = decode_value(&keys[3], values.next().flatten())?;
			let mut previous = match store.load::<Round>(&prev.to_string()).await? {
				Some(round) => round,
				None => {
					// first seen here, never again as the ended round
					let mut round = Round::new(prev);
					merge_chain_state(&mut round, prev_summary.as_ref(), prev_reward.as_ref());
					round.begin_at = ended_at_before(store, prev).await?;
					round
				},
			};
			previous.paid_mine_reward = prev_reward.as_ref().map(|r| r.paid_mine_reward).or(previous.paid_mine_reward);
			previous.paid_store_reward =
				prev_reward.as_ref().map(|r| r.paid_store_reward).or(previous.paid_store_reward);
			previous.unpaid = Some(unpaid);
			if ended.begin_at.is_none() {
				ended.begin_at = previous.ended_at;
			}
			store.save(&previous).await?;
			Some(previous)
		},
		None => None,
	};
	store.save(&ended).await?;

	log::info!(
		target: LOG_TARGET,
		"round {} ended at #{}, unpaid {} carried into round {:?}",
		index,
		block,
		unpaid,
		prev_index
	);
	Ok(RoundBoundary { ended, previous })
}

fn previous_index(index: RoundIndex) -> Option<RoundIndex> {
	index.checked_sub(1)
}

async fn load_round<S: EntityStore + ?Sized>(store: &S, index: RoundIndex) -> Result<Round> {
	Ok(store.load::<Round>(&index.to_string()).await?.unwrap_or_else(|| Round::new(index)))
}

/// Overwrites the chain-sourced totals of `round` with whatever the chain still reports.
fn merge_chain_state(round: &mut Round, summary: Option<&SummaryStats>, reward: Option<&RewardInfo>) {
	round.power = summary.map(|s| s.power).or(round.power);
	round.used = summary.map(|s| s.used).or(round.used);
	round.mine_reward = reward.map(|r| r.mine_reward).or(round.mine_reward);
	round.store_reward = reward.map(|r| r.store_reward).or(round.store_reward);
}

async fn ended_at_before<S: EntityStore + ?Sized>(store: &S, index: RoundIndex) -> Result<Option<BlockNumber>> {
	match previous_index(index) {
		Some(prev) => Ok(store.load::<Round>(&prev.to_string()).await?.and_then(|round| round.ended_at)),
		None => Ok(None),
	}
}
