//! Processing of node `report` calls.
//!
//! A report is applied in four phases separated by barriers: removals, new
//! orders, touched files and explicit per-node deletions. A later phase may
//! depend on an order opened or closed by an earlier one. Files within a phase
//! are independent and run concurrently. Every write goes through a
//! [`StagedStore`] that is only committed once all phases succeeded.

use std::collections::{BTreeMap, BTreeSet};

use futures::stream::{self, StreamExt, TryStreamExt};
use hippius_storage_primitives::{FileOrderInfo, RawFileId, ReportCall};
use sp_core::crypto::AccountId32;

use crate::chain::{fetch_file_states, ChainQuery, FileState};
use crate::differ::{reconcile, roll_epoch, tombstone_node, ReplicaDiff};
use crate::entities::{File, FileStatus, Node, NodeReport, Order};
use crate::error::{Error, Result};
use crate::identity::{account_id_of, normalize_file_id, order_id, FileId, NodeId};
use crate::node::{resolve_machines, sync_node};
use crate::round::get_or_create_round;
use crate::store::{EntityStore, EntityStoreExt, StagedStore};
use crate::tracker::{close_current_order, sync_file, FileRole};
use crate::{BlockContext, Indexer, LOG_TARGET};

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ReportOutcome {
	/// The call failed on chain; nothing was written.
	Rejected,
	Processed(ReportSummary),
}

#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct ReportSummary {
	pub removed: usize,
	pub ordered: usize,
	pub touched: usize,
	/// Touched files left alone because a holder could not be resolved.
	pub skipped: usize,
	pub deleted: usize,
	pub replicas_added: usize,
	pub replicas_removed: usize,
	/// Rows written or removed on commit.
	pub writes: usize,
}

impl ReportSummary {
	fn absorb(&mut self, diff: &ReplicaDiff) {
		self.replicas_added += diff.added.len();
		self.replicas_removed += diff.removed.len();
	}
}

enum Touched {
	Reconciled(ReplicaDiff),
	Skipped,
}

type Machines = BTreeMap<AccountId32, Option<NodeId>>;

impl<C: ChainQuery, S: EntityStore> Indexer<C, S> {
	pub async fn process_report(&self, call: &ReportCall) -> Result<ReportOutcome> {
		if !call.success {
			log::debug!(target: LOG_TARGET, "report {} failed on chain, ignoring", call.id);
			return Ok(ReportOutcome::Rejected);
		}

		let terms = self.terminology();
		let event = call
			.events
			.iter()
			.find(|event| event.is(terms.section, terms.node_reported))
			.ok_or_else(|| Error::MissingReportEvent { report_id: call.id.clone() })?;
		let reported = self
			.config()
			.revision
			.decode_node_reported(&event.data)
			.map_err(|e| Error::decode(format!("{} event {}", terms.node_reported, event.id), e))?;
		let ctx = BlockContext::of_call(call);

		let staged = StagedStore::new(self.store());
		let node = sync_node(self.chain(), &staged, terms, &reported.reporter, &reported.machine_id).await?;
		let round = get_or_create_round(self.chain(), &staged, terms, reported.round).await?;
		if staged.load::<NodeReport>(&call.id).await?.is_some() {
			return Err(Error::DuplicateReport { report_id: call.id.clone() });
		}
		staged
			.save(&NodeReport {
				id: call.id.clone(),
				node_id: node.id.clone(),
				round_id: round.id.clone(),
				rid: call.rid,
				used: node.used,
				power: node.power,
				deposit: node.deposit,
				slash: reported.slash,
				mine_reward: reported.mine_reward,
				share_store_reward: reported.share_store_reward,
				direct_store_reward: reported.direct_store_reward,
				extrinsic_id: call.extrinsic_id.clone(),
				block_number: call.block_number,
				timestamp: call.timestamp,
			})
			.await?;

		let removed = self.event_file_ids(call, terms.file_removed)?;
		let ordered = self.event_file_ids(call, terms.file_new_order)?;
		let touched = file_ids(call.add_files.iter().map(|(raw, _)| raw).chain(&call.settle_files));
		let deleted = file_ids(&call.del_files);

		let mut lookup = touched.clone();
		lookup.extend(deleted.clone());
		lookup.extend(ordered.clone());
		let states = fetch_file_states(self.chain(), terms, &lookup).await?;

		let holders: BTreeSet<AccountId32> = ordered
			.keys()
			.chain(touched.keys())
			.filter_map(|id| states.get(id).and_then(|state| state.order.as_ref()))
			.flat_map(|order| order.replicas.iter().cloned())
			.collect();
		let machines = resolve_machines(self.chain(), terms, &holders).await?;

		let mut summary = ReportSummary::default();
		let limit = self.config().max_concurrent_files;

		let closed: Vec<()> = stream::iter(removed.iter())
			.map(|(id, raw)| self.remove_file(&staged, id, raw, &ctx))
			.buffer_unordered(limit)
			.try_collect()
			.await?;
		summary.removed = closed.len();

		let opened: Vec<ReplicaDiff> = stream::iter(ordered.keys())
			.map(|id| self.open_order(&staged, id, states.get(id), &machines, &ctx))
			.buffer_unordered(limit)
			.try_collect()
			.await?;
		summary.ordered = opened.len();
		opened.iter().for_each(|diff| summary.absorb(diff));

		let reconciled: Vec<Touched> = stream::iter(touched.keys())
			.map(|id| self.touch_file(&staged, id, states.get(id), removed.contains_key(id), &machines, &ctx))
			.buffer_unordered(limit)
			.try_collect()
			.await?;
		for outcome in &reconciled {
			match outcome {
				Touched::Reconciled(diff) => {
					summary.touched += 1;
					summary.absorb(diff);
				},
				Touched::Skipped => summary.skipped += 1,
			}
		}

		let dropped: Vec<bool> = stream::iter(deleted.keys())
			.map(|id| self.drop_replica(&staged, id, states.get(id), &reported.reporter, &node, &ctx))
			.buffer_unordered(limit)
			.try_collect()
			.await?;
		summary.deleted = dropped.into_iter().filter(|dropped| *dropped).count();
		summary.replicas_removed += summary.deleted;

		summary.writes = staged.commit().await?;
		log::info!(
			target: LOG_TARGET,
			"report {} by node {} in round {}: {} removed, {} ordered, {} touched, {} skipped, {} deleted, {} writes",
			call.id,
			node.id,
			round.index,
			summary.removed,
			summary.ordered,
			summary.touched,
			summary.skipped,
			summary.deleted,
			summary.writes,
		);
		Ok(ReportOutcome::Processed(summary))
	}

	async fn remove_file(
		&self,
		store: &StagedStore<'_, S>,
		file_id: &str,
		raw: &[u8],
		ctx: &BlockContext,
	) -> Result<()> {
		let mut file = sync_file(store, file_id, raw, None, None, FileRole::Removed).await?;
		close_current_order(store, &mut file, ctx.block_number).await?;
		file.status = FileStatus::Invalid;
		store.save(&file).await?;
		log::debug!(target: LOG_TARGET, "file {} removed at #{}", file_id, ctx.block_number);
		Ok(())
	}

	async fn open_order(
		&self,
		store: &StagedStore<'_, S>,
		file_id: &str,
		state: Option<&FileState>,
		machines: &Machines,
		ctx: &BlockContext,
	) -> Result<ReplicaDiff> {
		let (state, info) = state
			.and_then(|state| state.order.as_ref().map(|info| (state, info)))
			.ok_or_else(|| Error::MissingFileState { file_id: file_id.to_string() })?;
		let holders = holder_nodes(info, machines)?;

		let mut file = sync_file(store, file_id, &state.raw, state.file.as_ref(), Some(info), FileRole::Ordered).await?;
		close_current_order(store, &mut file, ctx.block_number).await?;
		let order = Order {
			id: order_id(file_id, &ctx.origin_id),
			file_id: file_id.to_string(),
			fee: info.fee,
			file_size: info.file_size,
			expire_at: info.expire_at,
			renew: file.renew_count,
			current_replica_ids: Vec::new(),
			created_at: ctx.block_number,
			deleted_at: None,
		};
		store.save(&order).await?;
		file.current_order_id = Some(order.id.clone());
		store.save(&file).await?;
		reconcile(store, order, &holders, ctx).await
	}

	async fn touch_file(
		&self,
		store: &StagedStore<'_, S>,
		file_id: &str,
		state: Option<&FileState>,
		removed_here: bool,
		machines: &Machines,
		ctx: &BlockContext,
	) -> Result<Touched> {
		if removed_here {
			return Ok(Touched::Skipped);
		}
		let (state, info) = state
			.and_then(|state| state.order.as_ref().map(|info| (state, info)))
			.ok_or_else(|| Error::MissingFileState { file_id: file_id.to_string() })?;
		let holders = match holder_nodes(info, machines) {
			Ok(holders) => holders,
			Err(err @ Error::UnresolvedNode { .. }) => {
				log::warn!(target: LOG_TARGET, "skipping file {}: {}", file_id, err);
				return Ok(Touched::Skipped);
			},
			Err(err) => return Err(err),
		};

		let mut file = sync_file(store, file_id, &state.raw, state.file.as_ref(), Some(info), FileRole::Touched).await?;
		let current = file
			.current_order_id
			.clone()
			.ok_or_else(|| Error::NoCurrentOrder { file_id: file_id.to_string() })?;
		let mut order = load_order(store, &file, &current).await?;
		if order.expire_at != info.expire_at {
			order = roll_epoch(store, &mut file, order, info, ctx, self.config().rollover).await?;
			store.save(&file).await?;
		}
		reconcile(store, order, &holders, ctx).await.map(Touched::Reconciled)
	}

	/// The reporter says it no longer holds `file_id`. Only acted upon once the
	/// chain agrees.
	async fn drop_replica(
		&self,
		store: &StagedStore<'_, S>,
		file_id: &str,
		state: Option<&FileState>,
		reporter: &AccountId32,
		node: &Node,
		ctx: &BlockContext,
	) -> Result<bool> {
		let Some(state) = state.filter(|state| state.order.is_some()) else { return Ok(false) };
		if state.is_held_by(reporter) {
			return Ok(false);
		}
		let Some(file) = store.load::<File>(file_id).await? else { return Ok(false) };
		let Some(current) = file.current_order_id.as_deref() else { return Ok(false) };
		let Some(order) = store.load::<Order>(current).await? else { return Ok(false) };
		Ok(tombstone_node(store, order, &node.id, ctx).await?.is_some())
	}

	fn event_file_ids(&self, call: &ReportCall, method: &str) -> Result<BTreeMap<FileId, RawFileId>> {
		let terms = self.terminology();
		call.events
			.iter()
			.filter(|event| event.is(terms.section, method))
			.map(|event| {
				let raw = self
					.config()
					.revision
					.decode_file_id(&event.data)
					.map_err(|e| Error::decode(format!("{method} event {}", event.id), e))?;
				Ok((normalize_file_id(&raw), raw))
			})
			.collect()
	}
}

fn file_ids<'a>(raws: impl IntoIterator<Item = &'a RawFileId>) -> BTreeMap<FileId, RawFileId> {
	raws.into_iter().map(|raw| (normalize_file_id(raw), raw.clone())).collect()
}

fn holder_nodes(info: &FileOrderInfo, machines: &Machines) -> Result<BTreeSet<NodeId>> {
	info.replicas
		.iter()
		.map(|account| {
			machines
				.get(account)
				.cloned()
				.flatten()
				.ok_or_else(|| Error::UnresolvedNode { account: account_id_of(account) })
		})
		.collect()
}

async fn load_order<S: EntityStore + ?Sized>(store: &S, file: &File, order_id: &str) -> Result<Order> {
	store
		.load::<Order>(order_id)
		.await?
		.ok_or_else(|| Error::MissingOrder { file_id: file.id.clone(), order_id: order_id.to_string() })
}
