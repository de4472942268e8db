//! Replica set reconciliation.
//!
//! An order's `current_replica_ids` is diffed against the holder set the chain
//! reports for the file. Holders that already have an active replica keep it,
//! new holders get a fresh replica row and active replicas of absent holders are
//! tombstoned. Nothing is ever physically deleted, so the rows of one order form
//! the full membership history of that epoch.

use std::collections::BTreeSet;

use hippius_storage_primitives::{BlockNumber, FileOrderInfo};

use crate::config::RolloverPolicy;
use crate::entities::{File, Order, Replica};
use crate::error::Result;
use crate::identity::{order_id, replica_id, replica_node_prefix, NodeId};
use crate::node::ensure_node;
use crate::store::{EntityStore, EntityStoreExt};
use crate::tracker::close_order;
use crate::{BlockContext, LOG_TARGET};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ReplicaDiff {
	/// The order as persisted after the diff.
	pub order: Order,
	pub kept: Vec<String>,
	pub added: Vec<Replica>,
	pub removed: Vec<Replica>,
}

impl ReplicaDiff {
	pub fn is_noop(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}
}

/// Brings `order` in line with `holders`.
///
/// Holders are visited in ascending node id order, so the resulting id list and
/// the rows written only depend on the inputs. The order is saved only when its
/// id list changed.
pub async fn reconcile<S: EntityStore + ?Sized>(
	store: &S,
	mut order: Order,
	holders: &BTreeSet<NodeId>,
	ctx: &BlockContext,
) -> Result<ReplicaDiff> {
	let mut pool = order.current_replica_ids.clone();
	let mut next = Vec::with_capacity(holders.len());
	let mut kept = Vec::new();
	let mut added = Vec::new();

	for node_id in holders {
		let prefix = replica_node_prefix(node_id);
		if let Some(pos) = pool.iter().position(|id| id.starts_with(&prefix)) {
			let id = pool.remove(pos);
			kept.push(id.clone());
			next.push(id);
			continue;
		}

		ensure_node(store, node_id).await?;
		let replica = Replica {
			id: fresh_replica_id(store, node_id, &order.file_id, ctx).await?,
			node_id: node_id.clone(),
			file_id: order.file_id.clone(),
			order_id: order.id.clone(),
			added_at: ctx.block_number,
			deleted_at: None,
		};
		store.save(&replica).await?;
		log::debug!(target: LOG_TARGET, "replica {} added to order {}", replica.id, order.id);
		next.push(replica.id.clone());
		added.push(replica);
	}

	let mut removed = Vec::with_capacity(pool.len());
	for id in pool {
		match store.load::<Replica>(&id).await? {
			Some(replica) => {
				let replica = tombstone_replica(store, replica, ctx.block_number).await?;
				log::debug!(target: LOG_TARGET, "replica {} left order {}", replica.id, order.id);
				removed.push(replica);
			},
			None => log::warn!(target: LOG_TARGET, "order {} lists unknown replica {}", order.id, id),
		}
	}

	if order.current_replica_ids != next {
		order.current_replica_ids = next;
		store.save(&order).await?;
	}
	Ok(ReplicaDiff { order, kept, added, removed })
}

/// Starts a new epoch for `file` because the chain moved the order's expiry.
///
/// Either way no replica of the previous epoch is carried over; the caller
/// reconciles the returned order from an empty list and persists `file`.
pub async fn roll_epoch<S: EntityStore + ?Sized>(
	store: &S,
	file: &mut File,
	order: Order,
	info: &FileOrderInfo,
	ctx: &BlockContext,
	policy: RolloverPolicy,
) -> Result<Order> {
	file.renew_count = file.renew_count.saturating_add(1);
	log::debug!(
		target: LOG_TARGET,
		"file {} expiry moved {} -> {}, rolling over ({:?})",
		file.id,
		order.expire_at,
		info.expire_at,
		policy
	);

	match policy {
		RolloverPolicy::Supersede => {
			close_order(store, order, ctx.block_number).await?;
			let next = Order {
				id: order_id(&file.id, &ctx.origin_id),
				file_id: file.id.clone(),
				fee: info.fee,
				file_size: info.file_size,
				expire_at: info.expire_at,
				renew: file.renew_count,
				current_replica_ids: Vec::new(),
				created_at: ctx.block_number,
				deleted_at: None,
			};
			store.save(&next).await?;
			file.current_order_id = Some(next.id.clone());
			Ok(next)
		},
		RolloverPolicy::Renew => {
			let mut order = order;
			for replica in store.replicas_by_order(&order.id).await? {
				tombstone_replica(store, replica, ctx.block_number).await?;
			}
			order.current_replica_ids.clear();
			order.fee = info.fee;
			order.file_size = info.file_size;
			order.expire_at = info.expire_at;
			order.renew = order.renew.saturating_add(1);
			store.save(&order).await?;
			Ok(order)
		},
	}
}

/// Ends `node_id`'s active membership in `order`, if it has one.
pub async fn tombstone_node<S: EntityStore + ?Sized>(
	store: &S,
	mut order: Order,
	node_id: &str,
	ctx: &BlockContext,
) -> Result<Option<Replica>> {
	let active = store
		.replicas_by_order(&order.id)
		.await?
		.into_iter()
		.find(|replica| replica.is_active() && replica.node_id == node_id);
	let Some(replica) = active else { return Ok(None) };

	let replica = tombstone_replica(store, replica, ctx.block_number).await?;
	order.current_replica_ids.retain(|id| id != &replica.id);
	store.save(&order).await?;
	log::debug!(target: LOG_TARGET, "node {} dropped replica {}", node_id, replica.id);
	Ok(Some(replica))
}

/// Sets the tombstone of an active replica. An existing tombstone is never moved.
pub async fn tombstone_replica<S: EntityStore + ?Sized>(
	store: &S,
	mut replica: Replica,
	block: BlockNumber,
) -> Result<Replica> {
	if replica.is_active() {
		replica.deleted_at = Some(block);
		store.save(&replica).await?;
	}
	Ok(replica)
}

// A node that left and rejoined within one block would reuse the id of its
// tombstoned span, so such a span gets the opening call appended.
async fn fresh_replica_id<S: EntityStore + ?Sized>(
	store: &S,
	node_id: &str,
	file_id: &str,
	ctx: &BlockContext,
) -> Result<String> {
	let id = replica_id(node_id, file_id, ctx.block_number);
	if store.load::<Replica>(&id).await?.is_none() {
		return Ok(id);
	}
	Ok(format!("{id}-{}", ctx.origin_id))
}
