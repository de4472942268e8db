//! Accounts and storage nodes.

use std::collections::{BTreeMap, BTreeSet};

use hippius_storage_primitives::{NodeInfo, RegisterInfo, StashInfo, Terminology};
use sp_core::crypto::AccountId32;

use crate::chain::{decode_value, query_batch, ChainQuery, StorageKey};
use crate::entities::{Account, Node};
use crate::error::{Error, Result};
use crate::identity::{account_id_of, hex_of, node_id_of, NodeId};
use crate::store::{EntityStore, EntityStoreExt};

pub async fn ensure_account<S: EntityStore + ?Sized>(store: &S, account: &AccountId32) -> Result<Account> {
	let id = account_id_of(account);
	if let Some(existing) = store.load::<Account>(&id).await? {
		return Ok(existing);
	}
	let account = Account { id };
	store.save(&account).await?;
	Ok(account)
}

/// Refreshes the node of `machine_id` from its registration, stash and node records.
///
/// All three are fetched in one batch. Registration and stash must exist; the node
/// record only appears after the first report and is optional.
pub async fn sync_node<C, S>(
	chain: &C,
	store: &S,
	terms: &Terminology,
	owner: &AccountId32,
	machine_id: &[u8],
) -> Result<Node>
where
	C: ChainQuery + ?Sized,
	S: EntityStore + ?Sized,
{
	let node_id = node_id_of(machine_id);
	let keys = [
		StorageKey::new(terms.registers, machine_id),
		StorageKey::new(terms.stashs, owner),
		StorageKey::new(terms.nodes, owner),
	];
	let mut values = query_batch(chain, &keys).await?.into_iter();
	let register: Option<RegisterInfo> = decode_value(&keys[0], values.next().flatten())?;
	let stash: Option<StashInfo> = decode_value(&keys[1], values.next().flatten())?;
	let info: Option<NodeInfo> = decode_value(&keys[2], values.next().flatten())?;

	let register =
		register.ok_or_else(|| Error::MissingNodeState { node_id: node_id.clone(), record: "registration" })?;
	let stash = stash.ok_or_else(|| Error::MissingNodeState { node_id: node_id.clone(), record: "stash" })?;

	let mut node = store.load::<Node>(&node_id).await?.unwrap_or_else(|| Node::new(node_id));
	node.enclave = Some(hex_of(&register.enclave));
	node.owner_id = Some(ensure_account(store, owner).await?.id);
	node.stasher_id = Some(ensure_account(store, &stash.stasher).await?.id);
	node.deposit = stash.deposit;
	if let Some(info) = info {
		node.rid = info.rid;
		node.used = info.used;
		node.power = info.power;
		if node.reported_at != Some(info.reported_at) {
			node.prev_reported_at = node.reported_at;
			node.reported_at = Some(info.reported_at);
		}
	}
	store.save(&node).await?;
	Ok(node)
}

/// Looks up the machine id behind every account in one stash batch.
///
/// Accounts without a stash, or whose stash has no machine bound, map to `None`.
pub async fn resolve_machines<C: ChainQuery + ?Sized>(
	chain: &C,
	terms: &Terminology,
	accounts: &BTreeSet<AccountId32>,
) -> Result<BTreeMap<AccountId32, Option<NodeId>>> {
	let keys: Vec<StorageKey> = accounts.iter().map(|account| StorageKey::new(terms.stashs, account)).collect();
	let values = query_batch(chain, &keys).await?;

	let mut resolved = BTreeMap::new();
	for ((account, key), raw) in accounts.iter().zip(&keys).zip(values) {
		let stash: Option<StashInfo> = decode_value(key, raw)?;
		let node_id = stash.and_then(|stash| stash.machine_id).map(|machine| node_id_of(&machine));
		resolved.insert(account.clone(), node_id);
	}
	Ok(resolved)
}

/// Returns the node row, creating a bare one when the node was never registered here.
pub async fn ensure_node<S: EntityStore + ?Sized>(store: &S, node_id: &str) -> Result<Node> {
	if let Some(node) = store.load::<Node>(node_id).await? {
		return Ok(node);
	}
	let node = Node::new(node_id.to_string());
	store.save(&node).await?;
	Ok(node)
}
