use codec::{Decode, Encode};
use hippius_storage_primitives::{Balance, BlockNumber, RoundIndex};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

use crate::identity::{FileId, NodeId};
use crate::store::{Entity, EntityKind, IndexKey};

pub const ORDER_BY_FILE: &str = "fileId";
pub const REPLICA_BY_ORDER: &str = "orderId";

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo, Serialize, Deserialize)]
pub struct Account {
	pub id: String,
}

#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
	#[default]
	Waiting,
	Storing,
	Invalid,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
	pub id: FileId,
	pub cid: Option<String>,
	pub file_size: u64,
	pub reserved: Balance,
	pub base_fee: Balance,
	pub fee: Balance,
	pub expire_at: Option<BlockNumber>,
	pub added_at: Option<BlockNumber>,
	pub first_added_at: Option<BlockNumber>,
	/// Bumped every time the chain reports a new add time, i.e. the file was added again.
	pub add_index: u32,
	/// Epoch rollovers since the last add.
	pub renew_count: u32,
	pub status: FileStatus,
	pub current_order_id: Option<String>,
}

impl File {
	pub fn new(id: FileId) -> Self {
		Self { id, ..Default::default() }
	}
}

/// Audit row of one funding of a file.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFund {
	pub id: String,
	pub funder_id: String,
	pub file_id: FileId,
	pub fee: Balance,
	pub block_number: BlockNumber,
	pub timestamp: u64,
}

/// One commercial term of a file, a.k.a. liquidation epoch.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	pub id: String,
	pub file_id: FileId,
	pub fee: Balance,
	pub file_size: u64,
	pub expire_at: BlockNumber,
	pub renew: u32,
	/// Replicas of this order without a tombstone, as of the last save.
	pub current_replica_ids: Vec<String>,
	pub created_at: BlockNumber,
	pub deleted_at: Option<BlockNumber>,
}

/// A span of time one node held one file under one order.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
	pub id: String,
	pub node_id: NodeId,
	pub file_id: FileId,
	pub order_id: String,
	pub added_at: BlockNumber,
	pub deleted_at: Option<BlockNumber>,
}

impl Replica {
	pub fn is_active(&self) -> bool {
		self.deleted_at.is_none()
	}
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub id: NodeId,
	pub owner_id: Option<String>,
	pub stasher_id: Option<String>,
	pub enclave: Option<String>,
	pub deposit: Balance,
	pub rid: u64,
	pub used: u64,
	pub power: u64,
	pub reported_at: Option<BlockNumber>,
	pub prev_reported_at: Option<BlockNumber>,
}

impl Node {
	pub fn new(id: NodeId) -> Self {
		Self { id, ..Default::default() }
	}
}

/// Global accounting period. Paid rewards of a round are only known one round later.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
	pub id: String,
	pub index: RoundIndex,
	pub begin_at: Option<BlockNumber>,
	pub ended_at: Option<BlockNumber>,
	pub power: Option<u128>,
	pub used: Option<u128>,
	pub mine_reward: Option<Balance>,
	pub store_reward: Option<Balance>,
	pub paid_mine_reward: Option<Balance>,
	pub paid_store_reward: Option<Balance>,
	pub unpaid: Option<Balance>,
}

impl Round {
	pub fn new(index: RoundIndex) -> Self {
		Self { id: index.to_string(), index, ..Default::default() }
	}
}

/// Write-once audit row of one report call.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
	pub id: String,
	pub node_id: NodeId,
	pub round_id: String,
	pub rid: u64,
	pub used: u64,
	pub power: u64,
	pub deposit: Balance,
	pub slash: Balance,
	pub mine_reward: Balance,
	pub share_store_reward: Balance,
	pub direct_store_reward: Balance,
	pub extrinsic_id: String,
	pub block_number: BlockNumber,
	pub timestamp: u64,
}

macro_rules! impl_entity {
	($ty:ty, $kind:expr) => {
		impl Entity for $ty {
			const KIND: EntityKind = $kind;

			fn id(&self) -> &str {
				&self.id
			}
		}
	};
}

impl_entity!(Account, EntityKind::Account);
impl_entity!(File, EntityKind::File);
impl_entity!(FileFund, EntityKind::FileFund);
impl_entity!(Node, EntityKind::Node);
impl_entity!(Round, EntityKind::Round);
impl_entity!(NodeReport, EntityKind::NodeReport);

impl Entity for Order {
	const KIND: EntityKind = EntityKind::Order;

	fn id(&self) -> &str {
		&self.id
	}

	fn index_keys(&self) -> Vec<IndexKey> {
		vec![IndexKey::new(ORDER_BY_FILE, &self.file_id)]
	}
}

impl Entity for Replica {
	const KIND: EntityKind = EntityKind::Replica;

	fn id(&self) -> &str {
		&self.id
	}

	fn index_keys(&self) -> Vec<IndexKey> {
		vec![IndexKey::new(REPLICA_BY_ORDER, &self.order_id)]
	}
}
