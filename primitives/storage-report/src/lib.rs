#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode};
use scale_info::prelude::string::String;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::crypto::AccountId32;
use sp_std::vec::Vec;

pub type Balance = u128;
pub type BlockNumber = u64;
pub type RoundIndex = u32;

/// Raw content identifier as carried by extrinsics and events.
pub type RawFileId = Vec<u8>;
/// Raw machine identifier of a storage node.
pub type MachineId = Vec<u8>;

/// Authoritative order (liquidation epoch) of a file as kept by the chain.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct FileOrderInfo {
	pub fee: Balance,
	pub file_size: u64,
	/// Expiry block under the file-order vocabulary, liquidation block under the session one.
	pub expire_at: BlockNumber,
	pub replicas: Vec<AccountId32>,
}

/// Authoritative stored-file record.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct StoreFileInfo {
	pub reserved: Balance,
	pub base_fee: Balance,
	pub file_size: u64,
	pub added_at: BlockNumber,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct RegisterInfo {
	pub enclave: Vec<u8>,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct StashInfo {
	pub stasher: AccountId32,
	pub deposit: Balance,
	pub machine_id: Option<MachineId>,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct NodeInfo {
	pub rid: u64,
	pub used: u64,
	pub power: u64,
	pub reported_at: BlockNumber,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo)]
pub struct RewardInfo {
	pub mine_reward: Balance,
	pub store_reward: Balance,
	pub paid_mine_reward: Balance,
	pub paid_store_reward: Balance,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, Default, TypeInfo)]
pub struct SummaryStats {
	pub power: u128,
	pub used: u128,
}

/// An event emitted alongside a call, still SCALE encoded.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct RawEvent {
	pub id: String,
	pub section: String,
	pub method: String,
	pub data: Vec<u8>,
}

impl RawEvent {
	pub fn is(&self, section: &str, method: &str) -> bool {
		self.section == section && self.method == method
	}
}

/// A node `report` call with the events it emitted.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct ReportCall {
	pub id: String,
	pub extrinsic_id: String,
	pub success: bool,
	pub block_number: BlockNumber,
	pub timestamp: u64,
	pub rid: u64,
	pub add_files: Vec<(RawFileId, u64)>,
	pub del_files: Vec<RawFileId>,
	pub settle_files: Vec<RawFileId>,
	pub events: Vec<RawEvent>,
}

/// Payload of the node-reported event after the revision adapter ran.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct NodeReported {
	pub reporter: AccountId32,
	pub machine_id: MachineId,
	pub round: RoundIndex,
	pub slash: Balance,
	pub mine_reward: Balance,
	pub share_store_reward: Balance,
	pub direct_store_reward: Balance,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct FileFunded {
	pub cid: RawFileId,
	pub funder: AccountId32,
	pub fee: Balance,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct NodeRegistered {
	pub owner: AccountId32,
	pub machine_id: MachineId,
}

#[derive(Clone, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub struct RoundEnded {
	pub round: RoundIndex,
	pub unpaid: Balance,
}

/// Storage paths and event names of one runtime revision of the storage pallet.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Terminology {
	pub section: &'static str,
	pub store_files: &'static str,
	pub file_orders: &'static str,
	pub registers: &'static str,
	pub stashs: &'static str,
	pub nodes: &'static str,
	pub rounds_reward: &'static str,
	pub rounds_summary: &'static str,
	pub node_reported: &'static str,
	pub file_removed: &'static str,
	pub file_new_order: &'static str,
	pub file_funded: &'static str,
	pub node_registered: &'static str,
	pub round_end: &'static str,
}

const FILE_ORDER_TERMS: Terminology = Terminology {
	section: "fileStorage",
	store_files: "fileStorage.storeFiles",
	file_orders: "fileStorage.fileOrders",
	registers: "fileStorage.registers",
	stashs: "fileStorage.stashs",
	nodes: "fileStorage.nodes",
	rounds_reward: "fileStorage.roundsReward",
	rounds_summary: "fileStorage.roundsSummary",
	node_reported: "NodeReported",
	file_removed: "StoreFileRemoved",
	file_new_order: "StoreFileNewOrder",
	file_funded: "StoreFileSubmitted",
	node_registered: "NodeRegistered",
	round_end: "RoundEnd",
};

const LIQUIDATION_TERMS: Terminology = Terminology {
	section: "fileStorage",
	store_files: "fileStorage.storeFiles",
	file_orders: "fileStorage.files",
	registers: "fileStorage.registers",
	stashs: "fileStorage.stashs",
	nodes: "fileStorage.nodes",
	rounds_reward: "fileStorage.sessionsReward",
	rounds_summary: "fileStorage.sessionsSummary",
	node_reported: "NodeReported",
	file_removed: "FileDeleted",
	file_new_order: "FileStored",
	file_funded: "FileAdded",
	node_registered: "NodeRegistered",
	round_end: "NewSession",
};

/// Runtime revision of the storage pallet being indexed.
///
/// `V1` speaks of file orders and rounds, `V2` of liquidations and sessions. Both
/// describe the same lifecycle, so everything past decoding is revision agnostic.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Encode, Decode, TypeInfo, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
	#[default]
	V1,
	V2,
}

impl ProtocolRevision {
	pub fn terminology(&self) -> &'static Terminology {
		match self {
			ProtocolRevision::V1 => &FILE_ORDER_TERMS,
			ProtocolRevision::V2 => &LIQUIDATION_TERMS,
		}
	}

	pub fn decode_node_reported(&self, mut data: &[u8]) -> Result<NodeReported, codec::Error> {
		match self {
			ProtocolRevision::V1 => NodeReported::decode(&mut data),
			ProtocolRevision::V2 => {
				// sessions pay a single store reward, accounted as direct
				let (reporter, machine_id, round, slash, mine_reward, store_reward) =
					<(AccountId32, MachineId, RoundIndex, Balance, Balance, Balance)>::decode(&mut data)?;
				Ok(NodeReported {
					reporter,
					machine_id,
					round,
					slash,
					mine_reward,
					share_store_reward: 0,
					direct_store_reward: store_reward,
				})
			},
		}
	}

	/// File removal and new-order events lead with the file id; trailing fields are ignored.
	pub fn decode_file_id(&self, mut data: &[u8]) -> Result<RawFileId, codec::Error> {
		RawFileId::decode(&mut data)
	}

	pub fn decode_file_funded(&self, mut data: &[u8]) -> Result<FileFunded, codec::Error> {
		FileFunded::decode(&mut data)
	}

	pub fn decode_node_registered(&self, mut data: &[u8]) -> Result<NodeRegistered, codec::Error> {
		NodeRegistered::decode(&mut data)
	}

	pub fn decode_round_end(&self, mut data: &[u8]) -> Result<RoundEnded, codec::Error> {
		RoundEnded::decode(&mut data)
	}
}
