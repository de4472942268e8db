use std::collections::BTreeMap;

use async_trait::async_trait;
use codec::Encode;
use hippius_storage_primitives::{
	Balance, BlockNumber, FileOrderInfo, NodeInfo, NodeReported, ProtocolRevision, RawEvent, RawFileId,
	RegisterInfo, ReportCall, RewardInfo, RoundIndex, StashInfo, StoreFileInfo, SummaryStats, Terminology,
};
use parking_lot::{Mutex, RwLock};
use sp_core::crypto::AccountId32;

use crate::chain::{ChainQuery, StorageKey};
use crate::config::IndexerConfig;
use crate::error::Result;
use crate::identity::{node_id_of, normalize_file_id, FileId, NodeId};
use crate::store::MemoryStore;
use crate::{BlockContext, Indexer};

pub type TestIndexer = Indexer<MockChain, MemoryStore>;

pub fn account(n: u8) -> AccountId32 {
	AccountId32::new([n; 32])
}

pub fn machine(n: u8) -> Vec<u8> {
	format!("m{n}").into_bytes()
}

pub fn node(n: u8) -> NodeId {
	node_id_of(&machine(n))
}

pub fn raw_file(name: &str) -> RawFileId {
	name.as_bytes().to_vec()
}

pub fn file_id(name: &str) -> FileId {
	normalize_file_id(name.as_bytes())
}

pub fn order_info(expire_at: BlockNumber, holders: &[u8]) -> FileOrderInfo {
	FileOrderInfo { fee: 50, file_size: 1024, expire_at, replicas: holders.iter().map(|n| account(*n)).collect() }
}

pub fn store_info(base_fee: Balance, added_at: BlockNumber) -> StoreFileInfo {
	StoreFileInfo { reserved: 10, base_fee, file_size: 1024, added_at }
}

pub fn ctx(block_number: BlockNumber) -> BlockContext {
	BlockContext { block_number, timestamp: block_number * 6_000, origin_id: format!("{block_number}-0") }
}

/// Fixture chain storage. Every `query_many` call is recorded.
pub struct MockChain {
	terms: &'static Terminology,
	values: RwLock<BTreeMap<StorageKey, Vec<u8>>>,
	batches: Mutex<Vec<Vec<StorageKey>>>,
}

impl MockChain {
	pub fn new(revision: ProtocolRevision) -> Self {
		Self { terms: revision.terminology(), values: Default::default(), batches: Default::default() }
	}

	fn set(&self, key: StorageKey, value: Option<impl Encode>) {
		let mut values = self.values.write();
		match value {
			Some(value) => values.insert(key, value.encode()),
			None => values.remove(&key),
		};
	}

	/// Registers storage node `n`, owned by `account(n)` and stashed by `account(100 + n)`.
	pub fn register_node(&self, n: u8) {
		self.set(StorageKey::new(self.terms.registers, machine(n)), Some(RegisterInfo { enclave: vec![n; 4] }));
		self.set(
			StorageKey::new(self.terms.stashs, account(n)),
			Some(StashInfo { stasher: account(100 + n), deposit: 1_000, machine_id: Some(machine(n)) }),
		);
		self.set_node_info(n, NodeInfo { rid: 0, used: 64, power: 128, reported_at: 1 });
	}

	pub fn set_node_info(&self, n: u8, info: NodeInfo) {
		self.set(StorageKey::new(self.terms.nodes, account(n)), Some(info));
	}

	pub fn set_stash(&self, n: u8, stash: Option<StashInfo>) {
		self.set(StorageKey::new(self.terms.stashs, account(n)), stash);
	}

	pub fn set_order(&self, raw: &RawFileId, order: Option<FileOrderInfo>) {
		self.set(StorageKey::new(self.terms.file_orders, raw), order);
	}

	pub fn set_store_file(&self, raw: &RawFileId, file: Option<StoreFileInfo>) {
		self.set(StorageKey::new(self.terms.store_files, raw), file);
	}

	pub fn set_file(&self, raw: &RawFileId, order: Option<FileOrderInfo>, file: Option<StoreFileInfo>) {
		self.set_order(raw, order);
		self.set_store_file(raw, file);
	}

	pub fn set_round(&self, index: RoundIndex, reward: Option<RewardInfo>, summary: Option<SummaryStats>) {
		self.set(StorageKey::new(self.terms.rounds_reward, index), reward);
		self.set(StorageKey::new(self.terms.rounds_summary, index), summary);
	}

	pub fn batches(&self) -> Vec<Vec<StorageKey>> {
		self.batches.lock().clone()
	}

	pub fn clear_batches(&self) {
		self.batches.lock().clear();
	}
}

#[async_trait]
impl ChainQuery for MockChain {
	async fn query_one(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
		Ok(self.values.read().get(key).cloned())
	}

	async fn query_many(&self, keys: &[StorageKey]) -> Result<Vec<Option<Vec<u8>>>> {
		self.batches.lock().push(keys.to_vec());
		let values = self.values.read();
		Ok(keys.iter().map(|key| values.get(key).cloned()).collect())
	}
}

pub fn new_test_ext() -> TestIndexer {
	new_test_ext_with(IndexerConfig::default())
}

pub fn new_test_ext_with(config: IndexerConfig) -> TestIndexer {
	let _ = sp_tracing::try_init_simple();
	let chain = MockChain::new(config.revision);
	Indexer::new(chain, MemoryStore::new(), config).unwrap()
}

/// Builds a successful `report` call by `account(reporter)` with its node-reported event.
pub struct ReportBuilder {
	revision: ProtocolRevision,
	reporter: u8,
	round: RoundIndex,
	call: ReportCall,
}

pub fn report(revision: ProtocolRevision, reporter: u8, block_number: BlockNumber) -> ReportBuilder {
	ReportBuilder {
		revision,
		reporter,
		round: 1,
		call: ReportCall {
			id: format!("{block_number}-{reporter}"),
			extrinsic_id: format!("{block_number}-{reporter}"),
			success: true,
			block_number,
			timestamp: block_number * 6_000,
			rid: 7,
			add_files: Vec::new(),
			del_files: Vec::new(),
			settle_files: Vec::new(),
			events: Vec::new(),
		},
	}
}

impl ReportBuilder {
	fn terms(&self) -> &'static Terminology {
		self.revision.terminology()
	}

	pub fn round(mut self, round: RoundIndex) -> Self {
		self.round = round;
		self
	}

	pub fn failed(mut self) -> Self {
		self.call.success = false;
		self
	}

	pub fn add(mut self, raw: &RawFileId) -> Self {
		self.call.add_files.push((raw.clone(), 1024));
		self
	}

	pub fn settle(mut self, raw: &RawFileId) -> Self {
		self.call.settle_files.push(raw.clone());
		self
	}

	pub fn del(mut self, raw: &RawFileId) -> Self {
		self.call.del_files.push(raw.clone());
		self
	}

	pub fn removed(self, raw: &RawFileId) -> Self {
		let method = self.terms().file_removed;
		self.file_event(method, raw)
	}

	pub fn new_order(self, raw: &RawFileId) -> Self {
		let method = self.terms().file_new_order;
		self.file_event(method, raw)
	}

	fn file_event(mut self, method: &str, raw: &RawFileId) -> Self {
		let data = (raw.clone(), account(self.reporter)).encode();
		self.push_event(method, data);
		self
	}

	fn push_event(&mut self, method: &str, data: Vec<u8>) {
		let id = format!("{}-{}", self.call.id, self.call.events.len());
		let section = self.terms().section.into();
		self.call.events.push(RawEvent { id, section, method: method.into(), data });
	}

	pub fn without_reported_event(self) -> ReportCall {
		self.call
	}

	pub fn build(mut self) -> ReportCall {
		let reporter = account(self.reporter);
		let data = match self.revision {
			ProtocolRevision::V1 => NodeReported {
				reporter,
				machine_id: machine(self.reporter),
				round: self.round,
				slash: 0,
				mine_reward: 3,
				share_store_reward: 4,
				direct_store_reward: 5,
			}
			.encode(),
			ProtocolRevision::V2 =>
				(reporter, machine(self.reporter), self.round, 0u128, 3u128, 9u128).encode(),
		};
		let method = self.terms().node_reported;
		self.push_event(method, data);
		self.call
	}
}

pub fn event(revision: ProtocolRevision, id: &str, method: &str, data: Vec<u8>) -> RawEvent {
	RawEvent { id: id.into(), section: revision.terminology().section.into(), method: method.into(), data }
}
