//! Read-only access to authoritative chain storage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use codec::{Decode, Encode};
use hippius_storage_primitives::{FileOrderInfo, RawFileId, StoreFileInfo, Terminology};

use crate::error::{Error, Result};
use crate::identity::FileId;

/// A storage item under `path`, addressed by its SCALE-encoded map key.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct StorageKey {
	pub path: &'static str,
	pub key: Vec<u8>,
}

impl StorageKey {
	pub fn new(path: &'static str, key: impl Encode) -> Self {
		Self { path, key: key.encode() }
	}
}

#[async_trait]
pub trait ChainQuery: Send + Sync {
	async fn query_one(&self, key: &StorageKey) -> Result<Option<Vec<u8>>>;

	/// Answers every key in one round trip, in input order.
	async fn query_many(&self, keys: &[StorageKey]) -> Result<Vec<Option<Vec<u8>>>>;
}

pub fn decode_value<T: Decode>(key: &StorageKey, raw: Option<Vec<u8>>) -> Result<Option<T>> {
	raw.map(|bytes| {
		T::decode(&mut &bytes[..]).map_err(|e| Error::decode(format!("{} 0x{}", key.path, hex::encode(&key.key)), e))
	})
	.transpose()
}

pub async fn query_typed<T: Decode, C: ChainQuery + ?Sized>(chain: &C, key: StorageKey) -> Result<Option<T>> {
	let raw = chain.query_one(&key).await?;
	decode_value(&key, raw)
}

/// Runs `keys` as one batch and checks the facade answered each of them.
pub async fn query_batch<C: ChainQuery + ?Sized>(
	chain: &C,
	keys: &[StorageKey],
) -> Result<Vec<Option<Vec<u8>>>> {
	if keys.is_empty() {
		return Ok(Vec::new());
	}
	let values = chain.query_many(keys).await?;
	if values.len() != keys.len() {
		return Err(Error::ChainQuery(format!(
			"batch of {} keys answered with {} values",
			keys.len(),
			values.len()
		)));
	}
	Ok(values)
}

/// Authoritative snapshot of one file.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FileState {
	pub raw: RawFileId,
	pub order: Option<FileOrderInfo>,
	pub file: Option<StoreFileInfo>,
}

impl FileState {
	pub fn is_held_by(&self, account: &sp_core::crypto::AccountId32) -> bool {
		self.order.as_ref().map_or(false, |order| order.replicas.contains(account))
	}
}

/// Fetches order and stored-file records of every id in one `query_many`.
pub async fn fetch_file_states<C: ChainQuery + ?Sized>(
	chain: &C,
	terms: &Terminology,
	ids: &BTreeMap<FileId, RawFileId>,
) -> Result<BTreeMap<FileId, FileState>> {
	let keys: Vec<StorageKey> = ids
		.values()
		.flat_map(|raw| {
			[StorageKey::new(terms.file_orders, raw), StorageKey::new(terms.store_files, raw)]
		})
		.collect();
	let values = query_batch(chain, &keys).await?;

	let mut states = BTreeMap::new();
	let mut answers = keys.iter().zip(values);
	for (file_id, raw) in ids {
		let (order_key, order) = answers.next().ok_or_else(|| Error::ChainQuery("short batch".into()))?;
		let (file_key, file) = answers.next().ok_or_else(|| Error::ChainQuery("short batch".into()))?;
		states.insert(
			file_id.clone(),
			FileState {
				raw: raw.clone(),
				order: decode_value(order_key, order)?,
				file: decode_value(file_key, file)?,
			},
		);
	}
	Ok(states)
}
