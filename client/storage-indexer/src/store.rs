//! Entity store facade.
//!
//! The indexer only needs keyed get/put/remove plus one secondary index lookup, so
//! stores speak SCALE-encoded [`Record`]s and the typed layer lives in
//! [`EntityStoreExt`]. [`StagedStore`] buffers every write of one report and
//! flushes them together; a failed report leaves the base store untouched.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use codec::{Decode, Encode};
use derive_more::Display;
use parking_lot::{Mutex, RwLock};

use crate::entities::{Order, Replica, ORDER_BY_FILE, REPLICA_BY_ORDER};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum EntityKind {
	Account,
	File,
	FileFund,
	Order,
	Replica,
	Node,
	Round,
	NodeReport,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IndexKey {
	pub name: &'static str,
	pub value: String,
}

impl IndexKey {
	pub fn new(name: &'static str, value: &str) -> Self {
		Self { name, value: value.to_string() }
	}
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Record {
	pub value: Vec<u8>,
	pub indexes: Vec<IndexKey>,
}

/// A staged mutation: `Some` writes the record, `None` removes it.
pub type Write = (EntityKind, String, Option<Record>);

pub trait Entity: Encode + Decode + Send + Sync + 'static {
	const KIND: EntityKind;

	fn id(&self) -> &str;

	fn index_keys(&self) -> Vec<IndexKey> {
		Vec::new()
	}
}

#[async_trait]
pub trait EntityStore: Send + Sync {
	async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Vec<u8>>>;

	async fn put(&self, kind: EntityKind, id: &str, record: Record) -> Result<()>;

	async fn remove(&self, kind: EntityKind, id: &str) -> Result<()>;

	/// Ids of `kind` rows whose `index` key equals `value`, in ascending id order.
	async fn lookup(&self, kind: EntityKind, index: &'static str, value: &str) -> Result<Vec<String>>;

	/// Applies a batch of writes. Stores with native transactions should override this
	/// so the batch lands atomically.
	async fn apply(&self, batch: Vec<Write>) -> Result<()> {
		for (kind, id, entry) in batch {
			match entry {
				Some(record) => self.put(kind, &id, record).await?,
				None => self.remove(kind, &id).await?,
			}
		}
		Ok(())
	}
}

#[async_trait]
pub trait EntityStoreExt: EntityStore {
	async fn load<E: Entity>(&self, id: &str) -> Result<Option<E>> {
		match self.get(E::KIND, id).await? {
			Some(raw) => E::decode(&mut &raw[..])
				.map(Some)
				.map_err(|e| Error::decode(format!("{} {id}", E::KIND), e)),
			None => Ok(None),
		}
	}

	async fn save<E: Entity>(&self, entity: &E) -> Result<()> {
		let record = Record { value: entity.encode(), indexes: entity.index_keys() };
		self.put(E::KIND, entity.id(), record).await
	}

	async fn delete<E: Entity>(&self, id: &str) -> Result<()> {
		self.remove(E::KIND, id).await
	}

	async fn load_indexed<E: Entity>(&self, index: &'static str, value: &str) -> Result<Vec<E>> {
		let ids = self.lookup(E::KIND, index, value).await?;
		let mut entities = Vec::with_capacity(ids.len());
		for id in ids {
			if let Some(entity) = self.load::<E>(&id).await? {
				entities.push(entity);
			}
		}
		Ok(entities)
	}

	/// Every replica ever recorded under an order (or liquidation), tombstoned ones included.
	async fn replicas_by_order(&self, order_id: &str) -> Result<Vec<Replica>> {
		self.load_indexed::<Replica>(REPLICA_BY_ORDER, order_id).await
	}

	async fn orders_by_file(&self, file_id: &str) -> Result<Vec<Order>> {
		self.load_indexed::<Order>(ORDER_BY_FILE, file_id).await
	}
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

#[derive(Default)]
struct MemoryInner {
	records: BTreeMap<(EntityKind, String), Record>,
	indexes: BTreeMap<(EntityKind, &'static str, String), BTreeSet<String>>,
}

impl MemoryInner {
	fn put(&mut self, kind: EntityKind, id: &str, record: Record) {
		self.unindex(kind, id);
		for key in &record.indexes {
			self.indexes
				.entry((kind, key.name, key.value.clone()))
				.or_default()
				.insert(id.to_string());
		}
		self.records.insert((kind, id.to_string()), record);
	}

	fn remove(&mut self, kind: EntityKind, id: &str) {
		self.unindex(kind, id);
		self.records.remove(&(kind, id.to_string()));
	}

	fn unindex(&mut self, kind: EntityKind, id: &str) {
		let Some(previous) = self.records.get(&(kind, id.to_string())) else { return };
		for key in &previous.indexes {
			let slot = (kind, key.name, key.value.clone());
			if let Some(ids) = self.indexes.get_mut(&slot) {
				ids.remove(id);
				if ids.is_empty() {
					self.indexes.remove(&slot);
				}
			}
		}
	}
}

/// In-process store with deterministic iteration order.
#[derive(Default)]
pub struct MemoryStore {
	inner: RwLock<MemoryInner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn count(&self, kind: EntityKind) -> usize {
		self.inner.read().records.keys().filter(|(k, _)| *k == kind).count()
	}

	/// Decodes every row of `E`, ordered by id.
	pub fn all<E: Entity>(&self) -> Result<Vec<E>> {
		let inner = self.inner.read();
		inner
			.records
			.iter()
			.filter(|((kind, _), _)| *kind == E::KIND)
			.map(|((_, id), record)| {
				E::decode(&mut &record.value[..]).map_err(|e| Error::decode(format!("{} {id}", E::KIND), e))
			})
			.collect()
	}
}

#[async_trait]
impl EntityStore for MemoryStore {
	async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.inner.read().records.get(&(kind, id.to_string())).map(|r| r.value.clone()))
	}

	async fn put(&self, kind: EntityKind, id: &str, record: Record) -> Result<()> {
		self.inner.write().put(kind, id, record);
		Ok(())
	}

	async fn remove(&self, kind: EntityKind, id: &str) -> Result<()> {
		self.inner.write().remove(kind, id);
		Ok(())
	}

	async fn lookup(&self, kind: EntityKind, index: &'static str, value: &str) -> Result<Vec<String>> {
		let inner = self.inner.read();
		Ok(inner
			.indexes
			.get(&(kind, index, value.to_string()))
			.map(|ids| ids.iter().cloned().collect())
			.unwrap_or_default())
	}

	async fn apply(&self, batch: Vec<Write>) -> Result<()> {
		let mut inner = self.inner.write();
		for (kind, id, entry) in batch {
			match entry {
				Some(record) => inner.put(kind, &id, record),
				None => inner.remove(kind, &id),
			}
		}
		Ok(())
	}
}

#[derive(Default)]
struct Overlay {
	writes: BTreeMap<(EntityKind, String), Option<Record>>,
	/// Index entries of staged records only.
	indexes: BTreeMap<(EntityKind, &'static str, String), BTreeSet<String>>,
}

impl Overlay {
	fn stage(&mut self, kind: EntityKind, id: &str, entry: Option<Record>) {
		if let Some(Some(previous)) = self.writes.get(&(kind, id.to_string())) {
			for key in &previous.indexes {
				let slot = (kind, key.name, key.value.clone());
				if let Some(ids) = self.indexes.get_mut(&slot) {
					ids.remove(id);
					if ids.is_empty() {
						self.indexes.remove(&slot);
					}
				}
			}
		}
		if let Some(record) = &entry {
			for key in &record.indexes {
				self.indexes
					.entry((kind, key.name, key.value.clone()))
					.or_default()
					.insert(id.to_string());
			}
		}
		self.writes.insert((kind, id.to_string()), entry);
	}
}

/// Copy-on-write overlay over another store.
///
/// Reads see staged writes first, so later phases of a report observe what earlier
/// phases wrote. Nothing reaches the base store until [`StagedStore::commit`];
/// dropping the overlay discards the batch.
pub struct StagedStore<'a, S: ?Sized> {
	base: &'a S,
	overlay: Mutex<Overlay>,
}

impl<'a, S: EntityStore + ?Sized> StagedStore<'a, S> {
	pub fn new(base: &'a S) -> Self {
		Self { base, overlay: Mutex::new(Overlay::default()) }
	}

	/// Number of distinct rows written or removed so far.
	pub fn write_count(&self) -> usize {
		self.overlay.lock().writes.len()
	}

	/// Flushes the staged batch to the base store in key order.
	pub async fn commit(self) -> Result<usize> {
		let writes = self.overlay.into_inner().writes;
		let count = writes.len();
		let batch = writes.into_iter().map(|((kind, id), entry)| (kind, id, entry)).collect();
		self.base.apply(batch).await?;
		Ok(count)
	}
}

#[async_trait]
impl<'a, S: EntityStore + ?Sized> EntityStore for StagedStore<'a, S> {
	async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Vec<u8>>> {
		let staged = self.overlay.lock().writes.get(&(kind, id.to_string())).cloned();
		match staged {
			Some(entry) => Ok(entry.map(|record| record.value)),
			None => self.base.get(kind, id).await,
		}
	}

	async fn put(&self, kind: EntityKind, id: &str, record: Record) -> Result<()> {
		self.overlay.lock().stage(kind, id, Some(record));
		Ok(())
	}

	async fn remove(&self, kind: EntityKind, id: &str) -> Result<()> {
		self.overlay.lock().stage(kind, id, None);
		Ok(())
	}

	async fn lookup(&self, kind: EntityKind, index: &'static str, value: &str) -> Result<Vec<String>> {
		let base = self.base.lookup(kind, index, value).await?;
		let overlay = self.overlay.lock();
		// a staged row answers from its staged index entries, not the base's
		let mut ids: BTreeSet<String> =
			base.into_iter().filter(|id| !overlay.writes.contains_key(&(kind, id.clone()))).collect();
		if let Some(staged) = overlay.indexes.get(&(kind, index, value.to_string())) {
			ids.extend(staged.iter().cloned());
		}
		Ok(ids.into_iter().collect())
	}
}
