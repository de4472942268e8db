//! Indexer for the storage pallet.
//!
//! Turns node `report` calls and the storage pallet's standalone events into an
//! auditable history of files, orders, replicas, nodes and rounds. Chain state
//! is read through [`ChainQuery`] and history is written through [`EntityStore`],
//! both injected into [`Indexer`].

pub mod chain;
pub mod config;
pub mod differ;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod node;
pub mod report;
pub mod round;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod mock;

use hippius_storage_primitives::{BlockNumber, ReportCall, Terminology};

pub use chain::{ChainQuery, StorageKey};
pub use config::{IndexerConfig, RolloverPolicy};
pub use error::{Error, Result};
pub use report::{ReportOutcome, ReportSummary};
pub use store::{EntityStore, EntityStoreExt, MemoryStore, StagedStore};

pub const LOG_TARGET: &str = "storage-indexer";

/// Where the change being indexed happened.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BlockContext {
	pub block_number: BlockNumber,
	pub timestamp: u64,
	/// Id of the call or event being indexed. Opens order epochs.
	pub origin_id: String,
}

impl BlockContext {
	pub fn of_call(call: &ReportCall) -> Self {
		Self { block_number: call.block_number, timestamp: call.timestamp, origin_id: call.id.clone() }
	}
}

pub struct Indexer<C, S> {
	chain: C,
	store: S,
	config: IndexerConfig,
}

impl<C: ChainQuery, S: EntityStore> Indexer<C, S> {
	pub fn new(chain: C, store: S, config: IndexerConfig) -> Result<Self> {
		config.validate()?;
		log::info!(
			target: LOG_TARGET,
			"indexing storage pallet {:?} with {:?} rollover",
			config.revision,
			config.rollover
		);
		Ok(Self { chain, store, config })
	}

	pub fn chain(&self) -> &C {
		&self.chain
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn config(&self) -> &IndexerConfig {
		&self.config
	}

	pub fn terminology(&self) -> &'static Terminology {
		self.config.terminology()
	}
}
