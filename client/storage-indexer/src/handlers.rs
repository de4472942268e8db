//! Standalone storage events outside of `report` calls.

use hippius_storage_primitives::{RawEvent, StoreFileInfo};

use crate::chain::{query_typed, ChainQuery, StorageKey};
use crate::entities::{File, FileFund, FileStatus, Node};
use crate::error::{Error, Result};
use crate::identity::normalize_file_id;
use crate::node::{ensure_account, sync_node};
use crate::round::{finalize_round_boundary, RoundBoundary};
use crate::store::{EntityStore, EntityStoreExt, StagedStore};
use crate::tracker::{sync_file, FileRole};
use crate::{BlockContext, Indexer, LOG_TARGET};

impl<C: ChainQuery, S: EntityStore> Indexer<C, S> {
	/// A file was created or topped up. Writes a [`FileFund`] row keyed by the event id.
	pub async fn on_file_funded(&self, event: &RawEvent, ctx: &BlockContext) -> Result<File> {
		let terms = self.terminology();
		let funded = self
			.config()
			.revision
			.decode_file_funded(&event.data)
			.map_err(|e| Error::decode(format!("{} event {}", terms.file_funded, event.id), e))?;
		let file_id = normalize_file_id(&funded.cid);
		let info: Option<StoreFileInfo> =
			query_typed(self.chain(), StorageKey::new(terms.store_files, &funded.cid)).await?;

		let staged = StagedStore::new(self.store());
		let was_invalid =
			staged.load::<File>(&file_id).await?.map_or(false, |file| file.status == FileStatus::Invalid);
		let mut file = sync_file(&staged, &file_id, &funded.cid, info.as_ref(), None, FileRole::Funded).await?;
		// funding a removed file puts it back in the queue
		if was_invalid && file.status != FileStatus::Waiting {
			file.status = FileStatus::Waiting;
			staged.save(&file).await?;
		}
		let funder = ensure_account(&staged, &funded.funder).await?;
		staged
			.save(&FileFund {
				id: event.id.clone(),
				funder_id: funder.id,
				file_id: file_id.clone(),
				fee: funded.fee,
				block_number: ctx.block_number,
				timestamp: ctx.timestamp,
			})
			.await?;
		staged.commit().await?;

		log::info!(target: LOG_TARGET, "file {} funded with {} at #{}", file_id, funded.fee, ctx.block_number);
		Ok(file)
	}

	pub async fn on_node_registered(&self, event: &RawEvent) -> Result<Node> {
		let terms = self.terminology();
		let registered = self
			.config()
			.revision
			.decode_node_registered(&event.data)
			.map_err(|e| Error::decode(format!("{} event {}", terms.node_registered, event.id), e))?;

		let staged = StagedStore::new(self.store());
		let node = sync_node(self.chain(), &staged, terms, &registered.owner, &registered.machine_id).await?;
		staged.commit().await?;

		log::info!(target: LOG_TARGET, "node {} registered", node.id);
		Ok(node)
	}

	pub async fn on_round_end(&self, event: &RawEvent, ctx: &BlockContext) -> Result<RoundBoundary> {
		let terms = self.terminology();
		let ended = self
			.config()
			.revision
			.decode_round_end(&event.data)
			.map_err(|e| Error::decode(format!("{} event {}", terms.round_end, event.id), e))?;

		let staged = StagedStore::new(self.store());
		let boundary =
			finalize_round_boundary(self.chain(), &staged, terms, ended.round, ended.unpaid, ctx.block_number)
				.await?;
		staged.commit().await?;
		Ok(boundary)
	}
}
