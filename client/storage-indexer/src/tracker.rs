//! Mirrors authoritative file records into [`File`] rows.

use hippius_storage_primitives::{BlockNumber, FileOrderInfo, StoreFileInfo};

use crate::differ::tombstone_replica;
use crate::entities::{File, FileStatus, Order};
use crate::error::{Error, Result};
use crate::identity::cid_of;
use crate::store::{EntityStore, EntityStoreExt};
use crate::LOG_TARGET;

/// Why a file is being synced. Decides how a missing chain record is treated.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum FileRole {
	/// Removed in the same report; the chain record is expected to be gone.
	Removed,
	/// A new order was opened for the file.
	Ordered,
	/// Listed in a report's add or settle arguments.
	Touched,
	/// Created or funded by a standalone event.
	Funded,
}

pub async fn sync_file<S: EntityStore + ?Sized>(
	store: &S,
	file_id: &str,
	raw: &[u8],
	file_info: Option<&StoreFileInfo>,
	order_info: Option<&FileOrderInfo>,
	role: FileRole,
) -> Result<File> {
	let stored = store.load::<File>(file_id).await?;
	let mut file = stored.clone().unwrap_or_else(|| File::new(file_id.to_string()));
	if file.cid.is_none() {
		file.cid = cid_of(raw);
	}

	match file_info {
		Some(info) => {
			file.reserved = info.reserved;
			file.base_fee = info.base_fee;
			file.file_size = info.file_size;
			if file.added_at != Some(info.added_at) {
				if file.added_at.is_some() {
					// added again after a deletion
					file.add_index = file.add_index.saturating_add(1);
					file.renew_count = 0;
				}
				file.added_at = Some(info.added_at);
			}
			file.first_added_at.get_or_insert(info.added_at);
			file.status = if info.base_fee > 0 { FileStatus::Waiting } else { FileStatus::Storing };
		},
		None if role == FileRole::Removed => {},
		None => return Err(Error::MissingFileState { file_id: file_id.to_string() }),
	}

	if let Some(order) = order_info {
		file.fee = order.fee;
		file.expire_at = Some(order.expire_at);
	}

	if stored.as_ref() != Some(&file) {
		store.save(&file).await?;
	}
	Ok(file)
}

/// Closes `order` at `block`: tombstones its active replicas and empties its list.
pub async fn close_order<S: EntityStore + ?Sized>(
	store: &S,
	mut order: Order,
	block: BlockNumber,
) -> Result<Order> {
	order.deleted_at.get_or_insert(block);
	for replica in store.replicas_by_order(&order.id).await? {
		tombstone_replica(store, replica, block).await?;
	}
	order.current_replica_ids.clear();
	store.save(&order).await?;
	log::debug!(target: LOG_TARGET, "closed order {} at #{}", order.id, block);
	Ok(order)
}

/// Closes the file's current order, if any, and clears the pointer to it.
///
/// The caller persists `file`.
pub async fn close_current_order<S: EntityStore + ?Sized>(
	store: &S,
	file: &mut File,
	block: BlockNumber,
) -> Result<Option<Order>> {
	let Some(order_id) = file.current_order_id.take() else { return Ok(None) };
	let order = store
		.load::<Order>(&order_id)
		.await?
		.ok_or_else(|| Error::MissingOrder { file_id: file.id.clone(), order_id: order_id.clone() })?;
	close_order(store, order, block).await.map(Some)
}
