//! Stable string keys for files, nodes, orders and replicas.

use cid::Cid;
use hippius_storage_primitives::BlockNumber;
use sp_core::crypto::{AccountId32, Ss58Codec};

pub type FileId = String;
pub type NodeId = String;

/// The CID spelled by `raw`, if it is UTF-8 text that parses as one.
pub fn cid_of(raw: &[u8]) -> Option<String> {
	let text = std::str::from_utf8(raw).ok()?;
	Cid::try_from(text).ok().map(|cid| cid.to_string())
}

/// Canonical key of a file: its CID text when it has one, `0x` hex of the bytes otherwise.
pub fn normalize_file_id(raw: &[u8]) -> FileId {
	cid_of(raw).unwrap_or_else(|| hex_of(raw))
}

pub fn node_id_of(machine_id: &[u8]) -> NodeId {
	hex_of(machine_id)
}

pub fn account_id_of(account: &AccountId32) -> String {
	account.to_ss58check()
}

pub fn order_id(file_id: &str, epoch: &str) -> String {
	format!("{file_id}-{epoch}")
}

pub fn replica_id(node_id: &str, file_id: &str, block: BlockNumber) -> String {
	format!("{}{file_id}-{block}", replica_node_prefix(node_id))
}

/// Node ids are hex and never contain `-`, so this prefix names exactly one node.
pub fn replica_node_prefix(node_id: &str) -> String {
	format!("{node_id}-")
}

/// `0x`-prefixed lowercase hex, the chain's textual form of opaque bytes.
pub fn hex_of(raw: &[u8]) -> String {
	format!("0x{}", hex::encode(raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	const CID_V0: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
	const CID_V1: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

	#[test]
	fn cid_text_is_kept_canonical() {
		assert_eq!(normalize_file_id(CID_V0.as_bytes()), CID_V0);
		assert_eq!(normalize_file_id(CID_V1.as_bytes()), CID_V1);
		assert_eq!(cid_of(CID_V1.as_bytes()).as_deref(), Some(CID_V1));
	}

	#[test]
	fn opaque_bytes_fall_back_to_hex() {
		assert_eq!(normalize_file_id(&[0xff, 0x00, 0x10]), "0xff0010");
		assert_eq!(normalize_file_id(b"not-a-cid"), "0x6e6f742d612d636964");
		assert_eq!(normalize_file_id(&[]), "0x");
		assert_eq!(cid_of(b"not-a-cid"), None);
	}

	#[test]
	fn replica_ids_embed_node_prefix() {
		let node = node_id_of(b"m1");
		let id = replica_id(&node, CID_V0, 42);
		assert!(id.starts_with(&replica_node_prefix(&node)));
		assert_eq!(id, format!("0x6d31-{CID_V0}-42"));
		assert!(!id.starts_with(&replica_node_prefix(&node_id_of(b"m"))));
	}
}
