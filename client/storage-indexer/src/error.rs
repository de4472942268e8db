use derive_more::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, PartialEq, Eq)]
pub enum Error {
	/// The chain query facade failed to answer.
	#[display("chain query failed: {_0}")]
	ChainQuery(String),
	/// The entity store rejected an operation.
	#[display("entity store failed: {_0}")]
	Store(String),
	/// A SCALE payload could not be decoded.
	#[display("failed to decode {what}: {reason}")]
	Decode { what: String, reason: String },
	/// A successful report call carried no node-reported event.
	#[display("report {report_id} has no node-reported event")]
	MissingReportEvent { report_id: String },
	/// A touched or newly ordered file has no authoritative state on chain.
	#[display("file {file_id} has no authoritative state on chain")]
	MissingFileState { file_id: String },
	/// Registration or stash record of a node is missing on chain.
	#[display("node {node_id} has no authoritative {record} record")]
	MissingNodeState { node_id: String, record: &'static str },
	/// A touched file has no current order in the indexed view.
	#[display("file {file_id} has no current order")]
	NoCurrentOrder { file_id: String },
	/// An order referenced by a file does not exist.
	#[display("order {order_id} referenced by file {file_id} does not exist")]
	MissingOrder { file_id: String, order_id: String },
	/// A replica holder account has no machine id.
	#[display("account {account} does not resolve to a storage node")]
	UnresolvedNode { account: String },
	/// The write-once node report of this call was already recorded.
	#[display("report {report_id} was already indexed")]
	DuplicateReport { report_id: String },
	#[display("invalid configuration: {_0}")]
	InvalidConfig(String),
}

impl std::error::Error for Error {}

impl Error {
	pub fn decode(what: impl Into<String>, err: codec::Error) -> Self {
		Error::Decode { what: what.into(), reason: err.to_string() }
	}

	/// Whether the indexed view and the chain diverged in a way a retry will not fix.
	pub fn is_consistency_fault(&self) -> bool {
		matches!(
			self,
			Error::MissingFileState { .. } |
				Error::MissingNodeState { .. } |
				Error::NoCurrentOrder { .. } |
				Error::MissingOrder { .. } |
				Error::UnresolvedNode { .. }
		)
	}
}

impl From<codec::Error> for Error {
	fn from(err: codec::Error) -> Self {
		Error::decode("payload", err)
	}
}
