use hippius_storage_primitives::{ProtocolRevision, Terminology};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What happens to an order when the chain reports a new expiry for it.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloverPolicy {
	/// Close the order and open a fresh one for the new epoch.
	#[default]
	Supersede,
	/// Keep the order row, bump its renew counter and restart its replica list.
	Renew,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexerConfig {
	pub revision: ProtocolRevision,
	pub rollover: RolloverPolicy,
	/// Upper bound on files reconciled concurrently within one report.
	pub max_concurrent_files: usize,
}

impl Default for IndexerConfig {
	fn default() -> Self {
		Self {
			revision: ProtocolRevision::V1,
			rollover: RolloverPolicy::Supersede,
			max_concurrent_files: 64,
		}
	}
}

impl IndexerConfig {
	pub fn from_json(raw: &str) -> Result<Self> {
		let config: IndexerConfig =
			serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.max_concurrent_files == 0 {
			return Err(Error::InvalidConfig("maxConcurrentFiles must be at least 1".into()));
		}
		Ok(())
	}

	pub fn terminology(&self) -> &'static Terminology {
		self.revision.terminology()
	}
}
