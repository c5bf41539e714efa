//! Weighted cluster selection.
//!
//! # Responsibilities
//! - Hold a route's weighted cluster list and its total weight
//! - Pick one cluster per request from a caller-supplied random value
//!
//! # Design Decisions
//! - Selection is a pure function of (entries, total, random value)
//! - Zero-weight entries are kept for reporting but never selected
//! - Totals are summed in u64 so large u32 weights cannot overflow

use thiserror::Error;

use crate::config::schema::WeightedClustersConfig;
use crate::routing::policy::MetadataMatchCriteria;

/// Errors building a weighted cluster list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeightError {
    #[error("weighted cluster list is empty")]
    Empty,

    #[error("weighted clusters have zero total weight")]
    ZeroTotalWeight,

    #[error("declared total weight {declared} does not match sum of weights {actual}")]
    TotalWeightMismatch { declared: u64, actual: u64 },
}

/// Errors selecting a cluster.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("total weight is zero")]
    ZeroTotalWeight,

    #[error("position {position} not covered by weights summing to {total_weight}")]
    PositionNotCovered { position: u64, total_weight: u64 },
}

/// One weighted upstream cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedClusterEntry {
    name: String,
    weight: u32,
    metadata_match: Option<MetadataMatchCriteria>,
}

impl WeightedClusterEntry {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            metadata_match: None,
        }
    }

    pub fn with_metadata_match(mut self, criteria: MetadataMatchCriteria) -> Self {
        self.metadata_match = (!criteria.is_empty()).then_some(criteria);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn metadata_match(&self) -> Option<&MetadataMatchCriteria> {
        self.metadata_match.as_ref()
    }
}

/// Pick the entry covering `random_value % total_weight`.
pub fn select_entry(
    entries: &[WeightedClusterEntry],
    total_weight: u64,
    random_value: u64,
) -> Result<&WeightedClusterEntry, SelectError> {
    if total_weight == 0 {
        return Err(SelectError::ZeroTotalWeight);
    }

    let position = random_value % total_weight;
    let mut cumulative = 0u64;
    for entry in entries {
        if entry.weight == 0 {
            continue;
        }
        cumulative += u64::from(entry.weight);
        if cumulative > position {
            return Ok(entry);
        }
    }

    Err(SelectError::PositionNotCovered {
        position,
        total_weight,
    })
}

/// Pick a cluster name; see [`select_entry`].
pub fn select_cluster(
    entries: &[WeightedClusterEntry],
    total_weight: u64,
    random_value: u64,
) -> Result<&str, SelectError> {
    select_entry(entries, total_weight, random_value).map(WeightedClusterEntry::name)
}

/// A validated weighted cluster list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedClusters {
    entries: Vec<WeightedClusterEntry>,
    total_weight: u64,
}

impl WeightedClusters {
    pub fn new(entries: Vec<WeightedClusterEntry>) -> Result<Self, WeightError> {
        Self::with_declared_total(entries, None)
    }

    /// Build the list, checking a configured total against the real sum.
    pub fn with_declared_total(
        entries: Vec<WeightedClusterEntry>,
        declared: Option<u64>,
    ) -> Result<Self, WeightError> {
        if entries.is_empty() {
            return Err(WeightError::Empty);
        }

        let total_weight: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
        if let Some(declared) = declared {
            if declared != total_weight {
                return Err(WeightError::TotalWeightMismatch {
                    declared,
                    actual: total_weight,
                });
            }
        }
        if total_weight == 0 {
            return Err(WeightError::ZeroTotalWeight);
        }

        Ok(Self {
            entries,
            total_weight,
        })
    }

    pub fn from_config(config: &WeightedClustersConfig) -> Result<Self, WeightError> {
        let entries = config
            .clusters
            .iter()
            .map(|c| {
                WeightedClusterEntry::new(c.name.clone(), c.weight)
                    .with_metadata_match(MetadataMatchCriteria::new(&c.metadata_match))
            })
            .collect();
        Self::with_declared_total(entries, config.total_weight)
    }

    pub fn entries(&self) -> &[WeightedClusterEntry] {
        &self.entries
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn select(&self, random_value: u64) -> Result<&WeightedClusterEntry, SelectError> {
        select_entry(&self.entries, self.total_weight, random_value)
    }
}
