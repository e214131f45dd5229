//! Read-through cache for line grouping results.
//!
//! Grouping is the expensive pass over a large export, so its output can be
//! persisted and reused when the same subjects are grouped with the same
//! parameters again.
//!
//! - Key: sorted subject ids + fingerprint of the observations + y/x
//!   tolerance + merge threshold
//! - `JsonFileCache` stores one JSON file per key, named by a v5 UUID of
//!   the serialized key. The key is stored alongside the groups and
//!   compared on load, so a name collision reads as a miss.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConsensusError, Result};
use crate::models::{LineGroup, RawLineObservation};
use crate::stages::{check_sorted, group_lines, GroupingResult, LineMatchConfig};

/// Identity of one grouping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    pub subjects: Vec<u64>,
    /// Name-based UUID over every observation's ids, coordinates and tokens
    pub fingerprint: Uuid,
    pub y_tolerance: f64,
    pub x_tolerance: Option<f64>,
    pub merge_mean_y_threshold: Option<f64>,
}

impl CacheKey {
    pub fn new(observations: &[RawLineObservation], config: &LineMatchConfig) -> Self {
        let mut subjects: Vec<u64> = observations.iter().map(|o| o.subject_id).collect();
        subjects.sort_unstable();
        subjects.dedup();
        Self {
            subjects,
            fingerprint: fingerprint(observations),
            y_tolerance: config.y_tolerance,
            x_tolerance: config.x_tolerance,
            merge_mean_y_threshold: config.merge_mean_y_threshold,
        }
    }

    /// Stable name derived from the key contents
    pub fn file_stem(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self).map_err(|e| ConsensusError::Cache(e.to_string()))?;
        Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes).to_string())
    }
}

fn fingerprint(observations: &[RawLineObservation]) -> Uuid {
    let mut bytes = Vec::new();
    for obs in observations {
        bytes.extend_from_slice(&obs.subject_id.to_le_bytes());
        bytes.extend_from_slice(&obs.transcription_id.to_le_bytes());
        for value in [obs.coords.x1, obs.coords.y1, obs.coords.x2, obs.coords.y2] {
            bytes.extend_from_slice(&value.to_bits().to_le_bytes());
        }
        for token in &obs.tokens {
            bytes.extend_from_slice(token.as_bytes());
            bytes.push(0);
        }
        bytes.push(0xff);
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes)
}

/// Storage for grouped observations
pub trait GroupingCache {
    /// Cached groups for `key`, or `None` on a miss
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<LineGroup>>>;

    fn store(&self, key: &CacheKey, groups: &[LineGroup]) -> Result<()>;
}

/// Cache that never hits and stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl GroupingCache for NoCache {
    fn load(&self, _key: &CacheKey) -> Result<Option<Vec<LineGroup>>> {
        Ok(None)
    }

    fn store(&self, _key: &CacheKey, _groups: &[LineGroup]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    groups: Vec<LineGroup>,
}

/// One JSON file per cache key in a directory
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    /// Open the cache directory, creating it if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            ConsensusError::Cache(format!("Failed to create cache directory {:?}: {}", dir, e))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn entry_path(&self, key: &CacheKey) -> Result<PathBuf> {
        Ok(self.dir.join(format!("groups-{}.json", key.file_stem()?)))
    }
}

impl GroupingCache for JsonFileCache {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<LineGroup>>> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            ConsensusError::Cache(format!("Failed to read cache entry {:?}: {}", path, e))
        })?;

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.key == *key => Ok(Some(entry.groups)),
            Ok(_) => {
                debug!("Cache entry {:?} belongs to another key", path);
                Ok(None)
            }
            Err(e) => {
                warn!("Ignoring corrupt cache entry {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    fn store(&self, key: &CacheKey, groups: &[LineGroup]) -> Result<()> {
        let path = self.entry_path(key)?;
        let entry = CacheEntry {
            key: key.clone(),
            groups: groups.to_vec(),
        };
        let content =
            serde_json::to_string(&entry).map_err(|e| ConsensusError::Cache(e.to_string()))?;
        fs::write(&path, content).map_err(|e| {
            ConsensusError::Cache(format!("Failed to write cache entry {:?}: {}", path, e))
        })
    }
}

/// Group lines through `cache`: reuse a stored result or compute and store it
pub fn group_lines_cached(
    cache: &dyn GroupingCache,
    observations: &[RawLineObservation],
    config: &LineMatchConfig,
) -> Result<GroupingResult> {
    check_sorted(observations)?;
    let key = CacheKey::new(observations, config);

    if let Some(groups) = cache.load(&key)? {
        info!(
            "Stage 0: reusing {} cached line groups for {} subjects",
            groups.len(),
            key.subjects.len()
        );
        return Ok(GroupingResult {
            observation_count: groups.iter().map(|g| g.members.len()).sum(),
            subject_count: key.subjects.len(),
            groups,
        });
    }

    let result = group_lines(observations, config)?;
    cache.store(&key, &result.groups)?;
    Ok(result)
}
