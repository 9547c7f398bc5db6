//! Best-effort on-disk cache of the last full plan.
//!
//! Every read problem is a miss: the caller fetches a fresh plan instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::plan::Plan;

pub const CACHE_VERSION: u32 = 1;
pub const DEFAULT_MAX_AGE_MINUTES: i64 = 30;

/// Identifies which request produced a cached plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(limit: u32, ordering: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("v{CACHE_VERSION}|limit={limit}|order={ordering}").as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    version: u32,
    key: String,
    saved_at_ms: i64,
    plan: Plan,
}

#[derive(Debug, Clone)]
pub struct PlanCache {
    path: PathBuf,
    max_age: Duration,
}

impl PlanCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: Duration::minutes(DEFAULT_MAX_AGE_MINUTES),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, key: &CacheKey) -> Option<Plan> {
        self.load_at(key, Utc::now())
    }

    /// Cached plan for `key` if it was saved within the freshness window.
    pub fn load_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Plan> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) => {
                debug!("plan cache {} unreadable: {error}", self.path.display());
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(error) => {
                warn!("plan cache {} malformed: {error}", self.path.display());
                return None;
            }
        };
        if entry.version != CACHE_VERSION || entry.key != key.as_str() {
            debug!("plan cache key mismatch");
            return None;
        }
        let age_ms = now.timestamp_millis() - entry.saved_at_ms;
        if age_ms > self.max_age.num_milliseconds() {
            debug!("plan cache stale ({}s old)", age_ms / 1000);
            return None;
        }
        if entry.plan.validate().is_err() {
            warn!("plan cache {} holds an invalid plan", self.path.display());
            return None;
        }
        Some(entry.plan)
    }

    pub fn save(&self, key: &CacheKey, plan: &Plan) -> Result<bool> {
        self.save_at(key, plan, Utc::now())
    }

    /// Store `plan`; preview plans are never cached. Returns whether it was
    /// written.
    pub fn save_at(&self, key: &CacheKey, plan: &Plan, now: DateTime<Utc>) -> Result<bool> {
        if plan.is_preview {
            debug!("preview plan not cached");
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache directory {}", parent.display()))?;
        }
        let entry = CacheEntry {
            version: CACHE_VERSION,
            key: key.as_str().to_owned(),
            saved_at_ms: now.timestamp_millis(),
            plan: plan.clone(),
        };
        let json = serde_json::to_string(&entry).context("failed to serialize plan cache entry")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write plan cache {}", self.path.display()))?;
        Ok(true)
    }
}
