//! Per-run configuration
//!
//! A `RunConfig` is built once by the binary from already-parsed CLI/env
//! inputs and handed to the orchestrator. Construction validates the inputs
//! that every run needs; everything else has a default.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::error::{BackupError, Result};

/// Default upstream API endpoint for the projects resource tree.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.honeybadger.io/v2/projects";

/// Object key (relative to the prefix) of the persisted watermark ledger.
const LEDGER_OBJECT_NAME: &str = "faultstash-run-data.txt";

/// Wire format of the `--last-run` override: `YYYYMMDDHHMMSS`, read as UTC.
const LAST_RUN_FORMAT: &str = "%Y%m%d%H%M%S";

/// Validated configuration for one backup run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Destination bucket.
    pub bucket: String,
    /// Key prefix inside the bucket; may be empty.
    pub prefix: String,
    /// Upstream API auth token.
    pub api_key: String,
    /// Base URL of the projects resource.
    pub endpoint: String,
    /// Lowercased project names to back up. Empty means include all.
    pub include_projects: HashSet<String>,
    /// Watermark override applied to every project, as epoch seconds.
    pub override_timestamp: Option<i64>,
    /// Maximum notices fetched per fault.
    pub notice_limit: usize,
}

impl RunConfig {
    /// Creates a configuration with the two required inputs. Fails if either
    /// is empty.
    pub fn new(bucket: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let api_key = api_key.into();
        if bucket.trim().is_empty() {
            return Err(BackupError::Config("bucket must not be empty".into()));
        }
        if api_key.trim().is_empty() {
            return Err(BackupError::Config("api key must not be empty".into()));
        }
        Ok(Self {
            bucket,
            prefix: String::new(),
            api_key,
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
            include_projects: HashSet::new(),
            override_timestamp: None,
            notice_limit: usize::MAX,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Parses a comma-separated project include list. Names are trimmed and
    /// lowercased; blank entries are dropped. An empty list means every
    /// project is backed up.
    pub fn with_include_list(mut self, projects: &str) -> Self {
        self.include_projects = parse_include_list(projects);
        self
    }

    pub fn with_include_set(mut self, projects: HashSet<String>) -> Self {
        self.include_projects = projects;
        self
    }

    /// Sets the watermark override from its `YYYYMMDDHHMMSS` wire form.
    pub fn with_last_run(mut self, last_run: &str) -> Result<Self> {
        let parsed = NaiveDateTime::parse_from_str(last_run.trim(), LAST_RUN_FORMAT)
            .map_err(|err| {
                BackupError::Config(format!(
                    "invalid last-run value {last_run:?} (expected YYYYMMDDHHMMSS): {err}"
                ))
            })?;
        self.override_timestamp = Some(parsed.and_utc().timestamp());
        Ok(self)
    }

    pub fn with_override_timestamp(mut self, epoch: i64) -> Self {
        self.override_timestamp = Some(epoch);
        self
    }

    pub fn with_notice_limit(mut self, limit: usize) -> Self {
        self.notice_limit = limit;
        self
    }

    /// Full key of the watermark ledger object. No leading slash when the
    /// prefix is empty.
    pub fn ledger_key(&self) -> String {
        if self.prefix.is_empty() {
            LEDGER_OBJECT_NAME.to_string()
        } else {
            format!("{}/{}", self.prefix, LEDGER_OBJECT_NAME)
        }
    }
}

fn parse_include_list(projects: &str) -> HashSet<String> {
    projects
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
