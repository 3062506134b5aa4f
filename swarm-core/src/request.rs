//! Benchmark request domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{CoreError, Result};

/// Identifier of a benchmark, shared by its request and its run
/// (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// Get the inner numeric id
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Subscription topic that progress and results for this run are published on
    pub fn topic(&self) -> String {
        format!("benchmark.{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        RunId(id)
    }
}

/// A client's request to benchmark a site. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub id: RunId,
    /// Domain or URL of the site under test
    pub domain: String,
    /// Number of worker nodes (slots) the run needs
    pub num_nodes: usize,
    /// Number of requests each node issues
    pub requests_per_node: u64,
    pub created_at: DateTime<Utc>,
}

impl BenchmarkRequest {
    /// Create a request stamped with the current time
    pub fn new(
        id: impl Into<RunId>,
        domain: impl Into<String>,
        num_nodes: usize,
        requests_per_node: u64,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            num_nodes,
            requests_per_node,
            created_at: Utc::now(),
        }
    }

    /// URL the nodes load-test. Bare domains are given an `http` scheme.
    pub fn target_url(&self) -> Result<Url> {
        let domain = self.domain.trim();
        if domain.contains("://") {
            Ok(Url::parse(domain)?)
        } else {
            Ok(Url::parse(&format!("http://{}", domain))?)
        }
    }

    /// Check the request can ever run against a ledger of `max_slots` slots
    pub fn validate(&self, max_slots: usize) -> Result<()> {
        let invalid = |reason: String| CoreError::InvalidRequest {
            id: self.id.get(),
            reason,
        };

        if self.domain.trim().is_empty() {
            return Err(invalid("domain cannot be empty".to_string()));
        }
        if self.num_nodes == 0 {
            return Err(invalid("num_servers must be greater than 0".to_string()));
        }
        if self.requests_per_node == 0 {
            return Err(invalid("num_requests must be greater than 0".to_string()));
        }
        if self.num_nodes > max_slots {
            return Err(invalid(format!(
                "num_servers {} exceeds total capacity of {} slots",
                self.num_nodes, max_slots
            )));
        }

        self.target_url()?;
        Ok(())
    }
}
