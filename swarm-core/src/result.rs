//! Per-node and aggregated benchmark results

use serde::{Deserialize, Serialize};

/// Result reported by a single node's load-test agent. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    #[serde(alias = "complete_requests")]
    pub completed_requests: u64,
    pub failed_requests: u64,
    #[serde(default)]
    pub system_error_requests: u64,
}

/// Blended result of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub min_time: f64,
    pub max_time: f64,
    /// Unweighted mean of the per-node means
    pub mean_time: f64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub system_error_requests: u64,
    /// Number of nodes that reported a result
    pub reporting_nodes: usize,
}

impl AggregateResult {
    /// Blend per-node results into one.
    ///
    /// `unreachable_requests` is the requested request count of every node that
    /// produced no result; it is added to `failed_requests`. Returns `None` when
    /// no node reported.
    pub fn aggregate(results: &[NodeResult], unreachable_requests: u64) -> Option<Self> {
        if results.is_empty() {
            return None;
        }

        let min_time = results.iter().map(|r| r.min).fold(f64::INFINITY, f64::min);
        let max_time = results
            .iter()
            .map(|r| r.max)
            .fold(f64::NEG_INFINITY, f64::max);
        let mean_time = results.iter().map(|r| r.mean).sum::<f64>() / results.len() as f64;

        Some(Self {
            min_time,
            max_time,
            mean_time,
            completed_requests: saturating_sum(results.iter().map(|r| r.completed_requests)),
            failed_requests: saturating_sum(results.iter().map(|r| r.failed_requests))
                .saturating_add(unreachable_requests),
            system_error_requests: saturating_sum(results.iter().map(|r| r.system_error_requests)),
            reporting_nodes: results.len(),
        })
    }
}

/// Sum that pins at `u64::MAX` instead of overflowing
fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(min: f64, max: f64, mean: f64, completed: u64, failed: u64) -> NodeResult {
        NodeResult {
            min,
            max,
            mean,
            completed_requests: completed,
            failed_requests: failed,
            system_error_requests: 0,
        }
    }

    #[test]
    fn test_aggregation_arithmetic() {
        let results = vec![node(10.0, 50.0, 20.0, 8, 2), node(5.0, 60.0, 30.0, 9, 1)];

        let aggregate = AggregateResult::aggregate(&results, 0).unwrap();
        assert_eq!(aggregate.min_time, 5.0);
        assert_eq!(aggregate.max_time, 60.0);
        assert_eq!(aggregate.mean_time, 25.0);
        assert_eq!(aggregate.completed_requests, 17);
        assert_eq!(aggregate.failed_requests, 3);
        assert_eq!(aggregate.reporting_nodes, 2);
    }

    #[test]
    fn test_mean_is_not_request_weighted() {
        let results = vec![node(1.0, 1.0, 10.0, 1, 0), node(1.0, 1.0, 40.0, 99, 0)];
        let aggregate = AggregateResult::aggregate(&results, 0).unwrap();
        assert_eq!(aggregate.mean_time, 25.0);
    }

    #[test]
    fn test_unreachable_requests_count_as_failed() {
        let results = vec![node(10.0, 50.0, 20.0, 8, 2)];
        let aggregate = AggregateResult::aggregate(&results, 10).unwrap();
        assert_eq!(aggregate.failed_requests, 12);
    }

    #[test]
    fn test_counters_saturate() {
        let results = vec![node(1.0, 1.0, 1.0, u64::MAX, 1), node(1.0, 1.0, 1.0, 1, 0)];
        let aggregate = AggregateResult::aggregate(&results, u64::MAX).unwrap();
        assert_eq!(aggregate.completed_requests, u64::MAX);
        assert_eq!(aggregate.failed_requests, u64::MAX);
    }

    #[test]
    fn test_no_results() {
        assert!(AggregateResult::aggregate(&[], 20).is_none());
    }

    #[test]
    fn test_node_result_accepts_agent_field_names() {
        let json = r#"{"min": 3.5, "max": 90.0, "mean": 12.25, "complete_requests": 99, "failed_requests": 1}"#;
        let result: NodeResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.completed_requests, 99);
        assert_eq!(result.system_error_requests, 0);
    }
}
