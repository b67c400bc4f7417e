//! Concurrency stress helpers.
//!
//! These drive one workspace from several threads at once and report how
//! many distinct instances the identity caches handed out.

use crate::fixtures::{employee_row, TestWorkspace, EMPLOYEE_COLUMNS};
use relsync_core::{QuerySource, ReadOptions, TrackedRow};
use relsync_storage::MemoryCursor;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of threads.
    pub threads: usize,
    /// Operations per thread.
    pub operations: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            operations: 100,
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Operations performed across all threads.
    pub operations: usize,
    /// Operations that returned an error.
    pub failures: usize,
    /// Distinct instances observed for the contended key.
    pub distinct_instances: usize,
    /// Wall-clock duration.
    #[serde(with = "millis")]
    pub duration: Duration,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

fn distinct(rows: &[Arc<TrackedRow>]) -> usize {
    let mut seen: Vec<&Arc<TrackedRow>> = Vec::new();
    for row in rows {
        if !seen.iter().any(|s| Arc::ptr_eq(s, row)) {
            seen.push(row);
        }
    }
    seen.len()
}

fn run<F>(config: &StressConfig, op: F) -> StressReport
where
    F: Fn(usize) -> Option<Arc<TrackedRow>> + Sync,
{
    let barrier = Barrier::new(config.threads);
    let start = Instant::now();
    let results: Vec<Option<Arc<TrackedRow>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let (barrier, op) = (&barrier, &op);
                scope.spawn(move || {
                    barrier.wait();
                    (0..config.operations)
                        .map(|i| op(t * config.operations + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("stress thread panicked"))
            .collect()
    });
    let duration = start.elapsed();

    let rows: Vec<_> = results.iter().flatten().cloned().collect();
    StressReport {
        operations: results.len(),
        failures: results.len() - rows.len(),
        distinct_instances: distinct(&rows),
        duration,
    }
}

/// Deserializes a key-only employee document from every thread at once.
pub fn concurrent_key_only_reads(fx: &TestWorkspace, id: i64, config: &StressConfig) -> StressReport {
    let document = json!({ "id": id });
    run(config, |_| fx.reader().read("employee", &document).ok())
}

/// Materializes rows of one employee with rising stamps from every thread.
///
/// Operation `n` carries stamp `n + 1`, so the cached instance must end up
/// holding the values of the highest stamp.
pub fn concurrent_materialization(fx: &TestWorkspace, id: i64, config: &StressConfig) -> StressReport {
    run(config, |n| {
        let stamp = i64::try_from(n).unwrap_or(i64::MAX - 1) + 1;
        let mut cursor = MemoryCursor::new(
            &EMPLOYEE_COLUMNS,
            vec![employee_row(id, &format!("v{stamp}"), None, stamp)],
        );
        fx.read(&QuerySource::table("employee"), &mut cursor, ReadOptions::new())
            .ok()
            .and_then(|outcome| outcome.primary().into_iter().next())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes() {
        let report = StressReport {
            operations: 4,
            failures: 0,
            distinct_instances: 1,
            duration: Duration::from_millis(12),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration"], json!(12));
    }
}
