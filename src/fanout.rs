//! Concurrent fan-out with partial-failure tolerance.
//!
//! Every multi-way I/O fan-out in the engine (per-query searches, per-topic
//! track builds) goes through [`join_settled`]: all futures run to
//! completion regardless of sibling failures, and each outcome is returned
//! tagged with its input index. [`keep_successes`] then logs and discards
//! the failures. A failed branch never cancels or fails the batch.

use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;
use tracing::warn;

/// Run all futures concurrently and collect `(index, Result)` pairs.
///
/// `join_all` drives every future to completion — an error in one branch
/// does not cancel the others. Completion order is not observable; results
/// come back in input order.
pub async fn join_settled<T, E, Fut>(futures: Vec<Fut>) -> Vec<(usize, Result<T, E>)>
where
    Fut: Future<Output = Result<T, E>>,
{
    join_all(futures).await.into_iter().enumerate().collect()
}

/// Drop failed branches, logging each one under `label`.
pub fn keep_successes<T, E: Display>(
    label: &str,
    settled: Vec<(usize, Result<T, E>)>,
) -> Vec<(usize, T)> {
    settled
        .into_iter()
        .filter_map(|(index, result)| match result {
            Ok(value) => Some((index, value)),
            Err(e) => {
                warn!(label, index, error = %e, "Fan-out branch failed, continuing without it");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok_after(value: u32) -> Result<u32, String> {
        tokio::task::yield_now().await;
        Ok(value)
    }

    async fn fail(reason: &str) -> Result<u32, String> {
        Err(reason.to_string())
    }

    #[tokio::test]
    async fn settled_preserves_input_order() {
        let settled = join_settled(vec![ok_after(10), ok_after(20), ok_after(30)]).await;
        let values: Vec<u32> = settled.into_iter().map(|(_, r)| r.unwrap()).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn one_failure_does_not_poison_siblings() {
        let settled = join_settled(vec![
            Box::pin(ok_after(1)) as std::pin::Pin<Box<dyn Future<Output = _>>>,
            Box::pin(fail("boom")),
            Box::pin(ok_after(3)),
        ])
        .await;
        let survivors = keep_successes("test", settled);
        assert_eq!(survivors, vec![(0, 1), (2, 3)]);
    }

    #[tokio::test]
    async fn all_failures_yield_empty_set() {
        let settled = join_settled(vec![fail("a"), fail("b")]).await;
        assert!(keep_successes("test", settled).is_empty());
    }
}
