use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::error::PipelineError;

/// Runs `task` over `items` with at most `concurrency` in flight and returns
/// the successful results in input order.
///
/// Items that fail or exceed `item_timeout` are logged and dropped; they
/// never reorder or cancel their siblings.
pub async fn map_ordered<I, T, F, Fut>(
    label: &str,
    items: Vec<I>,
    concurrency: usize,
    item_timeout: Duration,
    task: F,
) -> Vec<T>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let total = items.len();
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

    let finished = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = task(index, item);
            async move { (index, tokio::time::timeout(item_timeout, fut).await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    for (index, outcome) in finished {
        match outcome {
            Ok(Ok(value)) => slots[index] = Some(value),
            Ok(Err(err)) => warn!(
                "{} item {}/{} failed ({}): {}",
                label,
                index + 1,
                total,
                err.kind(),
                err
            ),
            Err(_) => warn!(
                "{} item {}/{} timed out after {:?}",
                label,
                index + 1,
                total,
                item_timeout
            ),
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_item_is_dropped_and_order_kept() {
        let results = map_ordered("test", vec![30u64, 0, 5], 3, Duration::from_secs(5), |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if index == 1 {
                Err(PipelineError::Provider("boom".to_string()))
            } else {
                Ok(format!("item-{index}"))
            }
        })
        .await;
        assert_eq!(results, vec!["item-0".to_string(), "item-2".to_string()]);
    }

    #[tokio::test]
    async fn substituted_failure_keeps_all_items() {
        let results = map_ordered("test", vec!["a", "b", "c"], 2, Duration::from_secs(5), |index, name| async move {
            let attempt: Result<String, PipelineError> = if index == 1 {
                Err(PipelineError::Provider("boom".to_string()))
            } else {
                Ok(name.to_uppercase())
            };
            Ok(attempt.unwrap_or_else(|_| format!("{name}-fallback")))
        })
        .await;
        assert_eq!(results, vec!["A", "b-fallback", "C"]);
    }

    #[tokio::test]
    async fn slow_items_time_out() {
        let results = map_ordered("test", vec![0u64, 500], 2, Duration::from_millis(50), |_, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<u64, PipelineError>(delay)
        })
        .await;
        assert_eq!(results, vec![0]);
    }
}
