//! Fixed-width concurrent dispatch of per-file work.

use futures::future::join_all;
use std::future::Future;

/// Run `write` over `items` in groups of `batch_size`.
///
/// Writes inside a group run concurrently; a group starts only after the
/// previous one has completed. Results come back in input order.
pub async fn dispatch_batched<T, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    mut write: F,
) -> Vec<Fut::Output>
where
    F: FnMut(T) -> Fut,
    Fut: Future,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let group: Vec<Fut> = items.by_ref().take(batch_size).map(&mut write).collect();
        results.extend(join_all(group).await);
    }
    results
}
