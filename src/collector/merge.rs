use std::future::Future;

use futures_util::stream::{self, StreamExt, TryStreamExt};

/// Bounded concurrent map over an async source.
///
/// Maps every input through `op` with at most `limit` futures in
/// flight and collects the outputs in completion order.
///
/// The first error resolves the merge. Dropping the stream drops every
/// pending future, so calls that have not completed are abandoned and
/// their results never reach the caller.
///
/// `limit` of zero is treated as one; callers validate parallelism
/// before getting here.
pub async fn bounded_merge<I, F, Fut, T, E>(inputs: I, limit: usize, op: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(inputs)
        .map(op)
        .buffer_unordered(limit.max(1))
        .try_collect()
        .await
}
