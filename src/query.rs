use std::future::Future;

use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;
use crate::fetch::{FetchHandle, FetchOutcome, FetchRegistry, QueryClass};

/// Lifecycle of a selection-scoped query. Every non-idle state carries the
/// tag (selection tuple) it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<K, T> {
    Idle,
    Loading { tag: K },
    Ready { tag: K, data: T },
    Failed { tag: K, message: String },
}

/// A settled request on its way back to the query that issued it.
#[derive(Debug)]
pub struct Settlement<K, T> {
    pub class: QueryClass,
    pub request_id: u64,
    pub tag: K,
    pub outcome: FetchOutcome<T>,
}

/// What [`ScopedQuery::apply`] did with a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Stale,
    Aborted,
}

/// Display status of a query, distinguishing "no data" from loading and error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ViewStatus {
    Idle,
    Loading,
    Empty,
    Ready(usize),
    Failed(String),
}

/// Anything a query can hold, reporting how many records it shows.
pub trait QueryData {
    fn record_count(&self) -> usize;
}

impl<T> QueryData for Vec<T> {
    fn record_count(&self) -> usize {
        self.len()
    }
}

impl<T> QueryData for Option<T> {
    fn record_count(&self) -> usize {
        usize::from(self.is_some())
    }
}

/// A fetch bound to a selection tag.
///
/// Re-targeting with a new tag cancels the previous request before issuing
/// the next one. A settlement is applied only when both its tag and its
/// request id match the current ones; anything else is dropped silently.
pub struct ScopedQuery<K, T> {
    class: QueryClass,
    state: QueryState<K, T>,
    current_request: Option<u64>,
}

impl<K, T> ScopedQuery<K, T>
where
    K: Clone + PartialEq + Send + 'static,
    T: Send + 'static,
{
    pub fn new(class: QueryClass) -> Self {
        Self {
            class,
            state: QueryState::Idle,
            current_request: None,
        }
    }

    pub fn class(&self) -> QueryClass {
        self.class
    }

    pub fn state(&self) -> &QueryState<K, T> {
        &self.state
    }

    pub fn tag(&self) -> Option<&K> {
        match &self.state {
            QueryState::Idle => None,
            QueryState::Loading { tag }
            | QueryState::Ready { tag, .. }
            | QueryState::Failed { tag, .. } => Some(tag),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Ready { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            QueryState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, QueryState::Loading { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, QueryState::Idle)
    }

    /// Moves the query to `tag`.
    ///
    /// `None` cancels any in-flight request and returns to `Idle`. A tag equal
    /// to the current one leaves everything untouched. Any other tag cancels
    /// the previous request, issues `fetch` and enters `Loading`.
    pub fn sync<F, Fut>(
        &mut self,
        registry: &mut FetchRegistry,
        tag: Option<K>,
        fetch: F,
    ) -> Option<FetchHandle<T>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        match tag {
            None => {
                self.reset(registry);
                None
            }
            Some(tag) if self.tag() == Some(&tag) => None,
            Some(tag) => Some(self.issue(registry, tag, fetch)),
        }
    }

    /// Re-issues the request for the current tag. No-op while idle.
    pub fn refresh<F, Fut>(&mut self, registry: &mut FetchRegistry, fetch: F) -> Option<FetchHandle<T>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let tag = self.tag().cloned()?;
        Some(self.issue(registry, tag, fetch))
    }

    /// Cancels the in-flight request and clears displayed data.
    pub fn reset(&mut self, registry: &mut FetchRegistry) {
        if self.current_request.take().is_some() {
            registry.cancel(self.class);
        }
        self.state = QueryState::Idle;
    }

    fn issue<F, Fut>(&mut self, registry: &mut FetchRegistry, tag: K, fetch: F) -> FetchHandle<T>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // issue() cancels the previous request of this class before spawning.
        let handle = registry.issue(self.class, fetch(&tag));
        self.current_request = Some(handle.request_id());
        self.state = QueryState::Loading { tag };
        handle
    }

    /// Applies a settlement if it still belongs to the current selection.
    pub fn apply(&mut self, registry: &mut FetchRegistry, settlement: Settlement<K, T>) -> Applied {
        let Settlement {
            class,
            request_id,
            tag,
            outcome,
        } = settlement;

        registry.settle(class, request_id);

        let result = match outcome {
            FetchOutcome::Completed(data) => Ok(data),
            FetchOutcome::Failed(e) => Err(e),
            FetchOutcome::Aborted => {
                debug!("Ignoring aborted {class} request #{request_id}");
                return Applied::Aborted;
            }
        };

        let current = match &self.state {
            QueryState::Loading { tag: current } => Some(current),
            _ => None,
        };
        if self.current_request != Some(request_id) || current != Some(&tag) {
            debug!("Discarding stale {class} response #{request_id}");
            return Applied::Stale;
        }

        self.current_request = None;
        self.state = match result {
            Ok(data) => QueryState::Ready { tag, data },
            Err(e) => {
                warn!("{class} query failed: {e}");
                QueryState::Failed {
                    tag,
                    message: e.to_string(),
                }
            }
        };
        Applied::Updated
    }
}

impl<K, T> ScopedQuery<K, T>
where
    K: Clone + PartialEq + Send + 'static,
    T: QueryData + Send + 'static,
{
    pub fn view(&self) -> ViewStatus {
        match &self.state {
            QueryState::Idle => ViewStatus::Idle,
            QueryState::Loading { .. } => ViewStatus::Loading,
            QueryState::Failed { message, .. } => ViewStatus::Failed(message.clone()),
            QueryState::Ready { data, .. } => match data.record_count() {
                0 => ViewStatus::Empty,
                n => ViewStatus::Ready(n),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployLensError;
    use tokio::sync::oneshot;

    type Tag = (String, String);

    fn tag(project: &str, release: &str) -> Tag {
        (project.to_string(), release.to_string())
    }

    async fn settle(handle: FetchHandle<Vec<u32>>, tag: Tag) -> Settlement<Tag, Vec<u32>> {
        let class = handle.class();
        let request_id = handle.request_id();
        Settlement {
            class,
            request_id,
            tag,
            outcome: handle.outcome().await,
        }
    }

    fn ready(values: Vec<u32>) -> impl FnOnce(&Tag) -> futures::future::Ready<Result<Vec<u32>>> {
        move |_: &Tag| futures::future::ready(Ok(values))
    }

    #[test]
    fn test_new_query_is_idle() {
        let query: ScopedQuery<Tag, Vec<u32>> = ScopedQuery::new(QueryClass::WorkItems);
        assert!(query.is_idle());
        assert_eq!(query.view(), ViewStatus::Idle);
    }

    #[tokio::test]
    async fn test_sync_without_tag_issues_nothing() {
        let mut registry = FetchRegistry::new();
        let mut query: ScopedQuery<Tag, Vec<u32>> = ScopedQuery::new(QueryClass::WorkItems);

        let handle = query.sync(&mut registry, None, ready(vec![1]));

        assert!(handle.is_none());
        assert!(query.is_idle());
        assert_eq!(registry.in_flight(QueryClass::WorkItems), None);
    }

    #[tokio::test]
    async fn test_loading_then_ready() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), ready(vec![1, 2]))
            .unwrap();
        assert_eq!(query.view(), ViewStatus::Loading);

        let applied = query.apply(&mut registry, settle(handle, tag("Alpha", "R1")).await);

        assert_eq!(applied, Applied::Updated);
        assert_eq!(query.data(), Some(&vec![1, 2]));
        assert_eq!(query.view(), ViewStatus::Ready(2));
        assert_eq!(registry.in_flight(QueryClass::WorkItems), None);
    }

    #[tokio::test]
    async fn test_same_tag_does_not_reissue() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::Releases);

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "")), ready(vec![1]))
            .unwrap();
        query.apply(&mut registry, settle(handle, tag("Alpha", "")).await);

        let again = query.sync(&mut registry, Some(tag("Alpha", "")), ready(vec![9]));
        assert!(again.is_none());
        assert_eq!(query.data(), Some(&vec![1]));
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);
        let (slow_tx, slow_rx) = oneshot::channel::<Vec<u32>>();

        let slow = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), move |_| async move {
                slow_rx
                    .await
                    .map_err(|_| DeployLensError::Config("gate dropped".into()))
            })
            .unwrap();
        let fast = query
            .sync(&mut registry, Some(tag("Alpha", "R2")), ready(vec![2]))
            .unwrap();

        let applied = query.apply(&mut registry, settle(fast, tag("Alpha", "R2")).await);
        assert_eq!(applied, Applied::Updated);

        // R1 arrives late; it was cancelled by the switch to R2.
        let _ = slow_tx.send(vec![1]);
        let applied = query.apply(&mut registry, settle(slow, tag("Alpha", "R1")).await);

        assert_eq!(applied, Applied::Aborted);
        assert_eq!(query.data(), Some(&vec![2]));
    }

    #[tokio::test]
    async fn test_completed_response_for_old_tag_is_stale() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);

        // Simulates a transport that delivered before cancellation took effect.
        let old = Settlement {
            class: QueryClass::WorkItems,
            request_id: 0,
            tag: tag("Alpha", "R1"),
            outcome: FetchOutcome::Completed(vec![1]),
        };
        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R2")), ready(vec![2]))
            .unwrap();

        assert_eq!(query.apply(&mut registry, old), Applied::Stale);
        assert!(query.is_loading());

        query.apply(&mut registry, settle(handle, tag("Alpha", "R2")).await);
        assert_eq!(query.data(), Some(&vec![2]));
    }

    #[tokio::test]
    async fn test_failure_clears_previous_data() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), ready(vec![1]))
            .unwrap();
        query.apply(&mut registry, settle(handle, tag("Alpha", "R1")).await);

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R2")), |_| async {
                Err::<Vec<u32>, _>(DeployLensError::Api {
                    status: 502,
                    message: "bad gateway".into(),
                })
            })
            .unwrap();
        query.apply(&mut registry, settle(handle, tag("Alpha", "R2")).await);

        assert!(query.data().is_none());
        assert!(query.error().unwrap().contains("502"));
        assert!(matches!(query.view(), ViewStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_empty_result_is_ready_not_error() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::Approvals);

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), ready(vec![]))
            .unwrap();
        query.apply(&mut registry, settle(handle, tag("Alpha", "R1")).await);

        assert_eq!(query.view(), ViewStatus::Empty);
    }

    #[tokio::test]
    async fn test_reset_cancels_and_goes_idle() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);
        let (_tx, rx) = oneshot::channel::<Vec<u32>>();

        let handle = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), move |_| async move {
                rx.await
                    .map_err(|_| DeployLensError::Config("gate dropped".into()))
            })
            .unwrap();

        query.sync(&mut registry, None, ready(vec![]));

        assert!(query.is_idle());
        assert_eq!(registry.in_flight(QueryClass::WorkItems), None);
        let late = settle(handle, tag("Alpha", "R1")).await;
        assert_eq!(query.apply(&mut registry, late), Applied::Aborted);
        assert!(query.is_idle());
    }

    #[tokio::test]
    async fn test_refresh_reissues_same_tag() {
        let mut registry = FetchRegistry::new();
        let mut query = ScopedQuery::new(QueryClass::WorkItems);

        let first = query
            .sync(&mut registry, Some(tag("Alpha", "R1")), ready(vec![1]))
            .unwrap();
        let refreshed = query.refresh(&mut registry, ready(vec![1, 1])).unwrap();

        assert_eq!(
            query.apply(&mut registry, settle(first, tag("Alpha", "R1")).await),
            Applied::Aborted
        );
        assert_eq!(
            query.apply(&mut registry, settle(refreshed, tag("Alpha", "R1")).await),
            Applied::Updated
        );
        assert_eq!(query.data(), Some(&vec![1, 1]));
    }
}
