//! Scripted in-memory [`DashboardSource`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::{DashboardSource, Endpoint};
use crate::auth::Identity;
use crate::error::{DeployLensError, Result};
use crate::models::{
    Approval, DeployedEnvironments, DeploymentRecord, Pipeline, Release, ReleasePlanItem,
    TestPlanResult, WorkItem, YamlBuild,
};
use crate::normalize::normalize;

enum Scripted {
    Ready(Value),
    Fail(u16),
    Gated(oneshot::Receiver<Value>),
}

#[derive(Default)]
struct FakeState {
    responses: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<String>,
}

/// Answers calls by key, e.g. `"releases:Alpha"` or
/// `"pipeline-runs:Alpha:2024-01-01:2024-01-14:7"`. Unscripted calls succeed
/// with an empty value. Every call is recorded, in order.
///
/// Scripted answers are consumed in order, except that the last ready or
/// failing answer for a key keeps answering. Gated answers are used once.
/// Record lists go through the same response-shape normalization as the
/// HTTP client, so bodies may be bare arrays or wrapped objects.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: &str, scripted: Scripted) {
        self.state
            .lock()
            .unwrap()
            .responses
            .entry(call.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, call: &str, body: Value) -> &Self {
        self.push(call, Scripted::Ready(body));
        self
    }

    pub fn fail(&self, call: &str, status: u16) -> &Self {
        self.push(call, Scripted::Fail(status));
        self
    }

    /// The call blocks until the returned sender delivers its body.
    pub fn gate(&self, call: &str) -> oneshot::Sender<Value> {
        let (tx, rx) = oneshot::channel();
        self.push(call, Scripted::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls whose key starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn next_scripted(&self, call: &str) -> Option<Scripted> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        let queue = state.responses.get_mut(call)?;
        match queue.front()? {
            Scripted::Ready(body) if queue.len() == 1 => Some(Scripted::Ready(body.clone())),
            Scripted::Fail(status) if queue.len() == 1 => Some(Scripted::Fail(*status)),
            _ => queue.pop_front(),
        }
    }

    /// Raw scripted body, `None` when the call was not scripted.
    fn body(&self, call: String) -> BoxFuture<'static, Result<Option<Value>>> {
        let scripted = self.next_scripted(&call);
        Box::pin(async move {
            match scripted {
                None => Ok(None),
                Some(Scripted::Ready(body)) => Ok(Some(body)),
                Some(Scripted::Fail(status)) => Err(DeployLensError::Api {
                    status,
                    message: format!("{call} failed"),
                }),
                Some(Scripted::Gated(rx)) => rx.await.map(Some).map_err(|_| DeployLensError::Api {
                    status: 499,
                    message: format!("{call} gate dropped"),
                }),
            }
        })
    }

    fn reply<T>(&self, call: String) -> BoxFuture<'static, Result<T>>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let body = self.body(call);
        Box::pin(async move {
            match body.await? {
                None => Ok(T::default()),
                Some(body) => Ok(serde_json::from_value(body)?),
            }
        })
    }

    fn reply_records<T>(&self, call: String, endpoint: Endpoint) -> BoxFuture<'static, Result<Vec<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let body = self.body(call);
        Box::pin(async move {
            match body.await? {
                None => Ok(Vec::new()),
                Some(body) => normalize(endpoint.path(), body, endpoint.wrapper_fields()),
            }
        })
    }
}

impl DashboardSource for FakeSource {
    fn projects(&self) -> BoxFuture<'static, Result<Vec<String>>> {
        self.reply_records("projects".to_string(), Endpoint::Projects)
    }

    fn releases(&self, project: &str) -> BoxFuture<'static, Result<Vec<Release>>> {
        self.reply_records(format!("releases:{project}"), Endpoint::Releases)
    }

    fn pipelines(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Pipeline>>> {
        self.reply_records(
            format!("pipelines:{project}:{start_date}:{end_date}"),
            Endpoint::Pipelines,
        )
    }

    fn yaml_pipelines(&self, project: &str) -> BoxFuture<'static, Result<Vec<Pipeline>>> {
        self.reply_records(format!("yaml-pipelines:{project}"), Endpoint::YamlPipelines)
    }

    fn pipeline_runs(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<Vec<DeploymentRecord>>> {
        self.reply_records(
            format!("pipeline-runs:{project}:{start_date}:{end_date}:{definition_id}"),
            Endpoint::PipelinesRuns,
        )
    }

    fn deployed_environments(
        &self,
        project: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<DeployedEnvironments>> {
        self.reply(format!("deployed-environments:{project}:{definition_id}"))
    }

    fn iteration_work_items(
        &self,
        project: &str,
        iteration_id: &str,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>> {
        self.reply_records(
            format!("work-items:{project}:{iteration_id}"),
            Endpoint::IterationWorkItems,
        )
    }

    fn pending_approvals(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        self.reply_records(
            format!("approvals:{project}:{start_date}:{end_date}"),
            Endpoint::PendingApprovals,
        )
    }

    fn user_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        self.reply_records(
            format!("user-approvals:{project}:{}", identity.email()),
            Endpoint::PendingApprovalsUser,
        )
    }

    fn yaml_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        self.reply_records(
            format!("yaml-approvals:{project}:{}", identity.email()),
            Endpoint::YamlPipelineApprovalsMatching,
        )
    }

    fn release_work_items(
        &self,
        project: &str,
        release_id: u64,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>> {
        self.reply_records(
            format!("release-work-items:{project}:{release_id}"),
            Endpoint::ReleaseWorkItems,
        )
    }

    fn release_plan_items(&self, project: &str) -> BoxFuture<'static, Result<Vec<ReleasePlanItem>>> {
        self.reply_records(format!("release-plan:{project}"), Endpoint::ReleasePlanWorkItems)
    }

    fn test_plan_result(
        &self,
        project: &str,
        sprint: &str,
    ) -> BoxFuture<'static, Result<Option<TestPlanResult>>> {
        self.reply(format!("test-plan:{project}:{sprint}"))
    }

    fn yaml_pipeline_builds(
        &self,
        project: &str,
        pipeline_id: &str,
        min_time: &str,
        max_time: &str,
    ) -> BoxFuture<'static, Result<Vec<YamlBuild>>> {
        self.reply_records(
            format!("yaml-builds:{project}:{min_time}:{max_time}:{pipeline_id}"),
            Endpoint::YamlPipelineBuilds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_scripted_answer_repeats() {
        let source = FakeSource::new();
        source.respond("projects", json!(["Alpha"]));
        source.fail("releases:Alpha", 500).fail("releases:Alpha", 502);

        assert_eq!(source.projects().await.unwrap(), vec!["Alpha"]);
        assert_eq!(source.projects().await.unwrap(), vec!["Alpha"]);

        let statuses: Vec<u16> = [
            source.releases("Alpha").await,
            source.releases("Alpha").await,
            source.releases("Alpha").await,
        ]
        .into_iter()
        .map(|result| match result {
            Err(DeployLensError::Api { status, .. }) => status,
            other => panic!("expected api error, got {other:?}"),
        })
        .collect();
        assert_eq!(statuses, vec![500, 502, 502]);
    }

    #[tokio::test]
    async fn test_wrapped_records_are_normalized() {
        let source = FakeSource::new();
        source.respond(
            "release-plan:Alpha",
            json!({"value": [{"title": "Sprint 1 - hardening"}, null]}),
        );

        let items = source.release_plan_items("Alpha").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Sprint 1 - hardening");
    }
}
