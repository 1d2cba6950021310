use futures::future::BoxFuture;
use log::debug;

use super::core::ApiClient;
use super::endpoints::{ApiRequest, Endpoint};
use crate::auth::Identity;
use crate::error::Result;
use crate::models::{
    Approval, DeployedEnvironments, DeploymentRecord, Pipeline, Release, ReleasePlanItem,
    TestPlanResult, WorkItem, YamlBuild,
};
use crate::normalize::{normalize, ResponseShape};

/// Everything the dashboard reads from its backend.
///
/// Returned futures own their inputs so they can be spawned and cancelled
/// independently of the caller.
pub trait DashboardSource: Send + Sync + 'static {
    fn projects(&self) -> BoxFuture<'static, Result<Vec<String>>>;

    fn releases(&self, project: &str) -> BoxFuture<'static, Result<Vec<Release>>>;

    fn pipelines(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Pipeline>>>;

    fn yaml_pipelines(&self, project: &str) -> BoxFuture<'static, Result<Vec<Pipeline>>>;

    fn pipeline_runs(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<Vec<DeploymentRecord>>>;

    fn deployed_environments(
        &self,
        project: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<DeployedEnvironments>>;

    fn iteration_work_items(
        &self,
        project: &str,
        iteration_id: &str,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>>;

    fn pending_approvals(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Approval>>>;

    fn user_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>>;

    fn yaml_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>>;

    fn release_work_items(
        &self,
        project: &str,
        release_id: u64,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>>;

    fn release_plan_items(&self, project: &str) -> BoxFuture<'static, Result<Vec<ReleasePlanItem>>>;

    fn test_plan_result(
        &self,
        project: &str,
        sprint: &str,
    ) -> BoxFuture<'static, Result<Option<TestPlanResult>>>;

    /// Runs of one YAML pipeline queued between `min_time` and `max_time`.
    fn yaml_pipeline_builds(
        &self,
        project: &str,
        pipeline_id: &str,
        min_time: &str,
        max_time: &str,
    ) -> BoxFuture<'static, Result<Vec<YamlBuild>>>;
}

impl ApiClient {
    pub async fn fetch_projects(&self) -> Result<Vec<String>> {
        self.fetch_records(ApiRequest::new(Endpoint::Projects)).await
    }

    /// Releases or iterations, depending on the configured release source.
    pub async fn fetch_releases(&self, project: &str) -> Result<Vec<Release>> {
        let request = ApiRequest::new(self.release_source().endpoint()).param("project", project);
        self.fetch_records(request).await
    }

    pub async fn fetch_pipelines(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Pipeline>> {
        let request = ApiRequest::new(Endpoint::Pipelines)
            .param("startDate", start_date)
            .param("endDate", end_date)
            .param("project", project);
        self.fetch_records(request).await
    }

    pub async fn fetch_yaml_pipelines(&self, project: &str) -> Result<Vec<Pipeline>> {
        self.fetch_records(ApiRequest::new(Endpoint::YamlPipelines).param("project", project))
            .await
    }

    pub async fn fetch_pipeline_runs(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
        definition_id: &str,
    ) -> Result<Vec<DeploymentRecord>> {
        let request = ApiRequest::new(Endpoint::PipelinesRuns)
            .param("startDate", start_date)
            .param("endDate", end_date)
            .param("project", project)
            .param("definitionId", definition_id);
        self.fetch_records(request).await
    }

    /// The endpoint answers with `{ environments, pipelineUrl }`, but a bare
    /// record list is accepted too.
    pub async fn fetch_deployed_environments(
        &self,
        project: &str,
        definition_id: &str,
    ) -> Result<DeployedEnvironments> {
        let endpoint = Endpoint::DeployedEnvironments;
        let request = ApiRequest::new(endpoint)
            .param("project", project)
            .param("definitionId", definition_id);
        let mut body = self.get_json(&request).await?;

        let pipeline_url = body
            .as_object_mut()
            .and_then(|fields| fields.remove("pipelineUrl"))
            .and_then(|url| url.as_str().map(str::to_string));

        let shape = ResponseShape::classify(body, endpoint.wrapper_fields());
        let environments: Vec<DeploymentRecord> = normalize(
            endpoint.path(),
            serde_json::Value::Array(shape.into_items()),
            &[],
        )?;
        debug!(
            "{} returned {} records for definition {definition_id}",
            endpoint.path(),
            environments.len()
        );

        Ok(DeployedEnvironments {
            environments,
            pipeline_url,
        })
    }

    pub async fn fetch_iteration_work_items(
        &self,
        project: &str,
        iteration_id: &str,
    ) -> Result<Vec<WorkItem>> {
        let request = ApiRequest::new(Endpoint::IterationWorkItems)
            .param("project", project)
            .param("iteration_id", iteration_id);
        self.fetch_records(request).await
    }

    pub async fn fetch_pending_approvals(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Approval>> {
        let request = ApiRequest::new(Endpoint::PendingApprovals)
            .param("startDate", start_date)
            .param("endDate", end_date)
            .param("project", project);
        self.fetch_records(request).await
    }

    pub async fn fetch_user_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> Result<Vec<Approval>> {
        let request = ApiRequest::new(Endpoint::PendingApprovalsUser)
            .param("project", project)
            .param("email", identity.email());
        self.fetch_records(request).await
    }

    pub async fn fetch_yaml_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> Result<Vec<Approval>> {
        let request = ApiRequest::new(Endpoint::YamlPipelineApprovalsMatching)
            .param("project", project)
            .param("email", identity.email());
        self.fetch_records(request).await
    }

    pub async fn fetch_release_work_items(
        &self,
        project: &str,
        release_id: u64,
    ) -> Result<Vec<WorkItem>> {
        let request = ApiRequest::new(Endpoint::ReleaseWorkItems)
            .param("release_id", release_id.to_string())
            .param("project", project);
        self.fetch_records(request).await
    }

    pub async fn fetch_release_plan_items(&self, project: &str) -> Result<Vec<ReleasePlanItem>> {
        self.fetch_records(ApiRequest::new(Endpoint::ReleasePlanWorkItems).param("project", project))
            .await
    }

    /// `None` when the backend has no test plan for the sprint.
    pub async fn fetch_test_plan_result(
        &self,
        project: &str,
        sprint: &str,
    ) -> Result<Option<TestPlanResult>> {
        let endpoint = Endpoint::TestPlanResult;
        let request = ApiRequest::new(endpoint)
            .param("project", project)
            .param("sprint", sprint);
        let body = self.get_json(&request).await?;
        let mut results: Vec<TestPlanResult> = normalize(endpoint.path(), body, &[])?;
        Ok(if results.is_empty() {
            None
        } else {
            Some(results.swap_remove(0))
        })
    }

    pub async fn fetch_yaml_pipeline_builds(
        &self,
        project: &str,
        pipeline_id: &str,
        min_time: &str,
        max_time: &str,
    ) -> Result<Vec<YamlBuild>> {
        let request = ApiRequest::new(Endpoint::YamlPipelineBuilds)
            .param("project", project)
            .param("pipelineId", pipeline_id)
            .param("minTime", min_time)
            .param("maxTime", max_time);
        self.fetch_records(request).await
    }
}

impl DashboardSource for ApiClient {
    fn projects(&self) -> BoxFuture<'static, Result<Vec<String>>> {
        let client = self.clone();
        Box::pin(async move { client.fetch_projects().await })
    }

    fn releases(&self, project: &str) -> BoxFuture<'static, Result<Vec<Release>>> {
        let client = self.clone();
        let project = project.to_owned();
        Box::pin(async move { client.fetch_releases(&project).await })
    }

    fn pipelines(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Pipeline>>> {
        let client = self.clone();
        let (project, start_date, end_date) =
            (project.to_owned(), start_date.to_owned(), end_date.to_owned());
        Box::pin(async move { client.fetch_pipelines(&project, &start_date, &end_date).await })
    }

    fn yaml_pipelines(&self, project: &str) -> BoxFuture<'static, Result<Vec<Pipeline>>> {
        let client = self.clone();
        let project = project.to_owned();
        Box::pin(async move { client.fetch_yaml_pipelines(&project).await })
    }

    fn pipeline_runs(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<Vec<DeploymentRecord>>> {
        let client = self.clone();
        let (project, start_date, end_date, definition_id) = (
            project.to_owned(),
            start_date.to_owned(),
            end_date.to_owned(),
            definition_id.to_owned(),
        );
        Box::pin(async move {
            client
                .fetch_pipeline_runs(&project, &start_date, &end_date, &definition_id)
                .await
        })
    }

    fn deployed_environments(
        &self,
        project: &str,
        definition_id: &str,
    ) -> BoxFuture<'static, Result<DeployedEnvironments>> {
        let client = self.clone();
        let (project, definition_id) = (project.to_owned(), definition_id.to_owned());
        Box::pin(async move { client.fetch_deployed_environments(&project, &definition_id).await })
    }

    fn iteration_work_items(
        &self,
        project: &str,
        iteration_id: &str,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>> {
        let client = self.clone();
        let (project, iteration_id) = (project.to_owned(), iteration_id.to_owned());
        Box::pin(async move { client.fetch_iteration_work_items(&project, &iteration_id).await })
    }

    fn pending_approvals(
        &self,
        project: &str,
        start_date: &str,
        end_date: &str,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        let client = self.clone();
        let (project, start_date, end_date) =
            (project.to_owned(), start_date.to_owned(), end_date.to_owned());
        Box::pin(async move {
            client
                .fetch_pending_approvals(&project, &start_date, &end_date)
                .await
        })
    }

    fn user_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        let client = self.clone();
        let (project, identity) = (project.to_owned(), identity.clone());
        Box::pin(async move { client.fetch_user_approvals(&project, &identity).await })
    }

    fn yaml_approvals(
        &self,
        project: &str,
        identity: &Identity,
    ) -> BoxFuture<'static, Result<Vec<Approval>>> {
        let client = self.clone();
        let (project, identity) = (project.to_owned(), identity.clone());
        Box::pin(async move { client.fetch_yaml_approvals(&project, &identity).await })
    }

    fn release_work_items(
        &self,
        project: &str,
        release_id: u64,
    ) -> BoxFuture<'static, Result<Vec<WorkItem>>> {
        let client = self.clone();
        let project = project.to_owned();
        Box::pin(async move { client.fetch_release_work_items(&project, release_id).await })
    }

    fn release_plan_items(&self, project: &str) -> BoxFuture<'static, Result<Vec<ReleasePlanItem>>> {
        let client = self.clone();
        let project = project.to_owned();
        Box::pin(async move { client.fetch_release_plan_items(&project).await })
    }

    fn test_plan_result(
        &self,
        project: &str,
        sprint: &str,
    ) -> BoxFuture<'static, Result<Option<TestPlanResult>>> {
        let client = self.clone();
        let (project, sprint) = (project.to_owned(), sprint.to_owned());
        Box::pin(async move { client.fetch_test_plan_result(&project, &sprint).await })
    }

    fn yaml_pipeline_builds(
        &self,
        project: &str,
        pipeline_id: &str,
        min_time: &str,
        max_time: &str,
    ) -> BoxFuture<'static, Result<Vec<YamlBuild>>> {
        let client = self.clone();
        let (project, pipeline_id, min_time, max_time) = (
            project.to_owned(),
            pipeline_id.to_owned(),
            min_time.to_owned(),
            max_time.to_owned(),
        );
        Box::pin(async move {
            client
                .fetch_yaml_pipeline_builds(&project, &pipeline_id, &min_time, &max_time)
                .await
        })
    }
}
