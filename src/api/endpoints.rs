use serde::{Deserialize, Serialize};

use crate::error::{DeployLensError, Result};

/// Backend query endpoints, all served under `<base-url>/api/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Projects,
    Releases,
    Iterations,
    Pipelines,
    YamlPipelines,
    PipelinesRuns,
    DeployedEnvironments,
    IterationWorkItems,
    PendingApprovals,
    PendingApprovalsUser,
    YamlPipelineApprovalsMatching,
    ReleaseWorkItems,
    ReleasePlanWorkItems,
    TestPlanResult,
    YamlPipelineBuilds,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Releases => "releases",
            Self::Iterations => "iterations",
            Self::Pipelines => "pipelines",
            Self::YamlPipelines => "yaml-pipelines",
            Self::PipelinesRuns => "pipelines-runs",
            Self::DeployedEnvironments => "deployed-environments",
            Self::IterationWorkItems => "iteration-work-items",
            Self::PendingApprovals => "pending-approvals",
            Self::PendingApprovalsUser => "pending-approvals-user",
            Self::YamlPipelineApprovalsMatching => "yaml-pipeline-approvals-matching",
            Self::ReleaseWorkItems => "release-work-items",
            Self::ReleasePlanWorkItems => "release-plan-work-items",
            Self::TestPlanResult => "test-plan-result",
            Self::YamlPipelineBuilds => "yaml-pipeline-builds",
        }
    }

    /// Parameters that must be present and non-blank before a request is sent.
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Projects => &[],
            Self::Releases | Self::Iterations | Self::YamlPipelines | Self::ReleasePlanWorkItems => {
                &["project"]
            }
            Self::Pipelines | Self::PendingApprovals => &["project", "startDate", "endDate"],
            Self::PipelinesRuns => &["project", "startDate", "endDate", "definitionId"],
            Self::DeployedEnvironments => &["project", "definitionId"],
            Self::IterationWorkItems => &["project", "iteration_id"],
            Self::PendingApprovalsUser | Self::YamlPipelineApprovalsMatching => &["project", "email"],
            Self::ReleaseWorkItems => &["release_id", "project"],
            Self::TestPlanResult => &["project", "sprint"],
            Self::YamlPipelineBuilds => &["project", "pipelineId", "minTime", "maxTime"],
        }
    }

    /// Object fields that may wrap the record array in this endpoint's response.
    pub fn wrapper_fields(self) -> &'static [&'static str] {
        match self {
            Self::Projects => &["projects", "value"],
            Self::Releases | Self::Iterations => &["releases", "iterations", "value"],
            Self::Pipelines | Self::YamlPipelines => &["pipelines", "value"],
            Self::PipelinesRuns => &["runs", "releases", "value"],
            Self::DeployedEnvironments => &["environments"],
            Self::IterationWorkItems | Self::ReleaseWorkItems | Self::ReleasePlanWorkItems => {
                &["value", "workItems", "items"]
            }
            Self::PendingApprovals
            | Self::PendingApprovalsUser
            | Self::YamlPipelineApprovalsMatching => &["approvals", "value"],
            Self::TestPlanResult => &[],
            Self::YamlPipelineBuilds => &["builds", "value"],
        }
    }
}

/// Where release options for a project come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSource {
    #[default]
    Releases,
    Iterations,
}

impl ReleaseSource {
    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::Releases => Endpoint::Releases,
            Self::Iterations => Endpoint::Iterations,
        }
    }
}

/// A single outbound query: endpoint plus its query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    endpoint: Endpoint,
    params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }

    /// Rejects a request whose required parameters are missing or blank, so a
    /// partial selection never reaches the network.
    pub fn validate(&self) -> Result<()> {
        for required in self.endpoint.required_params() {
            let present = self
                .params
                .iter()
                .any(|(name, value)| name == required && !value.trim().is_empty());
            if !present {
                return Err(DeployLensError::MissingParam {
                    endpoint: self.endpoint.path().to_string(),
                    param: (*required).to_string(),
                });
            }
        }
        Ok(())
    }
}
