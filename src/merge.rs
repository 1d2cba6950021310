use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{
    BuildStage, DeployedEnvironments, DeploymentRecord, EnvironmentStatus, ReleaseRun,
};

/// Three-way classification used to color deployment statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Positive,
    Negative,
    Neutral,
}

impl StatusClass {
    pub fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

const POSITIVE_STATUSES: &[&str] = &["succeeded", "success", "completed", "passed", "deployed"];
const NEGATIVE_STATUSES: &[&str] = &[
    "failed",
    "failure",
    "rejected",
    "canceled",
    "cancelled",
    "error",
];

/// Classifies a raw status string, ignoring case and surrounding whitespace.
pub fn classify_status(status: &str) -> StatusClass {
    let status = status.trim().to_lowercase();
    if POSITIVE_STATUSES.contains(&status.as_str()) {
        StatusClass::Positive
    } else if NEGATIVE_STATUSES.contains(&status.as_str()) {
        StatusClass::Negative
    } else {
        StatusClass::Neutral
    }
}

impl EnvironmentStatus {
    pub fn class(&self) -> StatusClass {
        classify_status(&self.status)
    }
}

impl BuildStage {
    /// A stage without a result has not run yet.
    pub fn class(&self) -> StatusClass {
        self.result.as_deref().map_or(StatusClass::Neutral, classify_status)
    }
}

struct RunAccumulator {
    run: ReleaseRun,
    seen_environments: HashSet<String>,
}

impl RunAccumulator {
    fn seed(record: &DeploymentRecord) -> Self {
        Self {
            run: ReleaseRun {
                release_id: record.release_id,
                release_name: record
                    .release_name
                    .clone()
                    .unwrap_or_else(|| format!("Release {}", record.release_id)),
                queued_on: record.queued_on.clone(),
                release_url: record.release_url.clone(),
                commit_url: record.commit_url.clone(),
                environments: Vec::new(),
            },
            seen_environments: HashSet::new(),
        }
    }

    fn add_environment(&mut self, record: &DeploymentRecord) {
        // Records without an environment still create the run row.
        let Some(name) = record.environment_name.as_deref().filter(|n| !n.is_empty()) else {
            return;
        };

        if self.seen_environments.insert(name.to_string()) {
            self.run.environments.push(EnvironmentStatus {
                name: name.to_string(),
                status: record.status.clone().unwrap_or_default(),
            });
        }
    }

    fn fill_missing_links(&mut self, record: &DeploymentRecord) {
        if self.run.commit_url.is_none() {
            self.run.commit_url.clone_from(&record.commit_url);
        }
        if self.run.release_url.is_none() {
            self.run.release_url.clone_from(&record.release_url);
        }
    }
}

/// Merges flat deployment records into one [`ReleaseRun`] per release id.
///
/// Runs appear in order of first appearance of their release id. Within a
/// run, environments are de-duplicated by name and the first record for an
/// environment wins.
pub fn merge_release_runs<'a, I>(records: I) -> Vec<ReleaseRun>
where
    I: IntoIterator<Item = &'a DeploymentRecord>,
{
    let mut runs: IndexMap<u64, RunAccumulator> = IndexMap::new();

    for record in records {
        let acc = runs
            .entry(record.release_id)
            .or_insert_with(|| RunAccumulator::seed(record));
        acc.fill_missing_links(record);
        acc.add_environment(record);
    }

    runs.into_values().map(|acc| acc.run).collect()
}

/// Picks the authoritative run for "current deployment status" displays:
/// the greatest numeric release id. On equal ids the earlier run is kept.
pub fn latest_run(runs: &[ReleaseRun]) -> Option<&ReleaseRun> {
    runs.iter().fold(None, |latest: Option<&ReleaseRun>, run| match latest {
        Some(current) if current.release_id >= run.release_id => Some(current),
        _ => Some(run),
    })
}

/// Current deployment status of one pipeline, ready for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentBoard {
    pub pipeline_url: Option<String>,
    pub latest: Option<ReleaseRun>,
}

impl EnvironmentBoard {
    pub fn from_deployed(deployed: &DeployedEnvironments) -> Self {
        let runs = merge_release_runs(&deployed.environments);
        Self {
            pipeline_url: deployed.pipeline_url.clone(),
            latest: latest_run(&runs).cloned(),
        }
    }

    pub fn environments(&self) -> &[EnvironmentStatus] {
        self.latest
            .as_ref()
            .map(|run| run.environments.as_slice())
            .unwrap_or_default()
    }
}
