use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;

use super::source::DashboardSource;
use crate::aggregate::ReleaseSummary;
use crate::error::Result;
use crate::merge::merge_release_runs;
use crate::models::{DeploymentRecord, ReleaseRun};
use crate::normalize::dedup_by_key;

/// Release runs of every classic pipeline active in a release window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOverview {
    pub runs: Vec<ReleaseRun>,
    pub summary: ReleaseSummary,
    /// Definitions whose run query failed and contributed nothing.
    pub failed_definitions: Vec<String>,
}

/// Lists the classic pipelines of the window, then fetches the runs of each
/// definition concurrently and merges them.
///
/// A failure listing the pipelines fails the whole overview. A failure of a
/// single definition is logged and skipped.
pub async fn collect_release_overview<S>(
    source: &S,
    project: &str,
    start_date: &str,
    end_date: &str,
) -> Result<ReleaseOverview>
where
    S: DashboardSource + ?Sized,
{
    let pipelines = source.pipelines(project, start_date, end_date).await?;

    let definition_ids: Vec<String> = dedup_by_key(
        pipelines
            .into_iter()
            .filter_map(|pipeline| pipeline.definition_id)
            .collect(),
        Clone::clone,
    );

    info!(
        "Fetching release runs of {} pipeline definitions in {project}",
        definition_ids.len()
    );

    let fetches = definition_ids.iter().map(|definition_id| {
        source.pipeline_runs(project, start_date, end_date, definition_id)
    });
    let results = join_all(fetches).await;

    let mut records: Vec<DeploymentRecord> = Vec::new();
    let mut failed_definitions = Vec::new();
    for (definition_id, result) in definition_ids.into_iter().zip(results) {
        match result {
            Ok(batch) => records.extend(batch),
            Err(e) => {
                warn!("Skipping release runs of definition {definition_id}: {e}");
                failed_definitions.push(definition_id);
            }
        }
    }

    Ok(ReleaseOverview {
        runs: merge_release_runs(&records),
        summary: ReleaseSummary::from_records(&records),
        failed_definitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const WINDOW: &str = "Alpha:2024-01-01:2024-01-14";

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_definitions() {
        let source = FakeSource::new();
        source.respond(
            &format!("pipelines:{WINDOW}"),
            json!([
                {"definitionId": 1, "name": "api"},
                {"definitionId": 2, "name": "web"},
                {"definitionId": "2", "name": "web (copy)"},
                {"name": "orphan"}
            ]),
        );
        source.respond(
            &format!("pipeline-runs:{WINDOW}:1"),
            json!([
                {"releaseId": 10, "environmentName": "dev", "status": "active"},
                {"releaseId": 10, "environmentName": "prod", "status": "succeeded"}
            ]),
        );
        source.fail(&format!("pipeline-runs:{WINDOW}:2"), 502);

        let overview = assert_ok!(
            collect_release_overview(&source, "Alpha", "2024-01-01", "2024-01-14").await
        );

        assert_eq!(source.count("pipeline-runs:"), 2);
        assert_eq!(overview.runs.len(), 1);
        assert_eq!(overview.runs[0].environments.len(), 2);
        assert_eq!(overview.summary, ReleaseSummary { total: 2, active: 1 });
        assert_eq!(overview.failed_definitions, vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_pipeline_list_failure_fails_overview() {
        let source = FakeSource::new();
        source.fail(&format!("pipelines:{WINDOW}"), 500);

        assert_err!(collect_release_overview(&source, "Alpha", "2024-01-01", "2024-01-14").await);
        assert_eq!(source.count("pipeline-runs:"), 0);
    }

    #[tokio::test]
    async fn test_no_pipelines_is_empty_overview() {
        let source = FakeSource::new();

        let overview = assert_ok!(
            collect_release_overview(&source, "Alpha", "2024-01-01", "2024-01-14").await
        );
        assert_eq!(overview, ReleaseOverview::default());
    }
}
