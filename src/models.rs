use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A release or iteration of a project. Its date window scopes the classic
/// pipeline, approval and release-run queries; its id scopes work items and
/// its name doubles as the sprint name for test and release plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    pub finish_date: Option<String>,
    #[serde(default)]
    pub release_notes_url: Option<String>,
}

impl Release {
    /// Returns the `(start, finish)` window when both ends are present and non-blank.
    pub fn date_range(&self) -> Option<(&str, &str)> {
        let start = self.start_date.as_deref().filter(|s| !s.trim().is_empty())?;
        let finish = self.finish_date.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((start, finish))
    }
}

/// A classic release definition or a YAML pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub definition_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub pipeline_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One deployment of one release into one environment, as the backend
/// returns it: flat, one row per (release, environment) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    #[serde(deserialize_with = "u64_or_numeric_string")]
    pub release_id: u64,
    #[serde(default, alias = "name")]
    pub release_name: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub release_url: Option<String>,
    #[serde(default, alias = "createdOn")]
    pub queued_on: Option<String>,
    #[serde(default)]
    pub commit_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    pub name: String,
    pub status: String,
}

/// All deployments of a single release merged into one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRun {
    pub release_id: u64,
    pub release_name: String,
    pub queued_on: Option<String>,
    pub release_url: Option<String>,
    pub commit_url: Option<String>,
    pub environments: Vec<EnvironmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    #[serde(deserialize_with = "u64_or_numeric_string")]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, alias = "htmlURL")]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub pipeline_name: String,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub pipeline_url: Option<String>,
    #[serde(default)]
    pub release_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePlanItem {
    pub title: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestPlanResult {
    pub passed_tests: u64,
    pub incomplete_tests: u64,
    pub not_applicable_tests: u64,
    pub unanalyzed_tests: u64,
    pub url: Option<String>,
}

/// One run of a YAML pipeline with its stage results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlBuild {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "buildNumber")]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stages: Vec<BuildStage>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStage {
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// Response of the deployed-environments endpoint before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployedEnvironments {
    pub environments: Vec<DeploymentRecord>,
    pub pipeline_url: Option<String>,
}

fn value_to_id(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected string or number id, found {other}")),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(value).map_err(serde::de::Error::custom)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_to_id(value)
            .map(|id| Some(id).filter(|id| !id.is_empty()))
            .map_err(serde::de::Error::custom),
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn u64_or_numeric_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("id {n} is not a positive integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("id '{s}' is not numeric"))),
        other => Err(serde::de::Error::custom(format!(
            "expected numeric id, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_release_accepts_numeric_and_string_ids() {
        let numeric: Release = serde_json::from_value(json!({"id": 7, "name": "Sprint 7"})).unwrap();
        let text: Release =
            serde_json::from_value(json!({"id": "a1-b2", "name": "Sprint 8"})).unwrap();
        assert_eq!(numeric.id, "7");
        assert_eq!(text.id, "a1-b2");
    }

    #[test]
    fn test_release_date_range_requires_both_ends() {
        let release: Release = serde_json::from_value(json!({
            "id": 1,
            "name": "Sprint 1",
            "startDate": "2024-01-01",
            "finishDate": ""
        }))
        .unwrap();
        assert_eq!(release.date_range(), None);

        let release: Release = serde_json::from_value(json!({
            "id": 1,
            "name": "Sprint 1",
            "startDate": "2024-01-01",
            "endDate": "2024-01-14"
        }))
        .unwrap();
        assert_eq!(release.date_range(), Some(("2024-01-01", "2024-01-14")));
    }

    #[test]
    fn test_work_item_accepts_html_url_alias_and_string_id() {
        let item: WorkItem = serde_json::from_value(json!({
            "id": "42",
            "title": "Fix login",
            "assignedTo": "X",
            "state": "New",
            "htmlURL": "https://tracker/42"
        }))
        .unwrap();
        assert_eq!(item.id, 42);
        assert_eq!(item.html_url.as_deref(), Some("https://tracker/42"));
    }

    #[test]
    fn test_deployment_record_rejects_non_numeric_release_id() {
        let result: std::result::Result<DeploymentRecord, _> =
            serde_json::from_value(json!({"releaseId": "abc", "environmentName": "dev"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_blank_definition_id_is_none() {
        let pipeline: Pipeline =
            serde_json::from_value(json!({"definitionId": "", "name": "web"})).unwrap();
        assert_eq!(pipeline.definition_id, None);

        let pipeline: Pipeline =
            serde_json::from_value(json!({"definitionId": 12, "name": "web"})).unwrap();
        assert_eq!(pipeline.definition_id.as_deref(), Some("12"));
    }

    #[test]
    fn test_yaml_build_tolerates_missing_stages() {
        let build: YamlBuild = serde_json::from_value(json!({
            "id": 311,
            "buildNumber": "20240105.2",
            "status": "completed",
            "stages": null,
            "webUrl": "https://builds/311"
        }))
        .unwrap();
        assert_eq!(build.id.as_deref(), Some("311"));
        assert_eq!(build.name, "20240105.2");
        assert!(build.stages.is_empty());
        assert_eq!(build.github_url, None);
    }

    #[test]
    fn test_test_plan_result_defaults_missing_counts() {
        let result: TestPlanResult =
            serde_json::from_value(json!({"passedTests": 3, "url": "https://plans/1"})).unwrap();
        assert_eq!(result.passed_tests, 3);
        assert_eq!(result.incomplete_tests, 0);
    }
}
