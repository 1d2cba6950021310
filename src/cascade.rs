use std::sync::Arc;

use futures::TryFutureExt;
use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::aggregate::{state_histogram, work_item_facets, FacetFilter, FacetValue, ASSIGNEE_FACET, STATE_FACET};
use crate::api::{collect_release_overview, DashboardSource, ReleaseOverview};
use crate::auth::Identity;
use crate::fetch::{FetchHandle, FetchRegistry, QueryClass};
use crate::merge::{merge_release_runs, EnvironmentBoard};
use crate::models::{
    Approval, Pipeline, Release, ReleasePlanItem, ReleaseRun, TestPlanResult, WorkItem, YamlBuild,
};
use crate::normalize::dedup_by_key;
use crate::query::{Applied, QueryData, ScopedQuery, Settlement, ViewStatus};

/// The user's current drill-down path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub project: Option<String>,
    pub release: Option<Release>,
    /// Definition id of the selected pipeline.
    pub pipeline: Option<String>,
    /// Release id of the opened release run.
    pub release_run: Option<u64>,
    /// Definition id of the selected YAML pipeline.
    pub yaml_pipeline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityScope {
    pub project: String,
    pub identity: Identity,
}

/// A project plus the date window of the selected release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowScope {
    pub project: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationScope {
    pub project: String,
    pub iteration_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintScope {
    pub project: String,
    pub sprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineWindowScope {
    pub window: WindowScope,
    pub definition_id: String,
}

/// A YAML pipeline within the release window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlBuildScope {
    pub window: WindowScope,
    pub pipeline_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineScope {
    pub project: String,
    pub definition_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScope {
    pub project: String,
    pub release_id: u64,
}

/// Tags every query should carry for a selection. `None` means the query's
/// prerequisites are not met and it must be idle.
#[derive(Debug, Default)]
struct ScopeTags {
    project: Option<String>,
    identity: Option<IdentityScope>,
    window: Option<WindowScope>,
    iteration: Option<IterationScope>,
    sprint: Option<SprintScope>,
    pipeline_window: Option<PipelineWindowScope>,
    yaml_builds: Option<YamlBuildScope>,
    pipeline: Option<PipelineScope>,
    release_run: Option<RunScope>,
}

impl Selection {
    fn tags(&self, identity: Option<&Identity>) -> ScopeTags {
        let Some(project) = self.project.clone() else {
            return ScopeTags::default();
        };

        let identity = identity.map(|identity| IdentityScope {
            project: project.clone(),
            identity: identity.clone(),
        });

        let release = self.release.as_ref();
        let window = release.and_then(Release::date_range).map(|(start, end)| WindowScope {
            project: project.clone(),
            start_date: start.to_string(),
            end_date: end.to_string(),
        });
        let iteration = release
            .filter(|release| !release.id.trim().is_empty())
            .map(|release| IterationScope {
                project: project.clone(),
                iteration_id: release.id.clone(),
            });
        let sprint = release
            .filter(|release| !release.name.trim().is_empty())
            .map(|release| SprintScope {
                project: project.clone(),
                sprint: release.name.clone(),
            });

        let pipeline_window = window
            .clone()
            .zip(self.pipeline.clone())
            .map(|(window, definition_id)| PipelineWindowScope {
                window,
                definition_id,
            });
        let yaml_builds = window
            .clone()
            .zip(self.yaml_pipeline.clone())
            .map(|(window, pipeline_id)| YamlBuildScope {
                window,
                pipeline_id,
            });
        let pipeline = self.pipeline.clone().map(|definition_id| PipelineScope {
            project: project.clone(),
            definition_id,
        });
        let release_run = self.release_run.map(|release_id| RunScope {
            project: project.clone(),
            release_id,
        });

        ScopeTags {
            project: Some(project),
            identity,
            window,
            iteration,
            sprint,
            pipeline_window,
            yaml_builds,
            pipeline,
            release_run,
        }
    }
}

/// A settled request, routed back to the query of its class.
#[derive(Debug)]
pub enum DashboardEvent {
    Projects(Settlement<(), Vec<String>>),
    Releases(Settlement<String, Vec<Release>>),
    YamlPipelines(Settlement<String, Vec<Pipeline>>),
    UserApprovals(Settlement<IdentityScope, Vec<Approval>>),
    YamlApprovals(Settlement<IdentityScope, Vec<Approval>>),
    Pipelines(Settlement<WindowScope, Vec<Pipeline>>),
    ReleaseOverview(Settlement<WindowScope, ReleaseOverview>),
    Approvals(Settlement<WindowScope, Vec<Approval>>),
    WorkItems(Settlement<IterationScope, Vec<WorkItem>>),
    TestPlan(Settlement<SprintScope, Option<TestPlanResult>>),
    ReleasePlan(Settlement<SprintScope, Vec<ReleasePlanItem>>),
    PipelineRuns(Settlement<PipelineWindowScope, Vec<ReleaseRun>>),
    Environments(Settlement<PipelineScope, EnvironmentBoard>),
    ReleaseWorkItems(Settlement<RunScope, Vec<WorkItem>>),
    YamlBuilds(Settlement<YamlBuildScope, Vec<YamlBuild>>),
}

impl QueryData for EnvironmentBoard {
    fn record_count(&self) -> usize {
        self.environments().len()
    }
}

impl QueryData for ReleaseOverview {
    fn record_count(&self) -> usize {
        self.runs.len()
    }
}

enum Drive<K> {
    Retarget(Option<K>),
    Refresh,
}

fn drive_mode<K>(refresh: bool, tag: Option<K>) -> Drive<K> {
    if refresh {
        Drive::Refresh
    } else {
        Drive::Retarget(tag)
    }
}

/// Moves one query and forwards its settlement into the event channel.
fn drive<K, T, F, Fut>(
    registry: &mut FetchRegistry,
    events: &UnboundedSender<DashboardEvent>,
    query: &mut ScopedQuery<K, T>,
    mode: Drive<K>,
    fetch: F,
    wrap: fn(Settlement<K, T>) -> DashboardEvent,
) where
    K: Clone + PartialEq + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&K) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<T>> + Send + 'static,
{
    let handle = match mode {
        Drive::Retarget(tag) => query.sync(registry, tag, fetch),
        Drive::Refresh => query.refresh(registry, fetch),
    };
    if let (Some(handle), Some(tag)) = (handle, query.tag().cloned()) {
        forward(events.clone(), handle, tag, wrap);
    }
}

fn forward<K, T>(
    events: UnboundedSender<DashboardEvent>,
    handle: FetchHandle<T>,
    tag: K,
    wrap: fn(Settlement<K, T>) -> DashboardEvent,
) where
    K: Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        let class = handle.class();
        let request_id = handle.request_id();
        let outcome = handle.outcome().await;
        // A closed channel means the dashboard is gone.
        let _ = events.send(wrap(Settlement {
            class,
            request_id,
            tag,
            outcome,
        }));
    });
}

/// Case-insensitive sprint-name match of release-plan items.
fn filter_release_plan(items: Vec<ReleasePlanItem>, sprint: &str) -> Vec<ReleasePlanItem> {
    let sprint = sprint.to_lowercase();
    items
        .into_iter()
        .filter(|item| item.title.to_lowercase().contains(&sprint))
        .collect()
}

/// Selection cascade over every dashboard view.
///
/// Owns the selection and one [`ScopedQuery`] per query class. Every
/// selection change recomputes the tag of each query: queries whose tag is
/// unchanged are left alone, queries whose prerequisites vanished go idle,
/// and the rest are re-issued. Settlements come back through a single
/// channel and are applied by whoever owns the dashboard.
pub struct Dashboard<S: DashboardSource> {
    source: Arc<S>,
    identity: Option<Identity>,
    selection: Selection,
    registry: FetchRegistry,
    events_tx: UnboundedSender<DashboardEvent>,
    events_rx: UnboundedReceiver<DashboardEvent>,
    work_item_filter: FacetFilter<WorkItem>,

    projects: ScopedQuery<(), Vec<String>>,
    releases: ScopedQuery<String, Vec<Release>>,
    yaml_pipelines: ScopedQuery<String, Vec<Pipeline>>,
    user_approvals: ScopedQuery<IdentityScope, Vec<Approval>>,
    yaml_approvals: ScopedQuery<IdentityScope, Vec<Approval>>,
    pipelines: ScopedQuery<WindowScope, Vec<Pipeline>>,
    release_overview: ScopedQuery<WindowScope, ReleaseOverview>,
    approvals: ScopedQuery<WindowScope, Vec<Approval>>,
    work_items: ScopedQuery<IterationScope, Vec<WorkItem>>,
    test_plan: ScopedQuery<SprintScope, Option<TestPlanResult>>,
    release_plan: ScopedQuery<SprintScope, Vec<ReleasePlanItem>>,
    pipeline_runs: ScopedQuery<PipelineWindowScope, Vec<ReleaseRun>>,
    environments: ScopedQuery<PipelineScope, EnvironmentBoard>,
    release_work_items: ScopedQuery<RunScope, Vec<WorkItem>>,
    yaml_builds: ScopedQuery<YamlBuildScope, Vec<YamlBuild>>,
}

impl<S: DashboardSource> Dashboard<S> {
    /// Creates the dashboard and issues the project list request.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(source: S, identity: Option<Identity>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut dashboard = Self {
            source: Arc::new(source),
            identity,
            selection: Selection::default(),
            registry: FetchRegistry::new(),
            events_tx,
            events_rx,
            work_item_filter: work_item_facets(),
            projects: ScopedQuery::new(QueryClass::Projects),
            releases: ScopedQuery::new(QueryClass::Releases),
            yaml_pipelines: ScopedQuery::new(QueryClass::YamlPipelines),
            user_approvals: ScopedQuery::new(QueryClass::UserApprovals),
            yaml_approvals: ScopedQuery::new(QueryClass::YamlApprovals),
            pipelines: ScopedQuery::new(QueryClass::Pipelines),
            release_overview: ScopedQuery::new(QueryClass::ReleaseOverview),
            approvals: ScopedQuery::new(QueryClass::Approvals),
            work_items: ScopedQuery::new(QueryClass::WorkItems),
            test_plan: ScopedQuery::new(QueryClass::TestPlan),
            release_plan: ScopedQuery::new(QueryClass::ReleasePlan),
            pipeline_runs: ScopedQuery::new(QueryClass::PipelineRuns),
            environments: ScopedQuery::new(QueryClass::Environments),
            release_work_items: ScopedQuery::new(QueryClass::ReleaseWorkItems),
            yaml_builds: ScopedQuery::new(QueryClass::YamlBuilds),
        };
        dashboard.drive_all(false);
        dashboard
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Selects a project. Clears every narrower selection.
    pub fn set_project(&mut self, project: Option<String>) {
        let project = project.filter(|p| !p.trim().is_empty());
        if project == self.selection.project {
            return;
        }
        info!("Selecting project {}", project.as_deref().unwrap_or("<none>"));
        self.selection = Selection {
            project,
            ..Selection::default()
        };
        self.drive_all(false);
    }

    /// Selects a release of the current project. Ignored without a project.
    pub fn set_release(&mut self, release: Option<Release>) {
        if self.selection.project.is_none() {
            debug!("Ignoring release selection without a project");
            return;
        }
        if release == self.selection.release {
            return;
        }
        info!(
            "Selecting release {}",
            release.as_ref().map_or("<none>", |r| r.name.as_str())
        );
        self.selection.release = release;
        self.selection.release_run = None;
        self.drive_all(false);
    }

    /// Selects the loaded release whose name matches `name`, ignoring case.
    pub fn select_release_by_name(&mut self, name: &str) -> bool {
        let found = self.releases.data().and_then(|releases| {
            releases
                .iter()
                .find(|release| release.name.trim().eq_ignore_ascii_case(name.trim()))
                .cloned()
        });
        match found {
            Some(release) => {
                self.set_release(Some(release));
                true
            }
            None => false,
        }
    }

    /// Selects a pipeline by definition id. Ignored without a project.
    pub fn set_pipeline(&mut self, definition_id: Option<String>) {
        if self.selection.project.is_none() {
            debug!("Ignoring pipeline selection without a project");
            return;
        }
        let definition_id = definition_id.filter(|id| !id.trim().is_empty());
        if definition_id == self.selection.pipeline {
            return;
        }
        self.selection.pipeline = definition_id;
        self.drive_all(false);
    }

    /// Selects a YAML pipeline by definition id. Ignored without a project.
    pub fn set_yaml_pipeline(&mut self, definition_id: Option<String>) {
        if self.selection.project.is_none() {
            debug!("Ignoring YAML pipeline selection without a project");
            return;
        }
        let definition_id = definition_id.filter(|id| !id.trim().is_empty());
        if definition_id == self.selection.yaml_pipeline {
            return;
        }
        self.selection.yaml_pipeline = definition_id;
        self.drive_all(false);
    }

    /// Opens the work-item detail of one release run. Ignored without a project.
    pub fn open_release_run(&mut self, release_id: Option<u64>) {
        if self.selection.project.is_none() {
            debug!("Ignoring release run without a project");
            return;
        }
        if release_id == self.selection.release_run {
            return;
        }
        self.selection.release_run = release_id;
        self.drive_all(false);
    }

    /// Sets a work-item facet. Returns `false` for an unknown facet.
    pub fn set_work_item_facet(&mut self, facet: &str, value: FacetValue) -> bool {
        self.work_item_filter.set(facet, value)
    }

    /// Re-issues every non-idle query for its current selection.
    pub fn refresh(&mut self) {
        info!("Refreshing dashboard");
        self.drive_all(true);
    }

    fn drive_all(&mut self, refresh: bool) {
        let tags = self.selection.tags(self.identity.as_ref());
        let source = Arc::clone(&self.source);
        let registry = &mut self.registry;
        let events = &self.events_tx;

        drive(
            registry,
            events,
            &mut self.projects,
            drive_mode(refresh, Some(())),
            |_: &()| source.projects(),
            DashboardEvent::Projects,
        );
        drive(
            registry,
            events,
            &mut self.releases,
            drive_mode(refresh, tags.project.clone()),
            |project: &String| source.releases(project),
            DashboardEvent::Releases,
        );
        drive(
            registry,
            events,
            &mut self.yaml_pipelines,
            drive_mode(refresh, tags.project.clone()),
            |project: &String| {
                source.yaml_pipelines(project).map_ok(|pipelines| {
                    dedup_by_key(pipelines, |p| {
                        p.definition_id.clone().unwrap_or_else(|| p.name.clone())
                    })
                })
            },
            DashboardEvent::YamlPipelines,
        );

        drive(
            registry,
            events,
            &mut self.user_approvals,
            drive_mode(refresh, tags.identity.clone()),
            |scope: &IdentityScope| {
                source.user_approvals(&scope.project, &scope.identity)
            },
            DashboardEvent::UserApprovals,
        );
        drive(
            registry,
            events,
            &mut self.yaml_approvals,
            drive_mode(refresh, tags.identity),
            |scope: &IdentityScope| {
                source.yaml_approvals(&scope.project, &scope.identity)
            },
            DashboardEvent::YamlApprovals,
        );

        drive(
            registry,
            events,
            &mut self.pipelines,
            drive_mode(refresh, tags.window.clone()),
            |w: &WindowScope| {
                source
                    .pipelines(&w.project, &w.start_date, &w.end_date)
                    .map_ok(|pipelines| dedup_by_key(pipelines, |p| p.name.clone()))
            },
            DashboardEvent::Pipelines,
        );
        drive(
            registry,
            events,
            &mut self.release_overview,
            drive_mode(refresh, tags.window.clone()),
            |w: &WindowScope| {
                let source = Arc::clone(&source);
                let w = w.clone();
                async move {
                    collect_release_overview(source.as_ref(), &w.project, &w.start_date, &w.end_date)
                        .await
                }
            },
            DashboardEvent::ReleaseOverview,
        );
        drive(
            registry,
            events,
            &mut self.approvals,
            drive_mode(refresh, tags.window),
            |w: &WindowScope| source.pending_approvals(&w.project, &w.start_date, &w.end_date),
            DashboardEvent::Approvals,
        );
        drive(
            registry,
            events,
            &mut self.work_items,
            drive_mode(refresh, tags.iteration),
            |scope: &IterationScope| source.iteration_work_items(&scope.project, &scope.iteration_id),
            DashboardEvent::WorkItems,
        );
        drive(
            registry,
            events,
            &mut self.test_plan,
            drive_mode(refresh, tags.sprint.clone()),
            |scope: &SprintScope| source.test_plan_result(&scope.project, &scope.sprint),
            DashboardEvent::TestPlan,
        );
        drive(
            registry,
            events,
            &mut self.release_plan,
            drive_mode(refresh, tags.sprint),
            |scope: &SprintScope| {
                let sprint = scope.sprint.clone();
                source
                    .release_plan_items(&scope.project)
                    .map_ok(move |items| filter_release_plan(items, &sprint))
            },
            DashboardEvent::ReleasePlan,
        );

        drive(
            registry,
            events,
            &mut self.pipeline_runs,
            drive_mode(refresh, tags.pipeline_window),
            |scope: &PipelineWindowScope| {
                let w = &scope.window;
                source
                    .pipeline_runs(&w.project, &w.start_date, &w.end_date, &scope.definition_id)
                    .map_ok(|records| merge_release_runs(&records))
            },
            DashboardEvent::PipelineRuns,
        );
        drive(
            registry,
            events,
            &mut self.environments,
            drive_mode(refresh, tags.pipeline),
            |scope: &PipelineScope| {
                source
                    .deployed_environments(&scope.project, &scope.definition_id)
                    .map_ok(|deployed| EnvironmentBoard::from_deployed(&deployed))
            },
            DashboardEvent::Environments,
        );
        drive(
            registry,
            events,
            &mut self.release_work_items,
            drive_mode(refresh, tags.release_run),
            |scope: &RunScope| source.release_work_items(&scope.project, scope.release_id),
            DashboardEvent::ReleaseWorkItems,
        );
        drive(
            registry,
            events,
            &mut self.yaml_builds,
            drive_mode(refresh, tags.yaml_builds),
            |scope: &YamlBuildScope| {
                let w = &scope.window;
                source.yaml_pipeline_builds(&w.project, &scope.pipeline_id, &w.start_date, &w.end_date)
            },
            DashboardEvent::YamlBuilds,
        );
    }

    /// Routes a settlement to the query of its class.
    pub fn apply(&mut self, event: DashboardEvent) -> Applied {
        let registry = &mut self.registry;
        match event {
            DashboardEvent::Projects(s) => self.projects.apply(registry, s),
            DashboardEvent::Releases(s) => self.releases.apply(registry, s),
            DashboardEvent::YamlPipelines(s) => self.yaml_pipelines.apply(registry, s),
            DashboardEvent::UserApprovals(s) => self.user_approvals.apply(registry, s),
            DashboardEvent::YamlApprovals(s) => self.yaml_approvals.apply(registry, s),
            DashboardEvent::Pipelines(s) => self.pipelines.apply(registry, s),
            DashboardEvent::ReleaseOverview(s) => self.release_overview.apply(registry, s),
            DashboardEvent::Approvals(s) => self.approvals.apply(registry, s),
            DashboardEvent::WorkItems(s) => self.work_items.apply(registry, s),
            DashboardEvent::TestPlan(s) => self.test_plan.apply(registry, s),
            DashboardEvent::ReleasePlan(s) => self.release_plan.apply(registry, s),
            DashboardEvent::PipelineRuns(s) => self.pipeline_runs.apply(registry, s),
            DashboardEvent::Environments(s) => self.environments.apply(registry, s),
            DashboardEvent::ReleaseWorkItems(s) => self.release_work_items.apply(registry, s),
            DashboardEvent::YamlBuilds(s) => self.yaml_builds.apply(registry, s),
        }
    }

    /// Applies every settlement already waiting, without blocking.
    pub fn try_drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Waits for the next settlement and applies it.
    pub async fn next_event(&mut self) -> Option<Applied> {
        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Applies settlements until no query is loading.
    pub async fn settle(&mut self) {
        while self.is_busy() {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.loading_classes().next().is_some()
    }

    /// Classes whose query currently awaits a response.
    pub fn loading_classes(&self) -> impl Iterator<Item = QueryClass> + '_ {
        [
            (self.projects.class(), self.projects.is_loading()),
            (self.releases.class(), self.releases.is_loading()),
            (self.yaml_pipelines.class(), self.yaml_pipelines.is_loading()),
            (self.user_approvals.class(), self.user_approvals.is_loading()),
            (self.yaml_approvals.class(), self.yaml_approvals.is_loading()),
            (self.pipelines.class(), self.pipelines.is_loading()),
            (self.release_overview.class(), self.release_overview.is_loading()),
            (self.approvals.class(), self.approvals.is_loading()),
            (self.work_items.class(), self.work_items.is_loading()),
            (self.test_plan.class(), self.test_plan.is_loading()),
            (self.release_plan.class(), self.release_plan.is_loading()),
            (self.pipeline_runs.class(), self.pipeline_runs.is_loading()),
            (self.environments.class(), self.environments.is_loading()),
            (self.release_work_items.class(), self.release_work_items.is_loading()),
            (self.yaml_builds.class(), self.yaml_builds.is_loading()),
        ]
        .into_iter()
        .filter_map(|(class, loading)| loading.then_some(class))
    }

    /// Cancels everything in flight and returns every query to idle.
    pub fn shutdown(&mut self) {
        let registry = &mut self.registry;
        self.projects.reset(registry);
        self.releases.reset(registry);
        self.yaml_pipelines.reset(registry);
        self.user_approvals.reset(registry);
        self.yaml_approvals.reset(registry);
        self.pipelines.reset(registry);
        self.release_overview.reset(registry);
        self.approvals.reset(registry);
        self.work_items.reset(registry);
        self.test_plan.reset(registry);
        self.release_plan.reset(registry);
        self.pipeline_runs.reset(registry);
        self.environments.reset(registry);
        self.release_work_items.reset(registry);
        self.yaml_builds.reset(registry);
        registry.cancel_all();
    }

    pub fn projects(&self) -> &ScopedQuery<(), Vec<String>> {
        &self.projects
    }

    pub fn releases(&self) -> &ScopedQuery<String, Vec<Release>> {
        &self.releases
    }

    pub fn yaml_pipelines(&self) -> &ScopedQuery<String, Vec<Pipeline>> {
        &self.yaml_pipelines
    }

    pub fn user_approvals(&self) -> &ScopedQuery<IdentityScope, Vec<Approval>> {
        &self.user_approvals
    }

    pub fn yaml_approvals(&self) -> &ScopedQuery<IdentityScope, Vec<Approval>> {
        &self.yaml_approvals
    }

    pub fn pipelines(&self) -> &ScopedQuery<WindowScope, Vec<Pipeline>> {
        &self.pipelines
    }

    pub fn release_overview(&self) -> &ScopedQuery<WindowScope, ReleaseOverview> {
        &self.release_overview
    }

    pub fn approvals(&self) -> &ScopedQuery<WindowScope, Vec<Approval>> {
        &self.approvals
    }

    pub fn work_items(&self) -> &ScopedQuery<IterationScope, Vec<WorkItem>> {
        &self.work_items
    }

    pub fn test_plan(&self) -> &ScopedQuery<SprintScope, Option<TestPlanResult>> {
        &self.test_plan
    }

    pub fn release_plan(&self) -> &ScopedQuery<SprintScope, Vec<ReleasePlanItem>> {
        &self.release_plan
    }

    pub fn pipeline_runs(&self) -> &ScopedQuery<PipelineWindowScope, Vec<ReleaseRun>> {
        &self.pipeline_runs
    }

    pub fn environments(&self) -> &ScopedQuery<PipelineScope, EnvironmentBoard> {
        &self.environments
    }

    pub fn release_work_items(&self) -> &ScopedQuery<RunScope, Vec<WorkItem>> {
        &self.release_work_items
    }

    pub fn yaml_builds(&self) -> &ScopedQuery<YamlBuildScope, Vec<YamlBuild>> {
        &self.yaml_builds
    }

    /// Facet-filtered view of the iteration work items.
    pub fn work_item_board(&self) -> WorkItemBoard {
        let all = self.work_items.data().map(Vec::as_slice).unwrap_or_default();
        let visible = self.work_item_filter.apply(all);
        WorkItemBoard {
            states: state_histogram(all, &visible).chart_data(),
            assignee_options: self.work_item_filter.options(ASSIGNEE_FACET, all),
            state_options: self.work_item_filter.options(STATE_FACET, all),
            visible: visible.into_iter().cloned().collect(),
            filtered: self.work_item_filter.is_active(),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            selection: self.selection.clone(),
            projects: ViewSnapshot::of(&self.projects),
            releases: ViewSnapshot::of(&self.releases),
            yaml_pipelines: ViewSnapshot::of(&self.yaml_pipelines),
            user_approvals: ViewSnapshot::of(&self.user_approvals),
            yaml_approvals: ViewSnapshot::of(&self.yaml_approvals),
            pipelines: ViewSnapshot::of(&self.pipelines),
            release_overview: ViewSnapshot::of(&self.release_overview),
            approvals: ViewSnapshot::of(&self.approvals),
            work_items: ViewSnapshot::of(&self.work_items),
            work_item_board: self.work_item_board(),
            test_plan: ViewSnapshot::of(&self.test_plan),
            release_plan: ViewSnapshot::of(&self.release_plan),
            pipeline_runs: ViewSnapshot::of(&self.pipeline_runs),
            environments: ViewSnapshot::of(&self.environments),
            release_work_items: ViewSnapshot::of(&self.release_work_items),
            yaml_builds: ViewSnapshot::of(&self.yaml_builds),
        }
    }
}

impl<S: DashboardSource> Drop for Dashboard<S> {
    fn drop(&mut self) {
        self.registry.cancel_all();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemBoard {
    pub visible: Vec<WorkItem>,
    pub states: Vec<(String, usize)>,
    pub assignee_options: Vec<String>,
    pub state_options: Vec<String>,
    /// Whether any facet narrows the visible items.
    pub filtered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot<T> {
    pub status: ViewStatus,
    pub data: Option<T>,
}

impl<T: QueryData + Clone + Send + 'static> ViewSnapshot<T> {
    fn of<K: Clone + PartialEq + Send + 'static>(query: &ScopedQuery<K, T>) -> Self {
        Self {
            status: query.view(),
            data: query.data().cloned(),
        }
    }
}

/// Serializable picture of every view at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub selection: Selection,
    pub projects: ViewSnapshot<Vec<String>>,
    pub releases: ViewSnapshot<Vec<Release>>,
    pub yaml_pipelines: ViewSnapshot<Vec<Pipeline>>,
    pub user_approvals: ViewSnapshot<Vec<Approval>>,
    pub yaml_approvals: ViewSnapshot<Vec<Approval>>,
    pub pipelines: ViewSnapshot<Vec<Pipeline>>,
    pub release_overview: ViewSnapshot<ReleaseOverview>,
    pub approvals: ViewSnapshot<Vec<Approval>>,
    pub work_items: ViewSnapshot<Vec<WorkItem>>,
    pub work_item_board: WorkItemBoard,
    pub test_plan: ViewSnapshot<Option<TestPlanResult>>,
    pub release_plan: ViewSnapshot<Vec<ReleasePlanItem>>,
    pub pipeline_runs: ViewSnapshot<Vec<ReleaseRun>>,
    pub environments: ViewSnapshot<EnvironmentBoard>,
    pub release_work_items: ViewSnapshot<Vec<WorkItem>>,
    pub yaml_builds: ViewSnapshot<Vec<YamlBuild>>,
}
