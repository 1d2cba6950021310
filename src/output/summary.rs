use std::fmt::Write;

use comfy_table::Cell;

use deploylens::aggregate::environment_histogram;
use deploylens::api::ReleaseOverview;
use deploylens::cascade::{DashboardSnapshot, ViewSnapshot, WorkItemBoard};
use deploylens::merge::EnvironmentBoard;
use deploylens::models::{
    Approval, Pipeline, Release, ReleasePlanItem, ReleaseRun, TestPlanResult, WorkItem, YamlBuild,
};
use deploylens::query::ViewStatus;

use super::styling::{bright, bright_red, bright_yellow, cyan, dim, status_text};
use super::tables::{create_cyan_header, create_table, optional_cell, status_cell};

const MAX_ROWS: usize = 25;

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

/// One-line affordance for every status except `Ready`, which renders data.
fn view_notice(status: &ViewStatus, what: &str) -> Option<String> {
    match status {
        ViewStatus::Ready(_) => None,
        ViewStatus::Idle => Some(format!("  {}\n", dim(format!("No selection for {what}")))),
        ViewStatus::Loading => Some(format!("  {}\n", bright_yellow(format!("Loading {what}...")))),
        ViewStatus::Empty => Some(format!("  {}\n", dim(format!("No {what} found.")))),
        ViewStatus::Failed(message) => Some(format!(
            "  {}\n",
            bright_red(format!("Failed to load {what}: {message}"))
        )),
    }
}

/// Renders the notice or, when ready, the data through `render`.
fn render_view<T>(
    output: &mut String,
    view: &ViewSnapshot<T>,
    what: &str,
    render: impl FnOnce(&mut String, &T),
) {
    if let Some(notice) = view_notice(&view.status, what) {
        output.push_str(&notice);
    } else if let Some(data) = &view.data {
        render(output, data);
    }
    output.push('\n');
}

fn more_rows_note(output: &mut String, total: usize) {
    if total > MAX_ROWS {
        let _ = writeln!(output, "  {}", dim(format!("... and {} more", total - MAX_ROWS)));
    }
}

fn pending_count(status: &ViewStatus) -> String {
    match status {
        ViewStatus::Ready(n) => n.to_string(),
        ViewStatus::Empty => "0".to_string(),
        ViewStatus::Loading => "...".to_string(),
        ViewStatus::Idle | ViewStatus::Failed(_) => "N/A".to_string(),
    }
}

fn release_label(release: &Release) -> String {
    match release.date_range() {
        Some((start, end)) => format!("{} ({} → {})", release.name, start, end),
        None => release.name.clone(),
    }
}

pub fn render_projects(view: &ViewSnapshot<Vec<String>>) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📁", "Projects");
    render_view(&mut output, view, "projects", |output, projects| {
        for project in projects {
            let _ = writeln!(output, "  {}", cyan(project));
        }
    });
    output
}

pub fn render_releases(project: &str, view: &ViewSnapshot<Vec<Release>>) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🏷️", &format!("Releases of {project}"));
    render_view(&mut output, view, "releases", |output, releases| {
        let mut table = create_table();
        table.set_header(create_cyan_header(&["ID", "Name", "Start", "Finish"]));
        for release in releases {
            table.add_row(vec![
                Cell::new(&release.id),
                Cell::new(&release.name),
                optional_cell(release.start_date.as_deref()),
                optional_cell(release.finish_date.as_deref()),
            ]);
        }
        let _ = writeln!(output, "{table}");
    });
    output
}

fn render_pipelines(output: &mut String, pipelines: &[Pipeline]) {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Definition", "Name", "Created", "URL"]));
    for pipeline in pipelines.iter().take(MAX_ROWS) {
        table.add_row(vec![
            optional_cell(pipeline.definition_id.as_deref()),
            Cell::new(&pipeline.name),
            optional_cell(pipeline.created_on.as_deref()),
            optional_cell(pipeline.pipeline_url.as_deref()),
        ]);
    }
    let _ = writeln!(output, "{table}");
    more_rows_note(output, pipelines.len());
}

fn render_runs(output: &mut String, runs: &[ReleaseRun]) {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Release", "Queued", "Environments"]));
    for run in runs.iter().take(MAX_ROWS) {
        let environments = run
            .environments
            .iter()
            .map(|env| format!("{}: {}", env.name, status_text(&env.status, env.class())))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(format!("{}\n#{}", run.release_name, run.release_id)),
            optional_cell(run.queued_on.as_deref()),
            Cell::new(environments),
        ]);
    }
    let _ = writeln!(output, "{table}");
    more_rows_note(output, runs.len());

    let histogram = environment_histogram(runs);
    if !histogram.is_empty() {
        let slices = histogram
            .chart_data()
            .iter()
            .map(|(label, count)| format!("{label} {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(output, "  {} {}", dim("Environments by outcome:"), slices);
    }
}

fn render_yaml_builds(output: &mut String, builds: &[YamlBuild]) {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Build", "Status", "Stages"]));
    for build in builds.iter().take(MAX_ROWS) {
        let stages = if build.stages.is_empty() {
            "-".to_string()
        } else {
            build
                .stages
                .iter()
                .map(|stage| status_text(&stage.name, stage.class()).to_string())
                .collect::<Vec<_>>()
                .join(" → ")
        };
        let name = match &build.id {
            Some(id) => format!("{}
#{id}", build.name),
            None => build.name.clone(),
        };
        table.add_row(vec![
            Cell::new(name),
            optional_cell(build.status.as_deref()),
            Cell::new(stages),
        ]);
    }
    let _ = writeln!(output, "{table}");
    more_rows_note(output, builds.len());
}

fn render_overview(output: &mut String, overview: &ReleaseOverview) {
    let _ = writeln!(
        output,
        "  {} {}   {} {}",
        dim("Deployments:"),
        bright_yellow(overview.summary.total),
        dim("Active:"),
        bright_yellow(overview.summary.active)
    );
    if !overview.failed_definitions.is_empty() {
        let _ = writeln!(
            output,
            "  {}",
            bright_red(format!(
                "Runs unavailable for definitions: {}",
                overview.failed_definitions.join(", ")
            ))
        );
    }
    render_runs(output, &overview.runs);
}

fn render_approvals(output: &mut String, approvals: &[Approval]) {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Pipeline", "Environment", "Approver", "Created"]));
    for approval in approvals.iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(&approval.pipeline_name),
            optional_cell(approval.environment_name.as_deref()),
            optional_cell(approval.approver.as_deref()),
            optional_cell(approval.created_on.as_deref()),
        ]);
    }
    let _ = writeln!(output, "{table}");
    more_rows_note(output, approvals.len());
}

fn render_work_item_table(output: &mut String, items: &[WorkItem]) {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["ID", "Title", "Assigned To", "State"]));
    for item in items.iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(item.id),
            Cell::new(&item.title),
            optional_cell(item.assigned_to.as_deref()),
            optional_cell(item.state.as_deref()),
        ]);
    }
    let _ = writeln!(output, "{table}");
    more_rows_note(output, items.len());
}

fn render_work_item_board(output: &mut String, board: &WorkItemBoard) {
    if board.visible.is_empty() {
        let _ = writeln!(output, "  {}", dim("No work items match the current filters."));
    } else {
        render_work_item_table(output, &board.visible);
    }
    let states = board
        .states
        .iter()
        .map(|(state, count)| format!("{state} {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    if !states.is_empty() {
        let _ = writeln!(output, "  {} {}", dim("By state:"), states);
    }
    if board.filtered {
        let _ = writeln!(output, "  {}", bright_yellow("Filters active"));
    }
    let _ = writeln!(
        output,
        "  {} {}",
        dim("Assignees:"),
        board.assignee_options.join(" | ")
    );
    let _ = writeln!(output, "  {} {}", dim("States:"), board.state_options.join(" | "));
}

fn render_test_plan(output: &mut String, result: &Option<TestPlanResult>) {
    let Some(result) = result else {
        return;
    };
    let _ = writeln!(output, "  {} {}", dim("Total tests:"), bright_yellow(result.total()));
    for (label, count) in result.chart_data() {
        let _ = writeln!(output, "  {label:<16} {count}");
    }
    if let Some(url) = &result.url {
        let _ = writeln!(output, "  {}", dim(url));
    }
}

fn render_release_plan(output: &mut String, items: &[ReleasePlanItem]) {
    for item in items.iter().take(MAX_ROWS) {
        match &item.web_url {
            Some(url) => {
                let _ = writeln!(output, "  • {} {}", item.title, dim(url));
            }
            None => {
                let _ = writeln!(output, "  • {}", item.title);
            }
        }
    }
    more_rows_note(output, items.len());
}

fn render_environment_board(output: &mut String, board: &EnvironmentBoard) {
    if let Some(run) = &board.latest {
        let _ = writeln!(
            output,
            "  {} {} (#{})",
            dim("Latest release:"),
            cyan(&run.release_name),
            run.release_id
        );
    }
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Environment", "Status"]));
    for env in board.environments() {
        table.add_row(vec![Cell::new(&env.name), status_cell(&env.status)]);
    }
    let _ = writeln!(output, "{table}");
    if let Some(url) = &board.pipeline_url {
        let _ = writeln!(output, "  {}", dim(url));
    }
}

/// Renders every dashboard view for the current selection.
///
/// Views whose prerequisites are not selected are skipped; every other view
/// shows its data or an explicit loading, empty or error line.
pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let mut output = String::new();
    let selection = &snapshot.selection;

    add_section_header(&mut output, "📊", "Overview");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n",
        dim("Project:"),
        cyan(selection.project.as_deref().unwrap_or("N/A")),
        dim("Release:"),
        cyan(selection.release.as_ref().map_or_else(|| "N/A".to_string(), release_label)),
        dim("My pending approvals:"),
        bright_yellow(pending_count(&snapshot.user_approvals.status)),
    );

    if selection.release.is_none() {
        let _ = writeln!(output, "{}", bright_yellow("Select a release to see its views."));
        add_section_header(&mut output, "🧩", "YAML Pipelines");
        render_view(&mut output, &snapshot.yaml_pipelines, "YAML pipelines", |o, p| {
            render_pipelines(o, p);
        });
        return output;
    }

    add_section_header(&mut output, "🚀", "Release Runs");
    render_view(&mut output, &snapshot.release_overview, "release runs", render_overview);

    add_section_header(&mut output, "📋", "Pipelines");
    render_view(&mut output, &snapshot.pipelines, "pipelines", |o, p| render_pipelines(o, p));

    add_section_header(&mut output, "🧩", "YAML Pipelines");
    render_view(&mut output, &snapshot.yaml_pipelines, "YAML pipelines", |o, p| {
        render_pipelines(o, p);
    });

    if selection.yaml_pipeline.is_some() {
        add_section_header(&mut output, "🏗️", "YAML Pipeline Builds");
        render_view(&mut output, &snapshot.yaml_builds, "YAML pipeline builds", |o, b| {
            render_yaml_builds(o, b);
        });
    }

    add_section_header(&mut output, "📝", "Work Items");
    render_view(&mut output, &snapshot.work_items, "work items", |o, _| {
        render_work_item_board(o, &snapshot.work_item_board);
    });

    add_section_header(&mut output, "🧪", "Test Plan");
    render_view(&mut output, &snapshot.test_plan, "test plan results", render_test_plan);

    add_section_header(&mut output, "🗓️", "Release Plan");
    render_view(&mut output, &snapshot.release_plan, "release plan items", |o, i| {
        render_release_plan(o, i);
    });

    add_section_header(&mut output, "✋", "Pending Approvals");
    render_view(&mut output, &snapshot.approvals, "pending approvals", |o, a| {
        render_approvals(o, a);
    });

    if selection.pipeline.is_some() {
        add_section_header(&mut output, "🔁", "Pipeline Runs");
        render_view(&mut output, &snapshot.pipeline_runs, "pipeline runs", |o, r| {
            render_runs(o, r);
        });

        add_section_header(&mut output, "🌍", "Deployed Environments");
        render_view(&mut output, &snapshot.environments, "deployed environments", render_environment_board);
    }

    if let Some(release_id) = selection.release_run {
        add_section_header(&mut output, "🔗", &format!("Work Items of Release #{release_id}"));
        render_view(&mut output, &snapshot.release_work_items, "release work items", |o, i| {
            render_work_item_table(o, i);
        });
    }

    output
}

/// Pending approvals of the release window, or only those awaiting the
/// signed-in user when `mine` is set.
pub fn render_pending_approvals(snapshot: &DashboardSnapshot, mine: bool) -> String {
    let mut output = String::new();
    if mine {
        add_section_header(&mut output, "🔔", "Awaiting My Approval");
        render_view(&mut output, &snapshot.user_approvals, "approvals", |o, a| {
            render_approvals(o, a);
        });
        add_section_header(&mut output, "🧩", "YAML Approvals Awaiting Me");
        render_view(&mut output, &snapshot.yaml_approvals, "YAML approvals", |o, a| {
            render_approvals(o, a);
        });
    } else {
        add_section_header(&mut output, "✋", "Pending Approvals");
        render_view(&mut output, &snapshot.approvals, "pending approvals", |o, a| {
            render_approvals(o, a);
        });
    }
    if snapshot.user_approvals.status != ViewStatus::Idle && !mine {
        let _ = writeln!(
            output,
            "  {} {}",
            dim("Awaiting you:"),
            bright_yellow(pending_count(&snapshot.user_approvals.status))
        );
    }
    output
}
