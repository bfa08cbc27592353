use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::pipeline::JobList;
use crate::reconcile::ReconcileReport;

/// Table and cell creation helpers
fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn count_cell(count: usize, bad: bool) -> Cell {
    match (count, bad) {
        (0, _) => Cell::new(count),
        (_, true) => Cell::new(count).fg(TableColor::Red),
        (_, false) => Cell::new(count).fg(TableColor::Green),
    }
}

pub fn render_job_list(list: &JobList) -> String {
    let mut table = create_table();
    table.set_header(cyan_header(&["Job", "Name", "Multi-branch"]));

    for job in &list.jobs {
        let multi_branch = if job.is_multi_branch_parent() {
            Cell::new("parent").fg(TableColor::Yellow)
        } else {
            Cell::new("-")
        };
        table.add_row(vec![
            Cell::new(&job.job_ci_id),
            Cell::new(job.name.as_deref().unwrap_or("-")),
            multi_branch,
        ]);
    }

    table.to_string()
}

pub fn render_report(report: &ReconcileReport) -> String {
    let mut summary = create_table();
    summary.set_header(cyan_header(&[
        "Phase",
        "Projects",
        "Deleted",
        "Already gone",
        "Created",
        "Failures",
    ]));
    summary.add_row(vec![
        Cell::new(report.phase),
        Cell::new(report.projects),
        count_cell(report.hooks_deleted, false),
        Cell::new(report.hooks_already_gone),
        count_cell(report.hooks_created, false),
        count_cell(report.failures.len(), true),
    ]);

    let mut output = summary.to_string();

    if let Some(error) = &report.aborted {
        output.push_str(&format!("\nPass skipped: {error}"));
    }

    if !report.failures.is_empty() {
        let mut failures = create_table();
        failures.set_header(cyan_header(&["Project", "Error"]));
        for failure in &report.failures {
            failures.add_row(vec![
                Cell::new(&failure.project),
                Cell::new(failure.error.to_string()).fg(TableColor::Red),
            ]);
        }
        output.push('\n');
        output.push_str(&failures.to_string());
    }

    output
}
