use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use deploylens::merge::{classify_status, StatusClass};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_cell(status: &str) -> Cell {
    let cell = Cell::new(status);
    match classify_status(status) {
        StatusClass::Positive => cell.fg(TableColor::Green),
        StatusClass::Negative => cell.fg(TableColor::Red),
        StatusClass::Neutral => cell.fg(TableColor::Yellow),
    }
}

pub fn optional_cell(value: Option<&str>) -> Cell {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(value) => Cell::new(value),
        None => Cell::new("N/A").fg(TableColor::DarkGrey),
    }
}
