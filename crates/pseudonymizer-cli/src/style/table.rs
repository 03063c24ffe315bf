//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use pseudonymizer::{DatabaseOutcome, EntryOutcome, RunReport};

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn colored(text: impl ToString, color: Color) -> Cell {
    if super::no_color() {
        Cell::new(text.to_string())
    } else {
        Cell::new(text.to_string()).fg(color)
    }
}

/// Creates the per-entry outcome table of a run.
pub fn report_table(report: &RunReport) -> Table {
    let mut table = styled_table();

    let header_cells: Vec<Cell> = ["Database", "Table", "Column", "Outcome", "Rows"]
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col)
                    .add_attribute(Attribute::Bold)
                    .fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header_cells);

    for database in &report.databases {
        match database.outcome {
            DatabaseOutcome::Completed => {}
            DatabaseOutcome::Unmatched => {
                table.add_row(vec![
                    Cell::new(&database.database),
                    Cell::new("-"),
                    Cell::new("-"),
                    colored("no matching datasource", Color::Yellow),
                    Cell::new("-"),
                ]);
                continue;
            }
            DatabaseOutcome::Ambiguous => {
                table.add_row(vec![
                    Cell::new(&database.database),
                    Cell::new("-"),
                    Cell::new("-"),
                    colored("several matching datasources", Color::Yellow),
                    Cell::new("-"),
                ]);
                continue;
            }
        }

        for entry in &database.entries {
            let (outcome, rows) = match &entry.outcome {
                EntryOutcome::Rewritten { scenario, rows } => {
                    (colored(scenario, Color::Green), rows.to_string())
                }
                EntryOutcome::TableMissing => {
                    (colored("table not found", Color::Yellow), "-".to_string())
                }
                EntryOutcome::Skipped { reason } => {
                    (colored(format!("skipped: {reason}"), Color::DarkGrey), "-".to_string())
                }
            };
            table.add_row(vec![
                Cell::new(&database.database),
                Cell::new(&entry.table),
                Cell::new(&entry.column),
                outcome,
                Cell::new(rows),
            ]);
        }
    }

    table
}

/// Prints the outcome table of a run.
pub fn print_report_table(report: &RunReport) {
    println!("{}", report_table(report));
}

/// Creates a key-value info table (two columns: key and value).
pub fn info_table(entries: &[(&str, &str)]) -> Table {
    let mut table = styled_table();

    for (key, value) in entries {
        table.add_row(vec![colored(key, Color::DarkGrey), Cell::new(value)]);
    }

    table
}

/// Prints a key-value info table.
pub fn print_info_table(entries: &[(&str, &str)]) {
    println!("{}", info_table(entries));
}
