use std::path::Path;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use cohort_model::{
    CatalogEntry, DefinitionSet, FileValidationReport, Submission, SubmissionFile,
    SubmissionStatus, TaskState,
};

/// Catalog entries shown per result.
const EXAMPLE_LIMIT: usize = 3;

pub fn print_check(path: &Path, report: &FileValidationReport) {
    println!("File: {}", path.display());
    println!("Type: {}", report.file_type);
    println!(
        "Rows: {} (loaded {}{})",
        report.row_count,
        report.strategy,
        if report.fell_back { " after fallback" } else { "" }
    );
    print_results(report);
    print_stats(report);
}

fn print_results(report: &FileValidationReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Validator"),
        header_cell("Valid"),
        header_cell("Invalid"),
        header_cell("%"),
        header_cell("Message"),
        header_cell("Examples"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for column in &report.columns {
        for result in &column.results {
            table.add_row(vec![
                Cell::new(&result.column)
                    .fg(Color::Blue)
                    .add_attribute(Attribute::Bold),
                Cell::new(result.validator),
                valid_cell(result.valid),
                count_cell(result.summary.invalid_count, Color::Red),
                dim_or(result.summary.invalid_percent, result.valid),
                Cell::new(&result.message),
                example_cell(&result.invalid_catalog, result.catalog_truncated),
            ]);
        }
    }
    println!("{table}");
}

fn print_stats(report: &FileValidationReport) {
    if report.stats.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Type"),
        header_cell("Nulls"),
        header_cell("Null %"),
        header_cell("Unique"),
        header_cell("Unique %"),
        header_cell("Cardinality"),
    ]);
    apply_table_style(&mut table);
    for index in 2..=5 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for stats in &report.stats {
        let column_type = match stats.column_type {
            Some(column_type) => Cell::new(column_type),
            None => dim_cell("undeclared"),
        };
        table.add_row(vec![
            Cell::new(&stats.column),
            column_type,
            Cell::new(stats.null_count),
            Cell::new(stats.null_percent),
            Cell::new(stats.unique_count),
            Cell::new(stats.unique_percent),
            Cell::new(stats.cardinality),
        ]);
    }
    println!();
    println!("Statistics:");
    println!("{table}");
}

pub fn print_submission(submission: &Submission) {
    println!("Submission: {} ({})", submission.key, submission.id);
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("File type"),
        header_cell("Version"),
        header_cell("State"),
        header_cell("Rows"),
        header_cell("Invalid columns"),
        header_cell("Unknown IDs"),
        header_cell("Acknowledged"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    align_column(&mut table, 5, CellAlignment::Right);
    align_column(&mut table, 6, CellAlignment::Center);
    for file in &submission.files {
        let (rows, invalid, unknown) = match &file.report {
            Some(report) => (
                Cell::new(report.row_count),
                count_cell(
                    report.columns.iter().filter(|column| !column.is_valid()).count() as u64,
                    Color::Red,
                ),
                count_cell(
                    report.warnings.iter().map(|w| w.unknown_count).sum(),
                    Color::Yellow,
                ),
            ),
            None => (dim_cell("-"), dim_cell("-"), dim_cell("-")),
        };
        table.add_row(vec![
            Cell::new(&file.file_type)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(file.version),
            state_cell(file.state),
            rows,
            invalid,
            unknown,
            valid_cell(file.acknowledged),
        ]);
    }
    println!("{table}");
    print_file_notes(&submission.files);
    println!("Status: {}", status_label(submission.status));
}

fn print_file_notes(files: &[SubmissionFile]) {
    for file in files {
        if let Some(failure) = &file.failure {
            eprintln!("- {} v{} failed: {failure}", file.file_type, file.version);
        }
        if let Some(report) = &file.report {
            for warning in &report.warnings {
                println!("- {} v{}: {}", file.file_type, file.version, warning.message);
            }
        }
    }
}

pub fn print_definitions(definitions: &DefinitionSet) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("File type"),
        header_cell("ID column"),
        header_cell("Columns"),
    ]);
    apply_table_style(&mut table);
    for definition in definitions.iter() {
        let columns = definition
            .columns
            .iter()
            .map(|column| {
                let marker = if column.required { "*" } else { "" };
                format!("{}{marker} ({})", column.name, column.column_type)
            })
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(&definition.file_type)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            match &definition.id_column {
                Some(column) => Cell::new(column),
                None => dim_cell("default"),
            },
            Cell::new(columns),
        ]);
    }
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn valid_cell(valid: bool) -> Cell {
    if valid {
        Cell::new("✓")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new("✗").fg(Color::Red).add_attribute(Attribute::Bold)
    }
}

fn state_cell(state: TaskState) -> Cell {
    let color = match state {
        TaskState::Completed => Color::Green,
        TaskState::Failed => Color::Red,
        TaskState::Superseded => Color::DarkGrey,
        TaskState::Queued | TaskState::Running => Color::Yellow,
    };
    Cell::new(state).fg(color)
}

fn status_label(status: SubmissionStatus) -> String {
    match status {
        SubmissionStatus::Completed => format!("{status} (all files acknowledged)"),
        SubmissionStatus::InProgress => format!("{status} (acknowledgment pending)"),
        SubmissionStatus::Draft => status.to_string(),
    }
}

fn count_cell(count: u64, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn dim_or(value: f64, dim: bool) -> Cell {
    if dim {
        dim_cell(value)
    } else {
        Cell::new(value)
    }
}

fn example_cell(catalog: &[CatalogEntry], truncated: bool) -> Cell {
    if catalog.is_empty() {
        return dim_cell("-");
    }
    let mut examples: Vec<String> = catalog
        .iter()
        .take(EXAMPLE_LIMIT)
        .map(|entry| match &entry.value {
            Some(value) => format!("'{value}' ({})", entry.count),
            None => format!("null ({})", entry.count),
        })
        .collect();
    if truncated || catalog.len() > EXAMPLE_LIMIT {
        examples.push("…".to_string());
    }
    Cell::new(examples.join(", "))
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
