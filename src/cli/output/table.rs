//! Table output formatting for CLI commands
//!
//! Renders graph statistics and single records using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::Record;
use crate::services::GraphStats;

/// Longest value shown in a record table cell.
const MAX_VALUE_WIDTH: usize = 60;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per entity: record count and link totals, then one row per
    /// id map.
    pub fn format_stats(&self, stats: &GraphStats) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            header("Entity"),
            header("Records"),
            header("Links"),
        ]);

        for entity in &stats.entities {
            let links = if entity.links.is_empty() {
                "-".to_string()
            } else {
                entity
                    .links
                    .iter()
                    .map(|(name, count)| format!("{name}: {count}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            table.add_row(vec![
                self.accent(Cell::new(&entity.entity)),
                Cell::new(entity.records),
                Cell::new(links),
            ]);
        }

        let mut out = table.to_string();
        if !stats.id_maps.is_empty() {
            let mut maps = self.create_base_table();
            maps.set_header(vec![header("Id map"), header("Entries")]);
            for (name, entries) in &stats.id_maps {
                maps.add_row(vec![self.accent(Cell::new(name)), Cell::new(entries)]);
            }
            out.push('\n');
            out.push_str(&maps.to_string());
        }
        out
    }

    /// Column/value rows of a record, followed by its link container sizes.
    pub fn format_record(&self, record: &Record) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![header("Column"), header("Value")]);

        for (column, value) in record.values() {
            let cell = Cell::new(truncate(&value.to_string(), MAX_VALUE_WIDTH));
            let cell = if self.use_colors && value.is_null() {
                cell.fg(Color::DarkGrey)
            } else {
                cell
            };
            table.add_row(vec![Cell::new(column), cell]);
        }
        for name in record.link_names() {
            table.add_row(vec![
                self.accent(Cell::new(&name)),
                Cell::new(format!("{} linked", record.link_count(&name))),
            ]);
        }

        table.to_string()
    }

    fn accent(&self, cell: Cell) -> Cell {
        if self.use_colors {
            cell.fg(Color::Cyan)
        } else {
            cell
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(title: &str) -> Cell {
    Cell::new(title).add_attribute(Attribute::Bold)
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}
