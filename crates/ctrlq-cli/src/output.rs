//! Terminal output formatting and file sinks.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::path::Path;

use ctrlq_graph::{TaskTable, TreeNode};
use ctrlq_import::SheetRows;

/// Print a tree with box-drawing glyphs.
pub fn print_tree(nodes: &[TreeNode]) {
    for node in nodes {
        println!("{}", node.label.bold());
        print_children(&node.children, "");
    }
}

fn print_children(children: &[TreeNode], prefix: &str) {
    for (index, child) in children.iter().enumerate() {
        let last = index + 1 == children.len();
        let connector = if last { "└─" } else { "├─" };
        let label = if child.label.starts_with("<circular") {
            child.label.yellow().to_string()
        } else {
            child.label.clone()
        };
        println!("{}{} {}", prefix.dimmed(), connector.dimmed(), label);
        let child_prefix = format!("{}{}  ", prefix, if last { " " } else { "│" });
        print_children(&child.children, &child_prefix);
    }
}

/// Print a table with content-sized columns.
pub fn print_table(table: &TaskTable) {
    if table.rows.is_empty() {
        println!("{}", "No tasks found.".dimmed());
        return;
    }

    let widths: Vec<usize> = table
        .header
        .iter()
        .enumerate()
        .map(|(column, header)| {
            table
                .rows
                .iter()
                .map(|row| row.get(column).map(|c| c.len()).unwrap_or(0))
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
                .min(40)
        })
        .collect();

    let header_line: Vec<String> = table
        .header
        .iter()
        .zip(&widths)
        .map(|(cell, width)| format!("{:<width$}", truncate(cell, *width)))
        .collect();
    println!("{}", header_line.join("  ").bold());
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + widths.len() * 2).dimmed());

    for row in &table.rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", truncate(cell, *width)))
            .collect();
        println!("{}", line.join("  "));
    }
}

/// Truncate a cell for display.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else if max > 3 {
        format!("{}...", &s[..max - 3])
    } else {
        s[..max].to_string()
    }
}

/// Ask before clobbering an existing file, unless forced.
pub fn confirm_overwrite(path: &Path, force: bool) -> Result<bool> {
    if force || !path.exists() {
        return Ok(true);
    }
    let answer = dialoguer::Confirm::new()
        .with_prompt(format!("File '{}' exists. Overwrite?", path.display()))
        .default(false)
        .interact()
        .context("overwrite prompt failed")?;
    Ok(answer)
}

/// Write header + rows as CSV.
pub fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create '{}'", path.display()))?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write header + rows as a single-sheet xlsx workbook.
pub fn write_xlsx(path: &Path, sheet_name: &str, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| anyhow!("workbook has no sheet"))?;
    sheet.set_name(sheet_name);

    for (column, cell) in header.iter().enumerate() {
        sheet
            .get_cell_mut((column as u32 + 1, 1))
            .set_value(cell.clone());
    }
    for (row_index, row) in rows.iter().enumerate() {
        for (column, cell) in row.iter().enumerate() {
            sheet
                .get_cell_mut((column as u32 + 1, row_index as u32 + 2))
                .set_value(cell.clone());
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(())
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(())
}

/// Cells of an exported sheet, for the file sinks.
pub fn sheet_cells(sheet: &SheetRows) -> Vec<Vec<String>> {
    sheet.rows.iter().map(|r| r.cells.clone()).collect()
}

/// Status glyphs matching the rest of the terminal output.
pub fn ok_glyph() -> colored::ColoredString {
    "✓".green().bold()
}

pub fn fail_glyph() -> colored::ColoredString {
    "✗".red().bold()
}

pub fn warn_glyph() -> colored::ColoredString {
    "⚠".yellow().bold()
}
