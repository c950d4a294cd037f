//! Read the task graph and render it as a tree or table.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

use ctrlq_core::TaskFilter;
use ctrlq_graph::{
    build_task_table, build_task_tree, find_circular_chains, find_duplicate_edges, TableDetails,
    TaskGraph, TreeDetails,
};
use ctrlq_import::export_task_rows;

use super::ConnectionArgs;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Tree,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputDest {
    Screen,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFormat {
    Excel,
    Csv,
    Json,
}

#[derive(Args)]
pub struct TaskGetArgs {
    /// Output shape
    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub output_format: OutputFormat,

    /// Where output goes
    #[arg(long, value_enum, default_value_t = OutputDest::Screen)]
    pub output_dest: OutputDest,

    /// File format for --output-dest file. Excel and CSV table exports use
    /// the import grammar, so they can be fed back into task-import.
    #[arg(long, value_enum, default_value_t = FileFormat::Excel)]
    pub output_file_format: FileFormat,

    /// Output file name
    #[arg(long)]
    pub output_file_name: Option<PathBuf>,

    /// Overwrite an existing output file without asking
    #[arg(long)]
    pub output_file_overwrite: bool,

    /// Restrict table output to these task GUIDs
    #[arg(long = "task-id", num_args(1..))]
    pub task_id: Vec<String>,

    /// Restrict table output to tasks with any of these tags
    #[arg(long = "task-tag", num_args(1..))]
    pub task_tag: Vec<String>,

    /// Column blocks for table output
    #[arg(long = "table-details", num_args(1..))]
    pub table_details: Vec<String>,

    /// Per-node decorations for tree output
    #[arg(long = "tree-details", num_args(1..))]
    pub tree_details: Vec<String>,
}

pub async fn execute(args: TaskGetArgs, connection: &ConnectionArgs) -> Result<()> {
    let qrs = connection.qrs_client()?;
    let graph = super::load_task_graph(&qrs).await?;

    report_integrity(&graph);

    match args.output_format {
        OutputFormat::Tree => output_tree(&args, &graph),
        OutputFormat::Table => output_table(&args, &graph),
    }
}

/// Cycles, duplicate edges, and dangling rule references are warnings; the
/// command still succeeds.
fn report_integrity(graph: &TaskGraph) {
    for pair in find_circular_chains(graph) {
        println!(
            "{} Circular task chain between {} and {}",
            output::warn_glyph(),
            task_label(graph, pair.from).cyan(),
            task_label(graph, pair.to).cyan()
        );
    }
    for duplicate in find_duplicate_edges(graph) {
        println!(
            "{} {} duplicate triggers from {} to {} ({})",
            output::warn_glyph(),
            duplicate.count,
            task_label(graph, duplicate.upstream).cyan(),
            task_label(graph, duplicate.downstream).cyan(),
            duplicate.state.as_str()
        );
    }
    for id in graph.unresolved_refs() {
        println!(
            "{} Trigger rule references unknown task {}",
            output::warn_glyph(),
            id.to_string().dimmed()
        );
    }
}

fn task_label(graph: &TaskGraph, id: Uuid) -> String {
    graph
        .task(id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn output_tree(args: &TaskGetArgs, graph: &TaskGraph) -> Result<()> {
    let details = tree_details(&args.tree_details)?;
    let tree = build_task_tree(graph, &details);

    match args.output_dest {
        OutputDest::Screen => {
            output::print_tree(&tree);
            Ok(())
        }
        OutputDest::File => {
            let path = output_path(args)?;
            if !output::confirm_overwrite(&path, args.output_file_overwrite)? {
                println!("{} Aborted, file left untouched.", output::warn_glyph());
                return Ok(());
            }
            match args.output_file_format {
                FileFormat::Json => output::write_json(&path, &tree)?,
                _ => bail!("tree output supports only the json file format"),
            }
            println!("{} Wrote task tree to {}", output::ok_glyph(), path.display());
            Ok(())
        }
    }
}

fn output_table(args: &TaskGetArgs, graph: &TaskGraph) -> Result<()> {
    let filter = task_filter(args)?;

    match args.output_dest {
        OutputDest::Screen => {
            let details = table_details(&args.table_details)?;
            let table = build_task_table(graph, &filter, &details);
            output::print_table(&table);
            Ok(())
        }
        OutputDest::File => {
            let path = output_path(args)?;
            if !output::confirm_overwrite(&path, args.output_file_overwrite)? {
                println!("{} Aborted, file left untouched.", output::warn_glyph());
                return Ok(());
            }
            match args.output_file_format {
                FileFormat::Json => {
                    let details = table_details(&args.table_details)?;
                    let table = build_task_table(graph, &filter, &details);
                    output::write_json(&path, &table)?;
                }
                FileFormat::Csv => {
                    let sheet = export_task_rows(graph);
                    output::write_csv(&path, &sheet.header, &output::sheet_cells(&sheet))?;
                }
                FileFormat::Excel => {
                    let sheet = export_task_rows(graph);
                    output::write_xlsx(
                        &path,
                        "Task import",
                        &sheet.header,
                        &output::sheet_cells(&sheet),
                    )?;
                }
            }
            println!(
                "{} Wrote {} tasks to {}",
                output::ok_glyph(),
                graph.task_count(),
                path.display()
            );
            Ok(())
        }
    }
}

fn output_path(args: &TaskGetArgs) -> Result<PathBuf> {
    args.output_file_name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--output-file-name is required with --output-dest file"))
}

fn task_filter(args: &TaskGetArgs) -> Result<TaskFilter> {
    let mut filter = TaskFilter::default();
    for id in &args.task_id {
        let parsed = Uuid::parse_str(id)
            .map_err(|_| anyhow::anyhow!("'{}' is not a valid task GUID", id))?;
        filter.task_ids.push(parsed);
    }
    filter.task_tags = args.task_tag.clone();
    Ok(filter)
}

fn table_details(selected: &[String]) -> Result<Vec<TableDetails>> {
    if selected.is_empty() {
        return Ok(TableDetails::ALL.to_vec());
    }
    selected
        .iter()
        .map(|block| block.parse::<TableDetails>().map_err(anyhow::Error::msg))
        .collect()
}

fn tree_details(selected: &[String]) -> Result<TreeDetails> {
    if selected.is_empty() {
        return Ok(TreeDetails::default());
    }
    let mut details = TreeDetails::default();
    for item in selected {
        match item.trim().to_lowercase().as_str() {
            "taskid" => details.task_id = true,
            "laststatus" => details.last_status = true,
            "laststarttime" => details.last_start = true,
            "laststoptime" => details.last_stop = true,
            "nextstarttime" => details.next_start = true,
            "appname" => details.app_name = true,
            "all" => details = TreeDetails::all(),
            other => bail!("unknown tree detail '{}'", other),
        }
    }
    Ok(details)
}
