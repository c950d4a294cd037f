//! Import tasks, triggers, and optionally apps from a source file.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ctrlq_import::{
    parse_app_sheet, parse_task_sheet, read_delimited, read_spreadsheet, ColRefBy, DryRunSink,
    ImportOptions, ImportSummary, Importer, ParserOptions, QrsSink, Resolver, UpdateMode,
};

use super::ConnectionArgs;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceType {
    Excel,
    Csv,
}

#[derive(Args)]
pub struct TaskImportArgs {
    /// Source file type
    #[arg(long, value_enum, default_value_t = SourceType::Excel)]
    pub file_type: SourceType,

    /// Source file
    #[arg(long)]
    pub file_name: PathBuf,

    /// Sheet with task definitions (excel only)
    #[arg(long)]
    pub sheet_name: Option<String>,

    /// Also upload the apps listed on the app sheet
    #[arg(long)]
    pub import_app: bool,

    /// Sheet with app definitions (excel only)
    #[arg(long)]
    pub import_app_sheet_name: Option<String>,

    /// Address columns by header name or by position
    #[arg(long, default_value = "name")]
    pub col_ref_by: String,

    /// Import only tasks with Task counter <= N (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub limit_import_count: u32,

    /// Pause between app uploads, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub sleep_app_upload: u64,

    /// Import mode; only 'create' is supported
    #[arg(long, default_value = "create")]
    pub update_mode: String,

    /// Resolve and validate everything, but post nothing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: TaskImportArgs, connection: &ConnectionArgs) -> Result<()> {
    // Anything but create-mode fails before any network I/O.
    let update_mode: UpdateMode = args.update_mode.parse()?;
    let col_ref_by: ColRefBy = args
        .col_ref_by
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid --col-ref-by")?;

    let parser_options = ParserOptions {
        col_ref_by,
        limit_import_count: args.limit_import_count,
    };

    let task_sheet = match args.file_type {
        SourceType::Excel => {
            let sheet_name = args
                .sheet_name
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--sheet-name is required for excel sources"))?;
            read_spreadsheet(&args.file_name, sheet_name)?
        }
        SourceType::Csv => read_delimited(&args.file_name, b',')?,
    };
    let tasks = parse_task_sheet(&task_sheet, &parser_options)?;

    let apps = if args.import_app {
        if args.file_type != SourceType::Excel {
            bail!("--import-app needs an excel source with an app sheet");
        }
        let sheet_name = args.import_app_sheet_name.as_deref().ok_or_else(|| {
            anyhow::anyhow!("--import-app-sheet-name is required with --import-app")
        })?;
        let app_sheet = read_spreadsheet(&args.file_name, sheet_name)?;
        parse_app_sheet(&app_sheet, &parser_options)?
    } else {
        vec![]
    };

    println!(
        "Importing {} task(s){}{}",
        tasks.len(),
        if apps.is_empty() {
            String::new()
        } else {
            format!(" and {} app(s)", apps.len())
        },
        if args.dry_run { " (dry run)".dimmed().to_string() } else { String::new() }
    );

    let qrs = connection.qrs_client()?;
    let graph = super::load_task_graph(&qrs).await?;
    let resolver = Resolver::new(&qrs, &graph);

    let options = ImportOptions {
        update_mode,
        dry_run: args.dry_run,
        sleep_app_upload: Duration::from_millis(args.sleep_app_upload),
    };

    // Ctrl-C aborts remaining work items; completed ones stay.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let progress = ProgressBar::new_spinner().with_message("importing");
    progress.enable_steady_tick(Duration::from_millis(120));

    let qrs_sink;
    let dry_run_sink;
    let sink: &dyn ctrlq_import::CreateSink = if args.dry_run {
        dry_run_sink = DryRunSink::default();
        &dry_run_sink
    } else {
        qrs_sink = QrsSink::new(qrs.clone());
        &qrs_sink
    };

    let importer = Importer::new(sink, resolver, options).with_cancellation(cancel);
    let summary = importer.run(&apps, &tasks).await;
    progress.finish_and_clear();

    print_summary(&summary);
    if !summary.is_success() {
        bail!("import finished with errors");
    }

    // Graph-integrity findings on the post-import population are warnings,
    // not failures.
    if !args.dry_run {
        let graph = super::load_task_graph(&qrs).await?;
        for pair in ctrlq_graph::find_circular_chains(&graph) {
            println!(
                "{} Circular task chain between {} and {}",
                output::warn_glyph(),
                task_name(&graph, pair.from).cyan(),
                task_name(&graph, pair.to).cyan()
            );
        }
        for duplicate in ctrlq_graph::find_duplicate_edges(&graph) {
            println!(
                "{} {} duplicate triggers from {} to {} ({})",
                output::warn_glyph(),
                duplicate.count,
                task_name(&graph, duplicate.upstream).cyan(),
                task_name(&graph, duplicate.downstream).cyan(),
                duplicate.state.as_str()
            );
        }
    }
    Ok(())
}

fn task_name(graph: &ctrlq_graph::TaskGraph, id: uuid::Uuid) -> String {
    graph
        .task(id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn print_summary(summary: &ImportSummary) {
    for app in &summary.apps {
        match &app.result {
            Ok(id) => println!(
                "{} App {} '{}' uploaded ({})",
                output::ok_glyph(),
                app.app_counter,
                app.name.cyan(),
                id.to_string().dimmed()
            ),
            Err(error) => println!(
                "{} App {} '{}': {}",
                output::fail_glyph(),
                app.app_counter,
                app.name.cyan(),
                error
            ),
        }
    }
    for task in &summary.tasks {
        match &task.result {
            Ok(id) => println!(
                "{} Task {} '{}' created ({})",
                output::ok_glyph(),
                task.task_counter,
                task.name.cyan(),
                id.to_string().dimmed()
            ),
            Err(error) => println!(
                "{} Task {} '{}': {}",
                output::fail_glyph(),
                task.task_counter,
                task.name.cyan(),
                error
            ),
        }
    }
    for event in &summary.events {
        match &event.result {
            Ok(id) => println!(
                "{} Trigger '{}' on task {} created ({})",
                output::ok_glyph(),
                event.name.cyan(),
                event.task_counter,
                id.to_string().dimmed()
            ),
            Err(error) => println!(
                "{} Trigger '{}' on task {}: {}",
                output::fail_glyph(),
                event.name.cyan(),
                event.task_counter,
                error
            ),
        }
    }
    if summary.cancelled {
        println!("{} Import cancelled; completed items were kept.", output::warn_glyph());
    }

    println!(
        "\n{} app(s), {} task(s), {} trigger(s) created",
        summary.apps.iter().filter(|a| a.result.is_ok()).count(),
        summary.created_tasks(),
        summary.created_events()
    );
}
