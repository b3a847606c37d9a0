use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use taskdown_core::index::{
    build_index, check_index, index_path, read_index, write_index, BuildOutcome, Warning,
};
use taskdown_core::lint::lint_files;
use taskdown_core::query::{
    compile_filter_groups, group_tasks, inject_default_status, parse_query_to_filter_groups,
    parse_sort_specs, sort_tasks, SortKey, StatusDefault,
};
use taskdown_core::stats::collect_stats;
use taskdown_core::task::Task;
use taskdown_core::task_ops::{set_completed_in_file, today_stamp, upsert_metadata_in_file};
use taskdown_core::vault::{list_markdown_files, resolve_vault, VaultResolution};

mod render;

#[derive(Parser)]
#[command(name = "taskdown", version, about = "Query and maintain markdown task files")]
struct Cli {
    /// Vault root; defaults to the current directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks matching a query
    List {
        /// Query terms, e.g. `project:work (bucket:today | overdue:true)`
        query: Vec<String>,
        /// Status default for groups that do not constrain status
        #[arg(long, value_parser = ["open", "done", "all"])]
        status: Option<String>,
        /// Sort fields, e.g. `due,priority:desc`
        #[arg(long)]
        sort: Option<String>,
        /// Group output by a field
        #[arg(long = "group-by")]
        group_by: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Search task text; every term must match
    Search {
        terms: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Aggregate counts for a query
    Stats {
        query: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Mark a task done by global id
    Done { id: String },
    /// Reopen a task by global id
    Undone { id: String },
    /// Rebuild and persist the index
    Index {
        /// Compare the persisted index against the sources instead of writing
        #[arg(long)]
        check: bool,
    },
    /// Report findings the indexer tolerates silently
    Lint {
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let _logger = init_logging();
    let cli = Cli::parse();
    let root = match cli.root.clone() {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    match cli.command {
        Command::List {
            query,
            status,
            sort,
            group_by,
            json,
        } => cmd_list(&root, &query, status.as_deref(), sort.as_deref(), group_by.as_deref(), json),
        Command::Search { terms, json } => cmd_search(&root, &terms, json),
        Command::Stats { query, json } => cmd_stats(&root, &query, json),
        Command::Done { id } => cmd_set_completed(&root, &id, true),
        Command::Undone { id } => cmd_set_completed(&root, &id, false),
        Command::Index { check } => cmd_index(&root, check),
        Command::Lint { json } => cmd_lint(&root, json),
        Command::Version => {
            println!("taskdown {}", taskdown_core::version());
            Ok(())
        }
    }
}

fn init_logging() -> Option<flexi_logger::LoggerHandle> {
    flexi_logger::Logger::try_with_env_or_str("warn")
        .ok()?
        .log_to_stderr()
        .start()
        .ok()
}

struct Workspace {
    resolution: VaultResolution,
    files: Vec<PathBuf>,
    outcome: BuildOutcome,
}

fn load_workspace(root: &Path) -> Result<Workspace> {
    let resolution = resolve_vault(root)?;
    let files = list_markdown_files(&resolution.vault_dir);
    log::debug!(
        "vault {} with {} markdown file(s)",
        resolution.vault_dir.display(),
        files.len()
    );
    let outcome = build_index(&files);
    report_warnings(&outcome.warnings);
    Ok(Workspace {
        resolution,
        files,
        outcome,
    })
}

fn report_warnings(warnings: &[Warning]) {
    for warning in warnings {
        match warning.line {
            Some(line) => eprintln!("warning: {}:{}: {}", warning.file, line, warning.message),
            None => eprintln!("warning: {}: {}", warning.file, warning.message),
        }
    }
}

fn parse_status(value: &str) -> Result<StatusDefault> {
    match value {
        "open" => Ok(StatusDefault::Open),
        "done" => Ok(StatusDefault::Done),
        "all" => Ok(StatusDefault::All),
        other => bail!("invalid status `{other}`; expected open, done or all"),
    }
}

/// Filter the index down to the tasks matching `groups`, in source order.
fn select<'a>(
    outcome: &'a BuildOutcome,
    mut groups: Vec<Vec<String>>,
    default: StatusDefault,
) -> Vec<&'a Task> {
    if groups.is_empty() {
        groups.push(Vec::new());
    }
    inject_default_status(&mut groups, default);
    let compiled = compile_filter_groups(&groups, Local::now().date_naive());
    outcome
        .index
        .tasks_in_source_order()
        .into_iter()
        .filter(|task| compiled.matches(task))
        .collect()
}

fn cmd_list(
    root: &Path,
    query: &[String],
    status: Option<&str>,
    sort: Option<&str>,
    group_by: Option<&str>,
    json: bool,
) -> Result<()> {
    let workspace = load_workspace(root)?;
    let default = match status {
        Some(value) => parse_status(value)?,
        None => workspace
            .resolution
            .config
            .as_ref()
            .and_then(|c| c.list_status_default())
            .unwrap_or(StatusDefault::Open),
    };
    let groups = parse_query_to_filter_groups(&query.join(" "))
        .map_err(|err| anyhow!("invalid query: {err}"))?;
    let mut tasks = select(&workspace.outcome, groups, default);

    if let Some(sort) = sort {
        let specs = parse_sort_specs(sort).map_err(|err| anyhow!("invalid sort: {err}"))?;
        sort_tasks(&mut tasks, &specs);
    }

    if let Some(field) = group_by {
        let key = SortKey::parse(field)
            .ok_or_else(|| anyhow!("invalid group-by field `{field}`"))?;
        let grouped = group_tasks(&tasks, key);
        if json {
            let payload: Vec<serde_json::Value> = grouped
                .iter()
                .map(|(label, tasks)| {
                    serde_json::json!({ "group": label, "tasks": tasks })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            render::print_grouped(&grouped);
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        render::print_tasks(&tasks);
    }
    Ok(())
}

fn cmd_search(root: &Path, terms: &[String], json: bool) -> Result<()> {
    let workspace = load_workspace(root)?;
    // Free text is reinjected as explicit text: predicates, one AND group.
    let group: Vec<String> = terms
        .iter()
        .filter(|term| !term.trim().is_empty())
        .map(|term| format!("text:{}", term.trim()))
        .collect();
    let tasks = select(&workspace.outcome, vec![group], StatusDefault::All);
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        render::print_tasks(&tasks);
    }
    Ok(())
}

fn cmd_stats(root: &Path, query: &[String], json: bool) -> Result<()> {
    let workspace = load_workspace(root)?;
    let groups = parse_query_to_filter_groups(&query.join(" "))
        .map_err(|err| anyhow!("invalid query: {err}"))?;
    let tasks = select(&workspace.outcome, groups, StatusDefault::All);
    let report = collect_stats(&tasks);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render::print_stats(&report);
    }
    Ok(())
}

fn cmd_set_completed(root: &Path, id: &str, completed: bool) -> Result<()> {
    let workspace = load_workspace(root)?;
    let task = workspace
        .outcome
        .index
        .tasks
        .get(id)
        .ok_or_else(|| anyhow!("no task with id `{id}`"))?;
    let path = PathBuf::from(&task.file_path);
    set_completed_in_file(&path, task.line_number, completed)?;
    upsert_metadata_in_file(&path, task.line_number, "updated", Some(&today_stamp()))?;

    // Mutations edit the markdown; the index is re-derived and re-persisted
    // wholesale afterwards.
    let rebuilt = build_index(&workspace.files);
    write_index(&index_path(&workspace.resolution.vault_dir), &rebuilt.index)?;

    println!(
        "{} {}  {}",
        if completed { "done:" } else { "reopened:" },
        id,
        task.text
    );
    Ok(())
}

fn cmd_index(root: &Path, check: bool) -> Result<()> {
    let workspace = load_workspace(root)?;
    let path = index_path(&workspace.resolution.vault_dir);
    if check {
        let persisted = read_index(&path)
            .map_err(|err| anyhow!("cannot check persisted index: {err}"))?;
        let report = check_index(&persisted, &workspace.outcome.index);
        if report.ok {
            println!("index is up to date ({} files)", workspace.files.len());
            return Ok(());
        }
        for file in &report.stale {
            println!("stale: {}", file);
        }
        for file in &report.missing {
            println!("missing: {}", file);
        }
        for file in &report.extra {
            println!("extra: {}", file);
        }
        bail!(
            "index is stale ({} stale, {} missing, {} extra)",
            report.stale.len(),
            report.missing.len(),
            report.extra.len()
        );
    }
    write_index(&path, &workspace.outcome.index)?;
    println!(
        "indexed {} tasks from {} files -> {}",
        workspace.outcome.stats.tasks,
        workspace.outcome.stats.files,
        path.display()
    );
    Ok(())
}

fn cmd_lint(root: &Path, json: bool) -> Result<()> {
    let resolution = resolve_vault(root)?;
    let files = list_markdown_files(&resolution.vault_dir);
    let findings = lint_files(&files);
    if json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
        return Ok(());
    }
    if findings.is_empty() {
        println!("No findings in {} files.", files.len());
        return Ok(());
    }
    for finding in &findings {
        match finding.line {
            Some(line) => println!("{}:{}: {}", finding.file, line, finding.message),
            None => println!("{}: {}", finding.file, finding.message),
        }
    }
    println!("{} finding(s) in {} files.", findings.len(), files.len());
    Ok(())
}
