//! muscat: command-line front-end for the worktree graph.
//!
//! Drives [`MuscatEngine`] against the real `git` and the file-backed stores
//! under `~/.muscat` (or `--root`).
//!
//! ## Subcommands
//!
//! - `graph`: Fetch and print the worktree tree
//! - `fork` / `remove`: Create or delete a worktree
//! - `lineage`: Inspect or edit recorded parent branches
//! - `layout`: Node positions and the auto-layout switch
//! - `projects`: Opened repositories
//! - `config`: Print the effective engine config

mod logging;

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use muscat_core::layout::graph_edges;
use muscat_core::{
    GraphEdge, MuscatEngine, MuscatError, PlacedNode, StackedLayout, StorageConfig, WorktreeNode,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "muscat")]
#[command(about = "Git worktree graph with persistent sessions")]
#[command(version)]
struct Cli {
    /// Storage root (defaults to ~/.muscat)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Repository to operate on (defaults to the most recent project, then `.`)
    #[arg(long, global = true, value_name = "PATH")]
    repo: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch worktrees and print the reconciled graph
    Graph {
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Create a worktree for a new branch forked from BASE
    Fork {
        base: String,
        branch: String,

        /// Checkout path (defaults to <workspaces_dir>/<repo>/<branch>)
        #[arg(long)]
        path: Option<String>,
    },

    /// Remove the worktree at PATH
    Remove {
        path: String,

        /// Discard uncommitted changes
        #[arg(long)]
        force: bool,
    },

    /// Recorded parent branches
    Lineage {
        #[command(subcommand)]
        action: LineageAction,
    },

    /// Node positions and layout mode
    Layout {
        #[command(subcommand)]
        action: LayoutAction,
    },

    /// Opened repositories
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },

    /// Print the effective engine config
    Config,
}

#[derive(Subcommand)]
enum LineageAction {
    Show,
    Set { branch: String, parent: String },
    Unset { branch: String },
}

#[derive(Subcommand)]
enum LayoutAction {
    Show,
    Toggle,
    Move { id: String, x: f64, y: f64 },
}

#[derive(Subcommand)]
enum ProjectsAction {
    List,
    Add { path: String },
    Remove { id: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] MuscatError),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct GraphReport<'a> {
    repo: Option<&'a str>,
    nodes: &'a [WorktreeNode],
    edges: Vec<GraphEdge>,
    positions: Vec<PlacedNode>,
}

fn main() {
    let cli = Cli::parse();
    let storage = cli
        .root
        .clone()
        .map(StorageConfig::with_root)
        .unwrap_or_default();
    let _logging_guard = logging::init(&storage.logs_dir());

    if let Err(e) = run(cli, storage) {
        tracing::error!(error = %e, "muscat failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, storage: StorageConfig) -> Result<(), CliError> {
    let mut engine = MuscatEngine::with_storage(storage)?;
    let repo = cli
        .repo
        .clone()
        .or_else(|| engine.projects().recent().first().map(|p| p.path.clone()))
        .unwrap_or_else(|| ".".to_string());

    match cli.command {
        Commands::Graph { json } => {
            engine.fetch_worktrees(&repo)?;
            if json {
                print_graph_json(&engine)?;
            } else {
                print_tree(engine.graph().nodes());
            }
        }
        Commands::Fork { base, branch, path } => {
            engine.fetch_worktrees(&repo)?;
            let record = engine.fork_worktree(&base, &branch, path.as_deref())?;
            println!("Created {} at {}", branch, record.path);
        }
        Commands::Remove { path, force } => {
            engine.fetch_worktrees(&repo)?;
            match engine.remove_worktree(&path, force) {
                Err(MuscatError::DirtyWorktree { path }) => {
                    eprintln!("{path} has uncommitted changes; re-run with --force to discard them");
                    return Err(MuscatError::DirtyWorktree { path }.into());
                }
                other => other?,
            }
            println!("Removed {path}");
        }
        Commands::Lineage { action } => run_lineage(&mut engine, action),
        Commands::Layout { action } => run_layout(&mut engine, &repo, action)?,
        Commands::Projects { action } => run_projects(&mut engine, action)?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(engine.config())?);
        }
    }
    Ok(())
}

fn run_lineage(engine: &mut MuscatEngine, action: LineageAction) {
    match action {
        LineageAction::Show => {
            for (branch, parent) in engine.lineage().entries() {
                println!("{branch} <- {parent}");
            }
        }
        LineageAction::Set { branch, parent } => engine.set_parent(&branch, &parent),
        LineageAction::Unset { branch } => engine.unset_parent(&branch),
    }
}

fn run_layout(engine: &mut MuscatEngine, repo: &str, action: LayoutAction) -> Result<(), CliError> {
    match action {
        LayoutAction::Show => {
            engine.fetch_worktrees(repo)?;
            let mode = if engine.layout().auto_layout() {
                "auto"
            } else {
                "manual"
            };
            println!("layout: {mode}");
            for placed in engine.place_nodes(&StackedLayout) {
                println!(
                    "{}\t{:.1}\t{:.1}",
                    placed.id, placed.position.x, placed.position.y
                );
            }
        }
        LayoutAction::Toggle => {
            let auto = engine.toggle_auto_layout();
            println!("auto layout: {}", if auto { "on" } else { "off" });
        }
        LayoutAction::Move { id, x, y } => engine.drag_end(&id, x, y),
    }
    Ok(())
}

fn run_projects(engine: &mut MuscatEngine, action: ProjectsAction) -> Result<(), CliError> {
    match action {
        ProjectsAction::List => {
            let active = engine.projects().active().map(|p| p.id.clone());
            for project in engine.projects().recent() {
                let marker = if active.as_deref() == Some(project.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}\t{}\t{}\t{}",
                    project.id,
                    project.name,
                    project.path,
                    project.last_opened.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ProjectsAction::Add { path } => {
            let project = engine.open_project(&path)?;
            println!("Opened {} ({})", project.name, project.id);
        }
        ProjectsAction::Remove { id } => engine.projects_mut().remove(&id),
    }
    Ok(())
}

fn print_graph_json(engine: &MuscatEngine) -> Result<(), CliError> {
    let nodes = engine.graph().nodes();
    let report = GraphReport {
        repo: engine.graph().main_repo_path(),
        nodes,
        edges: graph_edges(nodes),
        positions: engine.place_nodes(&StackedLayout),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints nodes depth-first under their parents.
fn print_tree(nodes: &[WorktreeNode]) {
    let mut children: HashMap<Option<&str>, Vec<&WorktreeNode>> = HashMap::new();
    for node in nodes {
        children
            .entry(node.parent_id.as_deref())
            .or_default()
            .push(node);
    }

    let mut stack: Vec<(&WorktreeNode, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|n| (*n, 0)).collect())
        .unwrap_or_default();
    while let Some((node, depth)) = stack.pop() {
        let main = if node.is_main() { " (main)" } else { "" };
        println!(
            "{}{} {} {}{}",
            "  ".repeat(depth),
            node.display_branch(),
            node.short_head(),
            node.path(),
            main
        );
        if let Some(kids) = children.get(&Some(node.id.as_str())) {
            stack.extend(kids.iter().rev().map(|n| (*n, depth + 1)));
        }
    }
}
