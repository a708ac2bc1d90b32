//! C# ASG command-line tools.
//!
//! Provides the `csasg` binary for inspecting `csi` graph files: header and
//! statistics, text or JSON dumps, integrity checks, and editing the filter
//! file kept beside each graph.
//!
//! Reads configuration from environment variables:
//! - `CSASG_LOG`: tracing filter directives (default: "warn")
//! - `CSASG_TOOL`: tool name recorded by `rewrite` (default: "csasg")

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use csasg_core::{dump, CoreError, Factory, Header, NodeId};
use csasg_storage::hash::graph_digest;
use csasg_storage::integrity;
use csasg_storage::{FileStore, GraphStore, StorageError, StoreConfig};

/// C# abstract semantic graph tools.
#[derive(Parser)]
#[command(name = "csasg", about = "C# abstract semantic graph tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print header metadata and graph statistics as JSON.
    Info {
        /// Path to the graph file.
        file: PathBuf,
    },

    /// Print the graph as an indented tree.
    Dump {
        /// Path to the graph file.
        file: PathBuf,

        /// Ignore the saved filter and show every node.
        #[arg(long)]
        all: bool,

        /// Print every node as JSON instead of a tree.
        #[arg(long)]
        json: bool,
    },

    /// Run the integrity checks and list every finding.
    Check {
        /// Path to the graph file.
        file: PathBuf,
    },

    /// Hide or show subtrees and save the filter beside the graph.
    Filter {
        /// Path to the graph file.
        file: PathBuf,

        /// Node ids whose subtrees to hide.
        #[arg(long, value_delimiter = ',')]
        hide: Vec<u32>,

        /// Node ids to show again, with their ancestors and subtrees.
        #[arg(long, value_delimiter = ',')]
        show: Vec<u32>,

        /// Start from an empty filter instead of the saved one.
        #[arg(long)]
        reset: bool,
    },

    /// List the graphs stored in a directory.
    List {
        /// Directory holding graph files.
        dir: PathBuf,
    },

    /// Load a graph and save it to a new path.
    Rewrite {
        /// Path to the graph to read.
        input: PathBuf,

        /// Path to write.
        output: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_env("CSASG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Dump { file, all, json } => run_dump(&file, all, json),
        Commands::Check { file } => run_check(&file),
        Commands::Filter {
            file,
            hide,
            show,
            reset,
        } => run_filter(&file, &hide, &show, reset),
        Commands::List { dir } => run_list(&dir),
        Commands::Rewrite { input, output } => {
            let tool = std::env::var("CSASG_TOOL").unwrap_or_else(|_| "csasg".to_string());
            run_rewrite(&input, &output, &tool)
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        process::exit(exit_code(&err));
    }
}

/// Maps an error to the process exit code.
///
/// 0 = success, 1 = usage or graph error, 2 = integrity failure,
/// 3 = I/O or format error.
fn exit_code(err: &StorageError) -> i32 {
    match err {
        StorageError::Integrity { .. } => 2,
        StorageError::Io { .. } => 3,
        StorageError::Core(CoreError::Io(_) | CoreError::Format(_)) => 3,
        StorageError::Core(_) | StorageError::NotFound { .. } | StorageError::InvalidName { .. } => 1,
    }
}

/// Splits a graph path into the store rooted at its directory and its name.
fn open_store(path: &Path, verify_on_load: bool) -> Result<(FileStore, String), StorageError> {
    let invalid = || StorageError::InvalidName {
        name: path.display().to_string(),
    };
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?
        .to_string();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("csi")
        .to_string();
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tracing::debug!("Opening graph {} in {}", name, root.display());
    let config = StoreConfig {
        verify_on_load,
        extension,
        ..StoreConfig::default()
    };
    Ok((FileStore::open(root, config)?, name))
}

fn load(path: &Path, verify_on_load: bool) -> Result<(FileStore, String, Factory, Header), StorageError> {
    let (store, name) = open_store(path, verify_on_load)?;
    let mut factory = Factory::new();
    let header = store.load_graph(&name, &mut factory)?;
    Ok((store, name, factory, header))
}

fn print_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

fn run_info(path: &Path) -> Result<(), StorageError> {
    let (store, name, mut factory, header) = load(path, true)?;
    let has_filter = store.load_filter(&name, &mut factory)?;
    print_json(&serde_json::json!({
        "name": name,
        "metadata": header.metadata,
        "properties": header.properties,
        "nodes": factory.node_count(),
        "size": factory.size(),
        "filtered": has_filter.then(|| factory.filtered_count()),
        "digest": graph_digest(&factory).to_hex().to_string(),
    }));
    Ok(())
}

fn run_dump(path: &Path, all: bool, json: bool) -> Result<(), StorageError> {
    let (store, name, mut factory, _) = load(path, true)?;
    if !all {
        store.load_filter(&name, &mut factory)?;
    }
    if json {
        print_json(&dump::render_json(&factory));
    } else {
        print!("{}", dump::render_tree(&factory));
    }
    Ok(())
}

fn run_check(path: &Path) -> Result<(), StorageError> {
    let (_, name, factory, _) = load(path, false)?;
    let findings = integrity::check(&factory);
    for finding in &findings {
        println!("{}", finding);
    }
    if findings.is_empty() {
        println!("{}: ok ({} nodes)", name, factory.node_count());
        return Ok(());
    }
    Err(StorageError::Integrity {
        reason: format!("{} finding(s) in {}", findings.len(), name),
    })
}

fn run_filter(path: &Path, hide: &[u32], show: &[u32], reset: bool) -> Result<(), StorageError> {
    let (mut store, name, mut factory, _) = load(path, true)?;
    if !reset {
        store.load_filter(&name, &mut factory)?;
    }
    for &id in hide {
        factory.set_filtered(NodeId(id))?;
    }
    for &id in show {
        factory.set_not_filtered(NodeId(id))?;
    }
    store.save_filter(&name, &factory)?;
    println!(
        "{}: {} of {} nodes filtered",
        name,
        factory.filtered_count(),
        factory.node_count()
    );
    Ok(())
}

fn run_list(dir: &Path) -> Result<(), StorageError> {
    let store = FileStore::open(dir, StoreConfig::default())?;
    for name in store.list()? {
        println!("{}", name);
    }
    Ok(())
}

fn run_rewrite(input: &Path, output: &Path, tool: &str) -> Result<(), StorageError> {
    let (source, name, mut factory, header) = load(input, true)?;
    let has_filter = source.load_filter(&name, &mut factory)?;

    let (mut target, target_name) = open_store(output, true)?;
    let header = Header {
        properties: {
            let mut properties = header.properties;
            properties.insert("tool".to_string(), tool.to_string());
            properties
        },
        ..Header::new()
    };
    let summary = target.save_graph(&target_name, &factory, &header)?;
    if has_filter {
        target.save_filter(&target_name, &factory)?;
    }
    print_json(&serde_json::json!({
        "name": summary.name,
        "nodes": summary.nodes,
        "bytes": summary.bytes,
        "digest": summary.digest,
    }));
    Ok(())
}
