use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cairn", about = "Cairn content repository tool", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the repository storage
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file; defaults to `cairn.toml` in the root when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Actor recorded in created_by/modified_by
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the entities below a path
    Ls(LsArgs),
    /// Show one entity
    Show(ShowArgs),
    /// Create an entity
    Create(CreateArgs),
    /// Delete an entity and its subtree
    Rm(RmArgs),
    /// Move an entity and its subtree
    Mv(MvArgs),
    /// Copy an entity and its subtree
    Cp(CpArgs),
    /// Manage entity resources
    Resource(ResourceArgs),
    /// Check the tree for unreadable objects and UUID problems
    Fsck(FsckArgs),
    /// Full-text search below a path
    Search(SearchArgs),
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub path: String,
    /// Recurse into children
    #[arg(short, long)]
    pub deep: bool,
    /// Only list entities of this kind (entity, folder, document, site)
    #[arg(long)]
    pub kind: Option<String>,
    /// Skip unreadable entities
    #[arg(long)]
    pub ignore_errors: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub path: String,
}

#[derive(Args)]
pub struct CreateArgs {
    pub path: String,
    /// Entity kind (entity, folder, document, site)
    #[arg(long, default_value = "document")]
    pub kind: String,
    #[arg(long)]
    pub title: Option<String>,
    /// Property as key=value; repeatable
    #[arg(short, long = "prop")]
    pub props: Vec<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub path: String,
}

#[derive(Args)]
pub struct MvArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args)]
pub struct CpArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args)]
pub struct ResourceArgs {
    #[command(subcommand)]
    pub action: ResourceAction,
}

#[derive(Subcommand)]
pub enum ResourceAction {
    /// Store a file as a resource
    Put { entity: String, name: String, file: PathBuf },
    /// Write a resource to a file or stdout
    Get {
        entity: String,
        name: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List resources of an entity
    Ls { entity: String },
    /// Delete a resource
    Rm { entity: String, name: String },
}

#[derive(Args)]
pub struct FsckArgs {
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
    #[arg(long, default_value = "/")]
    pub under: String,
}
