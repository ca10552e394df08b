use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Parser)]
#[command(name = "todo")]
#[command(bin_name = "todo")]
#[command(version)]
#[command(about = "A personal task and bug tracker backed by one JSON file")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Document path. Overrides TODO_DB and the configured path."
    )]
    pub db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "TODO_CONFIG",
        help = "Per-installation config file (TOML)."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        help = "Raise log verbosity (-v info, -vv debug). TODO_LOG overrides."
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create the document and record its path in config.")]
    Init(InitArgs),
    #[command(about = "Show config location, configured path and resolved path.")]
    Config,
    #[command(about = "Print the resolved document path.")]
    Path,
    #[command(about = "Add a task.")]
    Add(AddArgs),
    #[command(about = "List tasks with filtering and sorting.")]
    Ls(ListArgs),
    #[command(about = "Show one task.")]
    Show(ShowArgs),
    #[command(about = "Mark tasks done (or pending with --undo).")]
    Done(DoneArgs),
    #[command(about = "Delete a task.")]
    Rm(IdArgs),
    #[command(about = "Replace a task's text.")]
    Edit(EditArgs),
    #[command(about = "Set a task's priority (low, med, high, none).")]
    Pri(PriorityArgs),
    #[command(about = "Set a task's due date (YYYY-MM-DD) or clear it with 'none'.")]
    Due(DueArgs),
    #[command(about = "Add or remove tags.")]
    Tag(TagArgs),
    #[command(about = "Set bug-tracking fields on a task.")]
    Bug(BugArgs),
    #[command(about = "Delete all done tasks.")]
    ClearDone,
    #[command(about = "Move done tasks into the archive document.")]
    Archive,
    #[command(about = "Show task statistics.")]
    Stats(JsonArgs),
    #[command(about = "Validate the document and optionally repair it.")]
    Doctor(DoctorArgs),
    #[command(about = "Upgrade the document to the current schema version.")]
    Migrate(MigrateArgs),
    #[command(about = "Restore the document from its newest backup.")]
    Restore,
    #[command(about = "Generate or install shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(long = "db-path", conflicts_with = "dir", help = "Document file to use.")]
    pub db_path: Option<PathBuf>,

    #[arg(long, help = "Directory for the document (todos.json inside it).")]
    pub dir: Option<PathBuf>,

    #[arg(short = 'f', long, help = "Overwrite an existing configured path.")]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1.., help = "Task text.")]
    pub text: Vec<String>,

    #[arg(short = 'p', long, help = "Priority: low, med or high.")]
    pub priority: Option<String>,

    #[arg(long, help = "Due date (YYYY-MM-DD).")]
    pub due: Option<String>,

    #[arg(short = 't', long = "tag", help = "Tag (repeatable).")]
    pub tags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, conflicts_with = "done", help = "Only pending tasks.")]
    pub pending: bool,

    #[arg(long, help = "Only done tasks.")]
    pub done: bool,

    #[arg(short = 't', long, help = "Require this tag.")]
    pub tag: Option<String>,

    #[arg(short = 's', long, help = "Case-insensitive text search.")]
    pub search: Option<String>,

    #[arg(long, help = "Only bug records.")]
    pub bugs: bool,

    #[arg(long, default_value = "created", help = "Sort: created, due or priority.")]
    pub sort: String,

    #[arg(long, help = "Disable colors.")]
    pub plain: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[arg(long, help = "List the archive instead of the document.")]
    pub archived: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoneArgs {
    #[arg(help = "Task ids.")]
    pub ids: Vec<u64>,

    #[arg(short = 'u', long, help = "Mark the tasks pending again.")]
    pub undo: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(help = "Task id.")]
    pub id: u64,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(required = true, num_args = 1.., help = "New task text.")]
    pub text: Vec<String>,
}

#[derive(Debug, Args)]
pub struct PriorityArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(help = "low, med, high or none.")]
    pub priority: String,
}

#[derive(Debug, Args)]
pub struct DueArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(help = "YYYY-MM-DD, or 'none' to clear.")]
    pub due: String,
}

#[derive(Debug, Args)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum TagSubcommands {
    #[command(about = "Add a tag to a task.")]
    Add(TagChangeArgs),
    #[command(about = "Remove a tag from a task.")]
    Rm(TagChangeArgs),
}

#[derive(Debug, Args)]
pub struct TagChangeArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(help = "Tag name.")]
    pub tag: String,
}

#[derive(Debug, Args)]
pub struct BugArgs {
    #[arg(help = "Task id.")]
    pub id: u64,

    #[arg(long, help = "open, in-progress, fixed or closed.")]
    pub status: Option<String>,

    #[arg(long, help = "Who is working on it.")]
    pub assignee: Option<String>,

    #[arg(long, help = "critical, high, medium or low.")]
    pub severity: Option<String>,

    #[arg(long, help = "Steps to reproduce.")]
    pub steps: Option<String>,

    #[arg(long = "env", help = "Environment the bug shows up in.")]
    pub environment: Option<String>,

    #[arg(long, help = "Clear all bug fields first.")]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoctorArgs {
    #[arg(long, help = "Repair issues and write the corrected document.")]
    pub fix: bool,

    #[arg(long, help = "Restore the newest backup when the document is not valid JSON.")]
    pub restore: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    #[arg(long = "dry-run", help = "Report what would change without writing.")]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
