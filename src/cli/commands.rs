use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nb", about = concat!("nb v", env!("CARGO_PKG_VERSION"), " - notes with a trash you can take back"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this store directory instead of searching for .notebox/
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a .notebox/ store in the current directory
    Init(InitArgs),
    /// Create a note
    Add(AddArgs),
    /// Change an active note's title, body or image (creates it if the title is new)
    Edit(EditArgs),
    /// Move an active note to the trash
    Delete(NoteTarget),
    /// Move a note from the trash back to active
    Restore(NoteTarget),
    /// Archive an active note (or a trashed one with --from-deleted)
    Archive(ArchiveArgs),
    /// Move an archived note back to active
    Unarchive(NoteTarget),
    /// List notes in a collection
    List(ListArgs),
    /// Search note titles
    Search(SearchArgs),
    /// Show active notes created on a given day
    Calendar(CalendarArgs),
    /// Print a random idea to write about
    Inspire,
    /// Validate store integrity
    Check,
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Bundled image id attached to notes created without an image
    #[arg(long)]
    pub default_image: Option<u64>,
    /// Reinitialize even if .notebox/ already exists (notes are kept)
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Addressing a note
// ---------------------------------------------------------------------------

/// A note named by title (first match wins) or by id
#[derive(Args)]
pub struct NoteTarget {
    /// Note title
    #[arg(required_unless_present = "id", conflicts_with = "id")]
    pub title: Option<String>,
    /// Address the note by id instead of title
    #[arg(long)]
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Note title
    pub title: String,
    /// Category: work, study or other
    #[arg(short, long)]
    pub category: Option<String>,
    /// Note text
    #[arg(short, long)]
    pub body: Option<String>,
    /// Image: a bundled image id, or an http(s):// or file:// URI
    #[arg(short, long)]
    pub image: Option<String>,
}

#[derive(Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub target: NoteTarget,
    /// New title
    #[arg(long = "title", value_name = "TITLE")]
    pub new_title: Option<String>,
    /// New note text
    #[arg(short, long)]
    pub body: Option<String>,
    /// New image: a bundled image id, or an http(s):// or file:// URI
    #[arg(short, long)]
    pub image: Option<String>,
}

#[derive(Args)]
pub struct ArchiveArgs {
    #[command(flatten)]
    pub target: NoteTarget,
    /// Archive a note that is in the trash
    #[arg(long)]
    pub from_deleted: bool,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Collection to list: active, deleted or archived
    #[arg(long = "in", value_name = "COLLECTION", default_value = "active")]
    pub collection: String,
    /// Only notes in this category
    #[arg(short, long)]
    pub category: Option<String>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Text to look for in titles (case-insensitive)
    pub query: String,
    /// Treat the query as a regular expression
    #[arg(long)]
    pub regex: bool,
    /// Only notes in this category
    #[arg(short, long)]
    pub category: Option<String>,
    /// Collection to search: active, deleted or archived
    #[arg(long = "in", value_name = "COLLECTION", default_value = "active")]
    pub collection: String,
}

#[derive(Args)]
pub struct CalendarArgs {
    /// Day to show, DD.MM.YYYY or YYYY-MM-DD (default: today)
    pub date: Option<String>,
    /// Only notes in this category
    #[arg(short, long)]
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}
