mod init;
pub use init::cmd_init;

use std::path::PathBuf;
use std::time::Duration;

use regex::RegexBuilder;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::kv::FileKvStore;
use crate::io::lock::{FileLock, LockError};
use crate::io::recovery;
use crate::model::collection::Collection;
use crate::model::config::StoreConfig;
use crate::model::note::{
    Category, ImageRef, Note, NoteId, NoteInput, NoteKey, NotePatch, parse_date_arg,
};
use crate::ops::clock::{Clock, SystemClock};
use crate::ops::store::{NoteStore, StoreError};
use crate::ops::{check, filter, inspiration};

/// Options shared by every subcommand
struct Globals {
    json: bool,
    data_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let globals = Globals {
        json: cli.json,
        data_dir: cli.data_dir,
    };

    match cli.command {
        // Init runs before a store exists
        Commands::Init(args) => cmd_init(args, globals.data_dir.as_deref()),
        // Needs no store at all
        Commands::Inspire => cmd_inspire(&globals),

        // Read commands
        Commands::List(args) => cmd_list(args, &globals),
        Commands::Search(args) => cmd_search(args, &globals),
        Commands::Calendar(args) => cmd_calendar(args, &globals),
        Commands::Check => cmd_check(&globals),

        // Write commands
        Commands::Add(args) => cmd_add(args, &globals),
        Commands::Edit(args) => cmd_edit(args, &globals),
        Commands::Delete(target) => {
            cmd_move(target, Collection::Active, Collection::Deleted, &globals)
        }
        Commands::Restore(target) => {
            cmd_move(target, Collection::Deleted, Collection::Active, &globals)
        }
        Commands::Archive(args) => {
            let from = if args.from_deleted {
                Collection::Deleted
            } else {
                Collection::Active
            };
            cmd_move(args.target, from, Collection::Archived, &globals)
        }
        Commands::Unarchive(target) => {
            cmd_move(target, Collection::Archived, Collection::Active, &globals)
        }

        // Maintenance
        Commands::Recovery(args) => cmd_recovery(args, &globals),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A store opened from the `--data-dir` flag or by discovery
struct Session {
    data_dir: PathBuf,
    config: StoreConfig,
    store: NoteStore<FileKvStore>,
}

impl Session {
    /// Serialize against other `nb` processes using the same store. Reads
    /// take it too, since a load may write back ids for legacy notes.
    fn lock(&self) -> Result<FileLock, LockError> {
        FileLock::acquire(
            &self.data_dir,
            Duration::from_millis(self.config.storage.lock_timeout_ms),
        )
    }
}

fn resolve_data_dir(globals: &Globals) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &globals.data_dir {
        Some(dir) => {
            let path = PathBuf::from(dir);
            if !path.is_dir() {
                return Err(format!("data directory not found: {}", dir).into());
            }
            Ok(path)
        }
        None => Ok(config_io::discover_data_dir(&std::env::current_dir()?)?),
    }
}

fn open_session(globals: &Globals) -> Result<Session, Box<dyn std::error::Error>> {
    let data_dir = resolve_data_dir(globals)?;
    let config = config_io::read_config(&data_dir)?;
    log::debug!("using store at {}", data_dir.display());

    let store = NoteStore::new(FileKvStore::new(data_dir.clone()))
        .with_default_image(config.notes.default_image.map(ImageRef::Bundled));
    Ok(Session {
        data_dir,
        config,
        store,
    })
}

/// Turn a title argument or `--id` into a lookup key.
fn note_key(target: NoteTarget) -> Result<NoteKey, Box<dyn std::error::Error>> {
    match (target.title, target.id) {
        (_, Some(id)) => {
            let id: NoteId = id
                .parse()
                .map_err(|e| format!("invalid note id '{}': {}", id, e))?;
            Ok(NoteKey::Id(id))
        }
        (Some(title), None) => Ok(NoteKey::Title(title)),
        (None, None) => Err("a note title or --id is required".into()),
    }
}

fn parse_category(arg: Option<&str>) -> Result<Option<Category>, Box<dyn std::error::Error>> {
    Ok(arg.map(str::parse::<Category>).transpose()?)
}

fn parse_collection(arg: &str) -> Result<Collection, Box<dyn std::error::Error>> {
    Ok(arg.parse::<Collection>()?)
}

fn parse_image(arg: Option<&str>) -> Result<Option<ImageRef>, Box<dyn std::error::Error>> {
    Ok(arg.map(ImageRef::parse).transpose()?)
}

fn print_note(note: &Note, collection: Collection, json: bool) -> Result<(), serde_json::Error> {
    if json {
        let out = NoteWithCollectionJson { collection, note };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for line in format_note_detail(note, collection) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn print_notes(notes: &[Note], collection: Collection, json: bool) -> Result<(), serde_json::Error> {
    if json {
        let out = NoteListJson { collection, notes };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for note in notes {
            println!("{}", format_note_line(note));
        }
    }
    Ok(())
}

/// Point the user at the recovery log when a move left data behind.
fn report_store_error(err: StoreError, session: &Session) -> Box<dyn std::error::Error> {
    if err.is_fatal() {
        eprintln!(
            "warning: see {} (or run `nb recovery`) to recover the note",
            recovery::recovery_log_path(&session.data_dir).display()
        );
    }
    err.into()
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_list(args: ListArgs, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let collection = parse_collection(&args.collection)?;
    let category = parse_category(args.category.as_deref())?;
    let session = open_session(globals)?;
    let _lock = session.lock()?;

    let notes = session.store.load(collection)?;
    let notes = filter::filter_by_category(&notes, category);
    print_notes(&notes, collection, globals.json)?;
    Ok(())
}

fn cmd_search(args: SearchArgs, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let collection = parse_collection(&args.collection)?;
    let category = parse_category(args.category.as_deref())?;
    let session = open_session(globals)?;
    let _lock = session.lock()?;

    let notes = session.store.load(collection)?;
    let hits = if args.regex {
        let re = RegexBuilder::new(&args.query)
            .case_insensitive(true)
            .build()
            .map_err(|e| format!("invalid regex: {}", e))?;
        filter::search_by_pattern(&notes, &re, category)
    } else {
        filter::search_by_title(&notes, &args.query, category)
    };
    print_notes(&hits, collection, globals.json)?;
    Ok(())
}

fn cmd_calendar(args: CalendarArgs, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let date = match args.date.as_deref() {
        Some(s) => parse_date_arg(s)
            .ok_or_else(|| format!("invalid date '{}' (expected DD.MM.YYYY or YYYY-MM-DD)", s))?,
        None => SystemClock.today(),
    };
    let category = parse_category(args.category.as_deref())?;
    let session = open_session(globals)?;
    let _lock = session.lock()?;

    let notes = session.store.load(Collection::Active)?;
    let notes = filter::filter_by_date(&notes, date, category);
    print_notes(&notes, Collection::Active, globals.json)?;
    Ok(())
}

fn cmd_inspire(globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = inspiration::random_inspiration(&mut rand::rng());
    if globals.json {
        let out = InspirationJson {
            inspiration: prompt,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", prompt);
    }
    Ok(())
}

fn cmd_check(globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(globals)?;
    let _lock = session.lock()?;
    let result = check::check_store(&session.store)?;

    if globals.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if !result.errors.is_empty() {
            println!("Errors:");
            for err in &result.errors {
                match err {
                    check::CheckError::DuplicateId { id, collections } => {
                        println!("  note {} is stored in: {}", id, join_collections(collections));
                    }
                    check::CheckError::TitleInSeveralCollections { title, collections } => {
                        println!(
                            "  \"{}\" appears in: {}",
                            title,
                            join_collections(collections)
                        );
                    }
                }
            }
        }
        if !result.warnings.is_empty() {
            if !result.errors.is_empty() {
                println!();
            }
            println!("Warnings:");
            for warn in &result.warnings {
                match warn {
                    check::CheckWarning::DuplicateActiveTitle { title, count } => {
                        println!(
                            "  {} active notes are titled \"{}\"; title lookups use the first",
                            count, title
                        );
                    }
                    check::CheckWarning::InvalidDate {
                        collection,
                        title,
                        date,
                    } => {
                        println!("  [{}] \"{}\" has invalid date: {}", collection, title, date);
                    }
                }
            }
        }
        if result.valid {
            println!("✓ store is valid");
        } else {
            println!("✗ store has errors");
        }
    }
    Ok(())
}

fn join_collections(collections: &[Collection]) -> String {
    collections
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Write command handlers
// ---------------------------------------------------------------------------

fn cmd_add(args: AddArgs, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let input = NoteInput {
        title: args.title,
        body: args.body,
        image: parse_image(args.image.as_deref())?,
        category: parse_category(args.category.as_deref())?,
    };
    // Fail on bad input before waiting for the lock
    input.validate()?;

    let session = open_session(globals)?;
    let _lock = session.lock()?;
    let note = session.store.create(input)?;

    if globals.json {
        print_note(&note, Collection::Active, true)?;
    } else {
        println!("{}", note.id);
    }
    Ok(())
}

fn cmd_edit(args: EditArgs, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let patch = NotePatch {
        title: args.new_title,
        body: args.body,
        image: parse_image(args.image.as_deref())?,
    };
    if patch.is_empty() {
        return Err("nothing to change (use --title, --body or --image)".into());
    }
    let key = note_key(args.target)?;

    let session = open_session(globals)?;
    let _lock = session.lock()?;
    let note = session.store.update(key, &patch)?;

    print_note(&note, Collection::Active, globals.json)?;
    Ok(())
}

fn cmd_move(
    target: NoteTarget,
    from: Collection,
    to: Collection,
    globals: &Globals,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = note_key(target)?;

    let session = open_session(globals)?;
    let _lock = session.lock()?;
    let store = &session.store;
    let moved = match (from, to) {
        (Collection::Active, Collection::Deleted) => store.soft_delete(key),
        (Collection::Active, Collection::Archived) => store.archive(key),
        (Collection::Deleted, Collection::Archived) => store.archive_from_deleted(key),
        (Collection::Deleted, Collection::Active) => store.restore(key),
        (Collection::Archived, Collection::Active) => store.unarchive(key),
        _ => store.move_note(key, from, to),
    };
    let note = moved.map_err(|e| report_store_error(e, &session))?;

    if globals.json {
        print_note(&note, to, true)?;
    } else {
        println!("\"{}\" → {}", note.title, to);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

fn cmd_recovery(args: RecoveryCmd, globals: &Globals) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = resolve_data_dir(globals)?;

    match args.action {
        None => {
            let entries = recovery::read_recovery_entries(&data_dir, Some(args.limit.unwrap_or(10)));
            if globals.json {
                let out: Vec<_> = entries.iter().map(|e| e.to_json()).collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if entries.is_empty() {
                println!("recovery log is empty");
            } else {
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    for line in format_recovery_entry(entry) {
                        println!("{}", line);
                    }
                }
            }
        }
        Some(RecoveryAction::Path) => {
            let dir = std::fs::canonicalize(&data_dir).unwrap_or(data_dir);
            println!("{}", recovery::recovery_log_path(&dir).display());
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = prune
                .before
                .as_deref()
                .map(|s| {
                    chrono::DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&chrono::Utc))
                        .map_err(|e| format!("invalid --before timestamp '{}': {}", s, e))
                })
                .transpose()?;
            let _lock = FileLock::acquire(
                &data_dir,
                Duration::from_millis(config_io::read_config(&data_dir)?.storage.lock_timeout_ms),
            )?;
            let removed = recovery::prune_recovery(&data_dir, before, prune.all)?;
            println!("pruned {} recovery entries", removed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(title: Option<&str>, id: Option<&str>) -> NoteTarget {
        NoteTarget {
            title: title.map(String::from),
            id: id.map(String::from),
        }
    }

    #[test]
    fn note_key_from_title() {
        let key = note_key(target(Some("Groceries"), None)).unwrap();
        assert_eq!(key, NoteKey::Title("Groceries".into()));
    }

    #[test]
    fn note_key_from_id() {
        let id = ulid::Ulid::new();
        let key = note_key(target(None, Some(&id.to_string()))).unwrap();
        assert_eq!(key, NoteKey::Id(id));
    }

    #[test]
    fn note_key_rejects_bad_id() {
        let err = note_key(target(None, Some("not-a-ulid"))).unwrap_err();
        assert!(err.to_string().contains("invalid note id 'not-a-ulid'"));
    }

    #[test]
    fn category_and_collection_args() {
        assert_eq!(parse_category(Some("WORK")).unwrap(), Some(Category::Work));
        assert_eq!(parse_category(None).unwrap(), None);
        assert!(parse_category(Some("chores")).is_err());
        assert_eq!(parse_collection("trash").unwrap(), Collection::Deleted);
        assert!(parse_collection("inbox").is_err());
    }

    #[test]
    fn image_args() {
        assert_eq!(parse_image(Some("3")).unwrap(), Some(ImageRef::Bundled(3)));
        assert!(parse_image(Some("ftp://x/y.png")).is_err());
    }
}
