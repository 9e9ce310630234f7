use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::collection::Collection;
use crate::model::note::Note;
use crate::util::unicode::{fit_to_width, single_line, truncate_to_width};

/// Titles longer than this are cut in one-line listings
const TITLE_WIDTH: usize = 40;
/// Widest category name ("Study")
const CATEGORY_WIDTH: usize = 5;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct NoteListJson<'a> {
    pub collection: Collection,
    pub notes: &'a [Note],
}

#[derive(Serialize)]
pub struct NoteWithCollectionJson<'a> {
    pub collection: Collection,
    #[serde(flatten)]
    pub note: &'a Note,
}

#[derive(Serialize)]
pub struct InspirationJson<'a> {
    pub inspiration: &'a str,
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Format a note as a one-line summary: `<id>  <date>  <category>  <title>`
pub fn format_note_line(note: &Note) -> String {
    let category = note.category.map(|c| c.as_str()).unwrap_or("-");
    format!(
        "{}  {}  {}  {}",
        note.id,
        note.date,
        fit_to_width(category, CATEGORY_WIDTH),
        truncate_to_width(&single_line(&note.title), TITLE_WIDTH)
    )
}

/// Format detailed note view
pub fn format_note_detail(note: &Note, collection: Collection) -> Vec<String> {
    let mut lines = vec![note.title.clone()];
    lines.push(format!("id: {}", note.id));
    lines.push(format!("in: {}", collection));
    lines.push(format!("date: {}", note.date));
    if let Some(category) = note.category {
        lines.push(format!("category: {}", category));
    }
    if let Some(image) = &note.image {
        lines.push(format!("image: {}", image));
    }
    if let Some(body) = &note.body {
        lines.push("body:".to_string());
        for line in body.lines() {
            lines.push(format!("  {}", line));
        }
    }
    lines
}

/// Format one recovery log entry for `nb recovery`
pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} - {}: {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    if !entry.body.is_empty() {
        for line in entry.body.lines() {
            lines.push(format!("  | {}", line));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::note::{Category, ImageRef};
    use pretty_assertions::assert_eq;
    use ulid::Ulid;

    fn groceries() -> Note {
        Note {
            id: Ulid::nil(),
            title: "Groceries".into(),
            body: Some("milk\neggs".into()),
            image: Some(ImageRef::Bundled(3)),
            category: Some(Category::Other),
            date: "05.03.2024".into(),
        }
    }

    #[test]
    fn note_line_columns() {
        let line = format_note_line(&groceries());
        assert_eq!(
            line,
            "00000000000000000000000000  05.03.2024  Other  Groceries"
        );
    }

    #[test]
    fn note_line_pads_short_category_and_marks_missing_one() {
        let mut note = groceries();
        note.category = Some(Category::Work);
        assert!(format_note_line(&note).contains("  Work   Groceries"));
        note.category = None;
        assert!(format_note_line(&note).contains("  -      Groceries"));
    }

    #[test]
    fn note_line_cuts_long_multiline_titles() {
        let mut note = groceries();
        note.title = format!("first line\n{}", "x".repeat(60));
        let line = format_note_line(&note);
        assert!(!line.contains('\n'));
        assert!(line.ends_with('\u{2026}'));
    }

    #[test]
    fn note_detail() {
        let lines = format_note_detail(&groceries(), Collection::Archived);
        assert_eq!(
            lines,
            vec![
                "Groceries",
                "id: 00000000000000000000000000",
                "in: archived",
                "date: 05.03.2024",
                "category: Other",
                "image: bundled:3",
                "body:",
                "  milk",
                "  eggs",
            ]
        );
    }

    #[test]
    fn note_with_collection_json_is_flat() {
        let note = groceries();
        let json = serde_json::to_value(NoteWithCollectionJson {
            collection: Collection::Deleted,
            note: &note,
        })
        .unwrap();
        assert_eq!(json["collection"], "deleted");
        assert_eq!(json["title"], "Groceries");
        assert_eq!(json["imageUri"], 3);
    }
}
