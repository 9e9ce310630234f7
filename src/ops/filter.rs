use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

use crate::model::note::{Category, Note, format_date};

/// Notes in `category`, in their original order. `None` keeps everything.
pub fn filter_by_category(notes: &[Note], category: Option<Category>) -> Vec<Note> {
    notes
        .iter()
        .filter(|n| category.is_none_or(|c| n.category == Some(c)))
        .cloned()
        .collect()
}

/// Notes created on `date`, optionally narrowed to a category.
///
/// Compares against the stored `DD.MM.YYYY` string exactly, so a note whose
/// date string is malformed never matches.
pub fn filter_by_date(notes: &[Note], date: NaiveDate, category: Option<Category>) -> Vec<Note> {
    let wanted = format_date(date);
    notes
        .iter()
        .filter(|n| n.date == wanted)
        .filter(|n| category.is_none_or(|c| n.category == Some(c)))
        .cloned()
        .collect()
}

/// Case-insensitive substring match on titles. An empty query matches all.
pub fn search_by_title(notes: &[Note], query: &str, category: Option<Category>) -> Vec<Note> {
    if query.is_empty() {
        return filter_by_category(notes, category);
    }
    match title_matcher(query) {
        Ok(re) => search_by_pattern(notes, &re, category),
        // Only reachable for queries beyond the regex size limit
        Err(_) => {
            let needle = query.to_lowercase();
            notes
                .iter()
                .filter(|n| n.title.to_lowercase().contains(&needle))
                .filter(|n| category.is_none_or(|c| n.category == Some(c)))
                .cloned()
                .collect()
        }
    }
}

/// Titles matching an arbitrary regex, optionally narrowed to a category.
pub fn search_by_pattern(notes: &[Note], re: &Regex, category: Option<Category>) -> Vec<Note> {
    notes
        .iter()
        .filter(|n| re.is_match(&n.title))
        .filter(|n| category.is_none_or(|c| n.category == Some(c)))
        .cloned()
        .collect()
}

/// A regex that matches `query` literally, ignoring case.
pub fn title_matcher(query: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ulid::Ulid;

    fn note(title: &str, category: Option<Category>, date: &str) -> Note {
        Note {
            id: Ulid::new(),
            title: title.into(),
            body: None,
            image: None,
            category,
            date: date.into(),
        }
    }

    fn sample() -> Vec<Note> {
        vec![
            note("Groceries", Some(Category::Other), "05.03.2024"),
            note("Quarterly report", Some(Category::Work), "05.03.2024"),
            note("Essay draft", Some(Category::Study), "06.03.2024"),
            note("Standup notes", Some(Category::Work), "06.03.2024"),
            note("Legacy", None, "05.03.2024"),
        ]
    }

    fn titles(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn category_none_is_identity() {
        let notes = sample();
        assert_eq!(filter_by_category(&notes, None), notes);
    }

    #[test]
    fn category_filter_keeps_order_and_is_idempotent() {
        let notes = sample();
        let work = filter_by_category(&notes, Some(Category::Work));
        assert_eq!(titles(&work), vec!["Quarterly report", "Standup notes"]);
        assert_eq!(filter_by_category(&work, Some(Category::Work)), work);
    }

    #[test]
    fn date_filter() {
        let notes = sample();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            titles(&filter_by_date(&notes, day, None)),
            vec!["Groceries", "Quarterly report", "Legacy"]
        );
        assert_eq!(
            titles(&filter_by_date(&notes, day, Some(Category::Work))),
            vec!["Quarterly report"]
        );
        let empty_day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(filter_by_date(&notes, empty_day, None).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let notes = sample();
        assert_eq!(titles(&search_by_title(&notes, "gro", None)), vec!["Groceries"]);
        assert_eq!(
            titles(&search_by_title(&notes, "NOTES", None)),
            vec!["Standup notes"]
        );
        assert_eq!(
            titles(&search_by_title(&notes, "r", Some(Category::Work))),
            vec!["Quarterly report"]
        );
    }

    #[test]
    fn search_treats_query_literally() {
        let notes = vec![note("a.b (draft)", None, "01.01.2024"), note("axb", None, "01.01.2024")];
        assert_eq!(titles(&search_by_title(&notes, "a.b (", None)), vec!["a.b (draft)"]);
    }

    #[test]
    fn empty_query_matches_all() {
        let notes = sample();
        assert_eq!(search_by_title(&notes, "", None), notes);
        assert_eq!(search_by_title(&notes, "", Some(Category::Study)).len(), 1);
    }

    #[test]
    fn pattern_search() {
        let notes = sample();
        let re = Regex::new("^(Q|S)").unwrap();
        assert_eq!(
            titles(&search_by_pattern(&notes, &re, None)),
            vec!["Quarterly report", "Standup notes"]
        );
    }
}
