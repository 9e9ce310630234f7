use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::io::kv::KeyValueStore;
use crate::model::collection::Collection;
use crate::model::note::{Note, NoteId};
use crate::ops::store::{NoteStore, StoreError};

/// Structured result from `nb check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// Something that breaks the one-collection-per-note rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The same note id is stored more than once
    #[serde(rename = "duplicate_id")]
    DuplicateId {
        id: String,
        collections: Vec<Collection>,
    },
    /// A title is present in more than one collection
    #[serde(rename = "title_in_several_collections")]
    TitleInSeveralCollections {
        title: String,
        collections: Vec<Collection>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// Several active notes share a title, so title lookups hit the first one
    #[serde(rename = "duplicate_active_title")]
    DuplicateActiveTitle { title: String, count: usize },
    /// `date` is not a valid `DD.MM.YYYY` date
    #[serde(rename = "invalid_date")]
    InvalidDate {
        collection: Collection,
        title: String,
        date: String,
    },
}

/// Load all three collections and validate them together. Read-only.
pub fn check_store<S: KeyValueStore>(store: &NoteStore<S>) -> Result<CheckResult, StoreError> {
    let active = store.load(Collection::Active)?;
    let deleted = store.load(Collection::Deleted)?;
    let archived = store.load(Collection::Archived)?;
    Ok(check_collections(&[
        (Collection::Active, active.as_slice()),
        (Collection::Deleted, deleted.as_slice()),
        (Collection::Archived, archived.as_slice()),
    ]))
}

pub fn check_collections(collections: &[(Collection, &[Note])]) -> CheckResult {
    let mut result = CheckResult::default();

    // BTreeMap keeps report order stable
    let mut ids: BTreeMap<NoteId, Vec<Collection>> = BTreeMap::new();
    let mut titles: BTreeMap<&str, Vec<Collection>> = BTreeMap::new();

    for (collection, notes) in collections {
        for note in notes.iter() {
            ids.entry(note.id).or_default().push(*collection);
            let seen = titles.entry(note.title.as_str()).or_default();
            if !seen.contains(collection) {
                seen.push(*collection);
            }
            if note.parsed_date().is_none() {
                result.warnings.push(CheckWarning::InvalidDate {
                    collection: *collection,
                    title: note.title.clone(),
                    date: note.date.clone(),
                });
            }
        }
    }

    for (id, found_in) in ids {
        if found_in.len() > 1 {
            result.errors.push(CheckError::DuplicateId {
                id: id.to_string(),
                collections: found_in,
            });
        }
    }
    for (title, found_in) in titles {
        if found_in.len() > 1 {
            result.errors.push(CheckError::TitleInSeveralCollections {
                title: title.to_string(),
                collections: found_in,
            });
        }
    }

    let mut active_titles: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for (collection, notes) in collections {
        if *collection != Collection::Active {
            continue;
        }
        for note in notes.iter() {
            let count = active_titles.entry(note.title.as_str()).or_insert(0);
            if *count == 0 {
                order.push(note.title.as_str());
            }
            *count += 1;
        }
    }
    for title in order {
        let count = active_titles[title];
        if count > 1 {
            result.warnings.push(CheckWarning::DuplicateActiveTitle {
                title: title.to_string(),
                count,
            });
        }
    }

    result.valid = result.errors.is_empty();
    result
}
