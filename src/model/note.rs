use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Format used for the `date` field of every note (`05.03.2024`)
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Stable identifier assigned to a note when it is created
pub type NoteId = Ulid;

/// Fixed set of categories a note can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Work,
    Study,
    Other,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Work, Category::Study, Category::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "Work",
            Category::Study => "Study",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    /// Case-insensitive: `work`, `Work` and `WORK` all parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(ValidationError {
                field: ValidationField::Category,
            })
    }
}

/// A note's picture: either a bundled asset or a URI to an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// Opaque id of an image shipped with the app
    Bundled(u64),
    /// `http://`, `https://` or `file://` URI
    Uri(String),
}

const URI_SCHEMES: [&str; 3] = ["http://", "https://", "file://"];

impl ImageRef {
    /// Parse user input: a URI with a known scheme, or a bundled asset id.
    pub fn parse(s: &str) -> Result<ImageRef, ValidationError> {
        let s = s.trim();
        if URI_SCHEMES.iter().any(|scheme| s.starts_with(scheme)) {
            return Ok(ImageRef::Uri(s.to_string()));
        }
        s.parse::<u64>().map(ImageRef::Bundled).map_err(|_| ValidationError {
            field: ValidationField::ImageUri,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Bundled(id) => write!(f, "bundled:{}", id),
            ImageRef::Uri(uri) => f.write_str(uri),
        }
    }
}

/// A single note as persisted in one of the three collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Nil until assigned. Notes stored before ids existed are given one
    /// the first time their collection is loaded.
    #[serde(default = "Ulid::nil")]
    pub id: NoteId,
    pub title: String,
    /// Free text. Older data stored this under `note`.
    #[serde(default, alias = "note", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(
        default,
        rename = "imageUri",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<ImageRef>,
    /// Absent on legacy notes and on notes created through the edit fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// `DD.MM.YYYY`, stamped at creation and never recomputed
    pub date: String,
}

impl Note {
    /// The creation date, if the stored string is well formed.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }

    pub fn matches_key(&self, key: &NoteKey) -> bool {
        match key {
            NoteKey::Id(id) => self.id == *id,
            NoteKey::Title(title) => self.title == *title,
        }
    }
}

/// Format a calendar date the way notes store it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a date given on the command line. Accepts `DD.MM.YYYY` and ISO `YYYY-MM-DD`.
pub fn parse_date_arg(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}

/// How callers refer to a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKey {
    /// First note in insertion order with exactly this title
    Title(String),
    Id(NoteId),
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteKey::Title(title) => write!(f, "\"{}\"", title),
            NoteKey::Id(id) => write!(f, "id {}", id),
        }
    }
}

impl From<&str> for NoteKey {
    fn from(title: &str) -> Self {
        NoteKey::Title(title.to_string())
    }
}

impl From<String> for NoteKey {
    fn from(title: String) -> Self {
        NoteKey::Title(title)
    }
}

impl From<NoteId> for NoteKey {
    fn from(id: NoteId) -> Self {
        NoteKey::Id(id)
    }
}

/// Fields supplied when creating a note
#[derive(Debug, Clone, Default)]
pub struct NoteInput {
    pub title: String,
    pub body: Option<String>,
    pub image: Option<ImageRef>,
    pub category: Option<Category>,
}

impl NoteInput {
    pub fn new(title: impl Into<String>, category: Category) -> Self {
        NoteInput {
            title: title.into(),
            category: Some(category),
            ..Default::default()
        }
    }

    /// Reject a blank title or a missing category.
    pub fn validate(&self) -> Result<Category, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError {
                field: ValidationField::Title,
            });
        }
        self.category.ok_or(ValidationError {
            field: ValidationField::Category,
        })
    }
}

/// Partial update applied by `NoteStore::update`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image: Option<ImageRef>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.image.is_none()
    }

    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(body) = &self.body {
            note.body = Some(body.clone());
        }
        if let Some(image) = &self.image {
            note.image = Some(image.clone());
        }
    }
}

/// Which input was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationField {
    Title,
    Category,
    ImageUri,
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationField::Title => write!(f, "title"),
            ValidationField::Category => write!(f, "category"),
            ValidationField::ImageUri => write!(f, "imageUri"),
        }
    }
}

fn validation_message(field: &ValidationField) -> &'static str {
    match field {
        ValidationField::Title => "note must contain at least 1 character",
        ValidationField::Category => "please select a category (Work, Study or Other)",
        ValidationField::ImageUri => {
            "image must be an http://, https:// or file:// URI or a bundled image id"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {}", validation_message(.field))]
pub struct ValidationError {
    pub field: ValidationField,
}
