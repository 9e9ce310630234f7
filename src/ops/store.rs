use std::sync::{Mutex, MutexGuard};

use ulid::Ulid;

use crate::io::kv::{KeyValueStore, KvError};
use crate::io::recovery::{self, RecoveryCategory, RecoveryEntry};
use crate::model::collection::Collection;
use crate::model::note::{
    ImageRef, Note, NoteInput, NoteKey, NotePatch, ValidationError, ValidationField, format_date,
};
use crate::ops::clock::{Clock, SystemClock};

/// Error type for note store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("note {key} not found in {collection}")]
    NotFound { key: NoteKey, collection: Collection },
    #[error("notes cannot move from {from} to {to}")]
    InvalidTransition { from: Collection, to: Collection },
    #[error("could not read {collection} notes: {source}")]
    StorageRead {
        collection: Collection,
        source: KvError,
    },
    #[error("stored {collection} notes are corrupt: {source}")]
    StorageCorrupt {
        collection: Collection,
        source: serde_json::Error,
    },
    #[error("could not encode {collection} notes: {source}")]
    Encode {
        collection: Collection,
        source: serde_json::Error,
    },
    #[error("could not write {collection} notes: {source}")]
    StorageWrite {
        collection: Collection,
        source: KvError,
    },
    #[error("could not move note from {from} to {to} ({source}); {from} was left unchanged")]
    MoveFailed {
        from: Collection,
        to: Collection,
        source: KvError,
    },
    #[error(
        "note store is inconsistent: the note was removed from {from} but not added to {to} \
         ({write_error}), and restoring {from} failed ({rollback_error}); \
         a copy of the note is in the recovery log"
    )]
    InconsistentState {
        from: Collection,
        to: Collection,
        write_error: KvError,
        rollback_error: KvError,
    },
}

impl StoreError {
    /// True for errors that leave persisted data needing manual attention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::InconsistentState { .. })
    }
}

/// Owns the Active, Deleted and Archived collections.
///
/// Every mutating operation holds `writer` for its whole read-modify-write
/// cycle, so two overlapping calls on the same store can never interleave
/// their loads and saves. Moves hold it across both collection writes.
pub struct NoteStore<S: KeyValueStore> {
    kv: S,
    clock: Box<dyn Clock>,
    default_image: Option<ImageRef>,
    writer: Mutex<()>,
}

impl<S: KeyValueStore> NoteStore<S> {
    pub fn new(kv: S) -> Self {
        NoteStore {
            kv,
            clock: Box::new(SystemClock),
            default_image: None,
            writer: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Image attached to notes created without one.
    pub fn with_default_image(mut self, image: Option<ImageRef>) -> Self {
        self.default_image = image;
        self
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable.
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Read a whole collection. A key that was never written is empty.
    ///
    /// Notes stored without an id get one here and the collection is written
    /// back, so an id shown to the user keeps addressing the same note.
    pub fn load(&self, collection: Collection) -> Result<Vec<Note>, StoreError> {
        let _guard = self.lock_writer();
        self.read(collection)
    }

    /// `load` for callers already holding the writer lock.
    fn read(&self, collection: Collection) -> Result<Vec<Note>, StoreError> {
        let mut notes = self.decode(collection)?;
        let assigned = assign_missing_ids(&mut notes);
        if assigned > 0 {
            log::info!("assigned ids to {} {} notes", assigned, collection);
            if let Err(e) = self.save(collection, &notes) {
                log::warn!("could not store new note ids: {}", e);
            }
        }
        Ok(notes)
    }

    fn decode(&self, collection: Collection) -> Result<Vec<Note>, StoreError> {
        let raw = self
            .kv
            .get(collection.storage_key())
            .map_err(|e| StoreError::StorageRead {
                collection,
                source: e,
            })?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Option<Vec<Note>>>(&raw) {
            Ok(notes) => Ok(notes.unwrap_or_default()),
            Err(e) => {
                log::warn!("{} collection is not valid JSON: {}", collection, e);
                if let Some(dir) = self.kv.data_dir() {
                    recovery::log_recovery(
                        dir,
                        RecoveryEntry::new(
                            RecoveryCategory::Corrupt,
                            format!("{} notes could not be parsed", collection),
                        )
                        .field("Key", collection.storage_key())
                        .field("Error", e.to_string())
                        .body(raw),
                    );
                }
                Err(StoreError::StorageCorrupt {
                    collection,
                    source: e,
                })
            }
        }
    }

    fn encode(collection: Collection, notes: &[Note]) -> Result<String, StoreError> {
        serde_json::to_string(notes).map_err(|e| StoreError::Encode {
            collection,
            source: e,
        })
    }

    fn save(&self, collection: Collection, notes: &[Note]) -> Result<(), StoreError> {
        let json = Self::encode(collection, notes)?;
        self.kv
            .set(collection.storage_key(), &json)
            .map_err(|e| StoreError::StorageWrite {
                collection,
                source: e,
            })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Validate `input`, stamp today's date and append the note to Active.
    ///
    /// Titles are not checked for collisions; the generated id tells notes apart.
    pub fn create(&self, input: NoteInput) -> Result<Note, StoreError> {
        let category = input.validate()?;
        let _guard = self.lock_writer();

        let mut active = self.read(Collection::Active)?;
        let note = Note {
            id: Ulid::new(),
            title: input.title,
            body: input.body,
            image: input.image.or_else(|| self.default_image.clone()),
            category: Some(category),
            date: format_date(self.clock.today()),
        };
        active.push(note.clone());
        self.save(Collection::Active, &active)?;

        log::debug!("created note {} ({})", note.id, note.title);
        Ok(note)
    }

    /// Apply `patch` to the Active note matching `key`.
    ///
    /// When `key` is a title with no Active match, the patch is saved as a new
    /// uncategorized note under that title instead (upsert). Category and date
    /// of an existing note are never touched.
    pub fn update(&self, key: impl Into<NoteKey>, patch: &NotePatch) -> Result<Note, StoreError> {
        let key = key.into();
        if let Some(title) = &patch.title
            && title.trim().is_empty()
        {
            return Err(ValidationError {
                field: ValidationField::Title,
            }
            .into());
        }

        let _guard = self.lock_writer();
        let mut active = self.read(Collection::Active)?;

        let note = match active.iter_mut().find(|n| n.matches_key(&key)) {
            Some(existing) => {
                patch.apply(existing);
                existing.clone()
            }
            None => {
                let NoteKey::Title(title) = &key else {
                    return Err(StoreError::NotFound {
                        key: key.clone(),
                        collection: Collection::Active,
                    });
                };
                let mut note = Note {
                    id: Ulid::new(),
                    title: title.clone(),
                    body: None,
                    image: None,
                    category: None,
                    date: format_date(self.clock.today()),
                };
                patch.apply(&mut note);
                log::debug!("no active note titled {:?}, inserting a new one", title);
                active.push(note.clone());
                note
            }
        };

        self.save(Collection::Active, &active)?;
        Ok(note)
    }

    /// Active -> Deleted
    pub fn soft_delete(&self, key: impl Into<NoteKey>) -> Result<Note, StoreError> {
        self.move_note(key, Collection::Active, Collection::Deleted)
    }

    /// Active -> Archived
    pub fn archive(&self, key: impl Into<NoteKey>) -> Result<Note, StoreError> {
        self.move_note(key, Collection::Active, Collection::Archived)
    }

    /// Deleted -> Archived
    pub fn archive_from_deleted(&self, key: impl Into<NoteKey>) -> Result<Note, StoreError> {
        self.move_note(key, Collection::Deleted, Collection::Archived)
    }

    /// Deleted -> Active
    pub fn restore(&self, key: impl Into<NoteKey>) -> Result<Note, StoreError> {
        self.move_note(key, Collection::Deleted, Collection::Active)
    }

    /// Archived -> Active
    pub fn unarchive(&self, key: impl Into<NoteKey>) -> Result<Note, StoreError> {
        self.move_note(key, Collection::Archived, Collection::Active)
    }

    /// Remove the first note in `from` matching `key` and append it unchanged to `to`.
    ///
    /// `from` is written first. If writing `to` then fails, `from` is written
    /// back to its previous contents and `MoveFailed` is returned; if that
    /// rollback fails too the result is `InconsistentState` and the note is
    /// copied into the recovery log.
    pub fn move_note(
        &self,
        key: impl Into<NoteKey>,
        from: Collection,
        to: Collection,
    ) -> Result<Note, StoreError> {
        let key = key.into();
        if !from.can_move_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        let _guard = self.lock_writer();
        let before = self.read(from)?;
        let mut dest = self.read(to)?;

        let idx = before
            .iter()
            .position(|n| n.matches_key(&key))
            .ok_or_else(|| StoreError::NotFound {
                key: key.clone(),
                collection: from,
            })?;

        let mut source = before.clone();
        let note = source.remove(idx);
        dest.push(note.clone());

        let source_json = Self::encode(from, &source)?;
        let dest_json = Self::encode(to, &dest)?;
        let rollback_json = Self::encode(from, &before)?;

        self.kv
            .set(from.storage_key(), &source_json)
            .map_err(|e| StoreError::StorageWrite {
                collection: from,
                source: e,
            })?;

        if let Err(write_error) = self.kv.set(to.storage_key(), &dest_json) {
            return match self.kv.set(from.storage_key(), &rollback_json) {
                Ok(()) => {
                    log::warn!(
                        "move of {} from {} to {} failed, rolled back: {}",
                        key,
                        from,
                        to,
                        write_error
                    );
                    Err(StoreError::MoveFailed {
                        from,
                        to,
                        source: write_error,
                    })
                }
                Err(rollback_error) => {
                    log::error!(
                        "move of {} from {} to {} failed and rollback failed: {} / {}",
                        key,
                        from,
                        to,
                        write_error,
                        rollback_error
                    );
                    self.record_lost_note(&note, from, to, &write_error, &rollback_error);
                    Err(StoreError::InconsistentState {
                        from,
                        to,
                        write_error,
                        rollback_error,
                    })
                }
            };
        }

        log::debug!("moved note {} ({}) from {} to {}", note.id, note.title, from, to);
        Ok(note)
    }

    fn record_lost_note(
        &self,
        note: &Note,
        from: Collection,
        to: Collection,
        write_error: &KvError,
        rollback_error: &KvError,
    ) {
        let Some(dir) = self.kv.data_dir() else {
            return;
        };
        let body = serde_json::to_string_pretty(note).unwrap_or_else(|_| format!("{:?}", note));
        recovery::log_recovery(
            dir,
            RecoveryEntry::new(
                RecoveryCategory::Move,
                format!("note \"{}\" lost moving from {} to {}", note.title, from, to),
            )
            .field("Id", note.id.to_string())
            .field("From", from.to_string())
            .field("To", to.to_string())
            .field("Write error", write_error.to_string())
            .field("Rollback error", rollback_error.to_string())
            .body(body),
        );
    }
}

/// Give every note with a nil id a fresh one. Returns how many changed.
fn assign_missing_ids(notes: &mut [Note]) -> usize {
    let mut assigned = 0;
    for note in notes.iter_mut().filter(|n| n.id.is_nil()) {
        note.id = Ulid::new();
        assigned += 1;
    }
    assigned
}
