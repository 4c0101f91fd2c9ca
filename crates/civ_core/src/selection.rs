//! Persisted pre-match selections.
//!
//! A participant's chosen civilization outlives any one match, so it is
//! kept in an external key-value store. The core only defines the
//! interface and an in-memory store; hosts plug in durable ones.

use std::collections::BTreeMap;
use std::convert::Infallible;

use crate::civilization::CivilizationType;
use crate::components::ParticipantId;

/// String key-value store for selections.
pub trait SelectionStore {
    /// Failure type of the backing store.
    type Error;

    /// Value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the backing medium cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;
}

/// Store that lives only as long as the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySelectionStore {
    values: BTreeMap<String, String>,
}

impl MemorySelectionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SelectionStore for MemorySelectionStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key under which a participant's civilization is stored.
#[must_use]
pub fn civilization_key(participant: ParticipantId) -> String {
    format!("participant.{participant}.civilization")
}

/// Remember `civilization` for `participant`.
///
/// # Errors
///
/// Propagates the store's write error.
pub fn remember_civilization<S: SelectionStore>(
    store: &mut S,
    participant: ParticipantId,
    civilization: CivilizationType,
) -> Result<(), S::Error> {
    store.set(&civilization_key(participant), civilization.code())
}

/// Recall the civilization stored for `participant`.
///
/// An unreadable stored value is logged and treated as no selection.
///
/// # Errors
///
/// Propagates the store's read error.
pub fn recall_civilization<S: SelectionStore>(
    store: &S,
    participant: ParticipantId,
) -> Result<Option<CivilizationType>, S::Error> {
    let Some(raw) = store.get(&civilization_key(participant))? else {
        return Ok(None);
    };
    match raw.parse::<CivilizationType>() {
        Ok(civ) => Ok(Some(civ)),
        Err(err) => {
            tracing::warn!(
                participant,
                value = %raw,
                %err,
                "Ignoring unreadable civilization selection"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_and_recall() {
        let mut store = MemorySelectionStore::new();
        assert_eq!(recall_civilization(&store, 3).unwrap(), None);

        remember_civilization(&mut store, 3, CivilizationType::Entp).unwrap();
        remember_civilization(&mut store, 3, CivilizationType::Intj).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            recall_civilization(&store, 3).unwrap(),
            Some(CivilizationType::Intj)
        );
    }

    #[test]
    fn test_garbage_value_is_ignored() {
        let mut store = MemorySelectionStore::new();
        store.set(&civilization_key(1), "not a civ").unwrap();
        assert_eq!(recall_civilization(&store, 1).unwrap(), None);
    }
}
