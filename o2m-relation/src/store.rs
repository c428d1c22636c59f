use std::borrow::Cow;

use o2m_core::{
    change_set::{ChangeSet, FieldValue},
    key::PrimaryKey,
};

/// Read/write access to the pending changes of a bound field value.
///
/// Reading always yields a [`ChangeSet`], whatever shape the value has.
/// Writing an empty change set never stores an empty object: the value
/// becomes absent, or, when editing a content version, the list of linked
/// keys, so that the version still pins which items belong to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSetStore {
    value: FieldValue,
}

impl ChangeSetStore {
    pub fn new(value: FieldValue) -> Self {
        ChangeSetStore { value }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn get(&self) -> Cow<'_, ChangeSet> {
        match &self.value {
            FieldValue::Changes(changes) => Cow::Borrowed(changes),
            FieldValue::Absent | FieldValue::PrimaryKeys(_) => Cow::Owned(ChangeSet::default()),
        }
    }

    /// Store `changes`. `linked_keys` is only consulted when `changes` is
    /// empty and `is_version` is set.
    pub fn set(
        &mut self,
        changes: ChangeSet,
        is_version: bool,
        linked_keys: impl FnOnce() -> Vec<PrimaryKey>,
    ) {
        self.value = if !changes.is_empty() {
            FieldValue::Changes(changes)
        } else if is_version {
            FieldValue::PrimaryKeys(linked_keys())
        } else {
            FieldValue::Absent
        };
    }

    /// Replace the value from outside. Returns whether this discarded pending
    /// changes in favor of a key list, which is what the host does after it
    /// saved the record.
    pub fn replace(&mut self, value: FieldValue) -> bool {
        let had_changes = self.value.has_pending_changes();
        self.value = value;
        had_changes && matches!(self.value, FieldValue::PrimaryKeys(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::item;
    use serde_json::json;

    fn some_changes() -> ChangeSet {
        ChangeSet {
            create: vec![item(json!({"name": "A"}))],
            update: vec![item(json!({"id": 5, "name": "Y"}))],
            delete: vec![7.into()],
        }
    }

    #[test]
    fn test_get_without_changes() {
        assert_eq!(*ChangeSetStore::new(FieldValue::Absent).get(), ChangeSet::default());
        assert_eq!(
            *ChangeSetStore::new(FieldValue::PrimaryKeys(vec![1.into()])).get(),
            ChangeSet::default()
        );
    }

    #[test]
    fn test_round_trip() {
        let mut store = ChangeSetStore::default();
        store.set(some_changes(), false, || unreachable!());
        assert_eq!(*store.get(), some_changes());
        assert_eq!(store.value(), &FieldValue::Changes(some_changes()));
    }

    #[test]
    fn test_empty_collapses_to_absent() {
        let mut store = ChangeSetStore::new(FieldValue::Changes(some_changes()));
        store.set(ChangeSet::default(), false, || vec![1.into()]);
        assert_eq!(store.value(), &FieldValue::Absent);
    }

    #[test]
    fn test_empty_collapses_to_linked_keys_in_version() {
        let mut store = ChangeSetStore::new(FieldValue::Changes(some_changes()));
        store.set(ChangeSet::default(), true, || vec![1.into(), 2.into()]);
        assert_eq!(
            store.value(),
            &FieldValue::PrimaryKeys(vec![1.into(), 2.into()])
        );
    }

    #[test]
    fn test_replace_detects_reset_after_save() {
        let mut store = ChangeSetStore::new(FieldValue::Changes(some_changes()));
        assert!(store.replace(FieldValue::PrimaryKeys(vec![1.into()])));
        // No pending changes any more, so another key list is not a reset
        assert!(!store.replace(FieldValue::PrimaryKeys(vec![1.into(), 2.into()])));

        let mut store = ChangeSetStore::new(FieldValue::Changes(some_changes()));
        assert!(!store.replace(FieldValue::Absent));
    }
}
