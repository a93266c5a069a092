use crate::domain::{ExistingIdSet, MergedRecord};

/// Keeps the records whose entry id is not yet in the destination.
pub fn filter_new(records: Vec<MergedRecord>, existing: &ExistingIdSet) -> Vec<MergedRecord> {
    records
        .into_iter()
        .filter(|record| !existing.contains(record.entry_id))
        .collect()
}
