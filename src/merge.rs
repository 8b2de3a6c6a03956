use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::info;

use crate::dataset::{Dataset, FetchSummary};
use crate::error::MergeError;
use crate::model::{ParsedPage, Record, RecordKey};

/// Merge parsed pages into one deduplicated, ordered [`Dataset`].
///
/// Records are keyed by `(station_id, timestamp, measurement_type)`. On a
/// duplicate key the higher quality flag wins; on equal flags the record
/// fetched later wins. "Later" is page order (`page_index`) and then position
/// within the page, so the order of `pages` in the input does not matter.
pub fn merge(mut pages: Vec<ParsedPage>) -> Result<Dataset, MergeError> {
    pages.sort_by_key(|p| p.page_index);

    let mut summary = FetchSummary {
        pages: pages.len(),
        ..FetchSummary::default()
    };
    let mut by_key: BTreeMap<RecordKey, Record> = BTreeMap::new();

    for page in pages {
        summary.parsed += page.parsed;
        summary.rejected += page.rejected;

        for record in page.records {
            match by_key.entry(record.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    summary.duplicates += 1;
                    if record.quality_flag >= slot.get().quality_flag {
                        slot.insert(record);
                    }
                }
            }
        }
    }

    if by_key.is_empty() {
        return Err(MergeError::Empty {
            pages: summary.pages,
        });
    }

    // BTreeMap order is (station_id, timestamp, measurement_type).
    let records: Vec<Record> = by_key.into_values().collect();

    info!(
        records = records.len(),
        pages = summary.pages,
        rejected = summary.rejected,
        duplicates = summary.duplicates,
        "merge complete"
    );

    Ok(Dataset::from_sorted(records, summary))
}
