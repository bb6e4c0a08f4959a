//! Merging freshly scraped items into a saved collection.

use std::collections::HashMap;

use chrono::NaiveDate;

/// Items with a stable identity, usually their URL.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Items carrying an optional publication date.
pub trait Dated {
    fn date(&self) -> Option<NaiveDate>;
}

/// Merge `new` into `existing` by key.
///
/// Existing items keep their position and are replaced in place when `new`
/// has the same key; unseen items are appended in the order given. Returns
/// the merged list with the number of items added and updated.
pub fn merge_items<T: Keyed>(existing: Vec<T>, new: Vec<T>) -> (Vec<T>, usize, usize) {
    let mut merged = existing;
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, item)| (item.key().to_string(), i))
        .collect();

    let mut added = 0;
    let mut updated = 0;

    for item in new {
        match positions.get(item.key()) {
            Some(&idx) => {
                merged[idx] = item;
                updated += 1;
            }
            None => {
                positions.insert(item.key().to_string(), merged.len());
                merged.push(item);
                added += 1;
            }
        }
    }

    (merged, added, updated)
}

/// Keep items dated on or after `since`. Items without a date are kept.
pub fn filter_items_since<T: Dated>(items: Vec<T>, since: Option<NaiveDate>) -> Vec<T> {
    let Some(since) = since else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| item.date().map_or(true, |d| d >= since))
        .collect()
}
