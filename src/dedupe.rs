use std::collections::HashSet;

use crate::db::Store;
use crate::models::Match;

/// Drops matches whose (artist, venue, date) key is already in the history.
///
/// With `skip_insert` false the surviving matches are recorded as they pass,
/// and a match survives only if this call created its row. With `skip_insert`
/// true nothing is written, so a later real run still sees them as new.
pub fn filter_new(
    store: &Store,
    matches: Vec<Match>,
    skip_insert: bool,
) -> rusqlite::Result<Vec<Match>> {
    let mut seen_in_batch = HashSet::new();
    let mut fresh = Vec::new();

    for m in matches {
        let (artist, venue, date) = m.key();
        if store.history_exists(&artist, &venue, &date)? {
            continue;
        }
        if skip_insert {
            if !seen_in_batch.insert((artist, venue, date)) {
                continue;
            }
        } else {
            let inserted = store.insert_history(
                &artist,
                &venue,
                &date,
                &m.event.title,
                &m.event.url,
                m.event.source.id(),
            )?;
            if !inserted {
                continue;
            }
        }
        fresh.push(m);
    }
    Ok(fresh)
}
