//! Folds persisted snapshots into per-game playtime histories

use crate::types::{icon_url, AppId, EntityHistory, Snapshot};
use std::collections::{BTreeMap, HashSet};

/// Merge snapshots into one history per game, dropping excluded app ids.
///
/// Snapshots are visited in date order so the icon and name of a game come
/// from the earliest snapshot that mentions it, whatever order the store
/// returned them in. If two snapshots share a date the later one in the
/// input wins, matching overwrite-on-write in the store.
pub fn merge(snapshots: &[Snapshot], excluded: &HashSet<AppId>) -> BTreeMap<AppId, EntityHistory> {
    let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);

    let mut histories: BTreeMap<AppId, EntityHistory> = BTreeMap::new();

    for snapshot in ordered {
        for game in &snapshot.games {
            if excluded.contains(&game.entity_id) {
                continue;
            }

            let history = histories.entry(game.entity_id).or_insert_with(|| {
                EntityHistory::new(
                    game.entity_id,
                    game.name.clone(),
                    icon_url(game.entity_id, &game.icon_hash),
                )
            });
            if history.name.is_none() {
                history.name = game.name.clone();
            }

            history.total.insert(snapshot.date, game.total_minutes);
            history.recent.insert(snapshot.date, game.recent_minutes);
        }
    }

    histories
}
