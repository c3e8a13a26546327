// Folding partial updates into a match snapshot.
//
// Every field present in a patch overwrites the snapshot's value; absent
// fields are left alone. There is no version or timestamp on updates, so
// ordering is purely arrival order and a late, older patch can regress a
// field.

use crate::protocol::{MatchSnapshot, PartialUpdate};

/// Return `current` with every field present in `patch` replaced.
pub fn merge(current: &MatchSnapshot, patch: &PartialUpdate) -> MatchSnapshot {
    let mut merged = current.clone();
    apply(&mut merged, patch);
    merged
}

/// In-place form of [`merge`].
///
/// The patch's `match_id` is not applied: a snapshot keeps the identity it
/// was loaded with. Callers filter foreign updates before merging.
pub fn apply(snapshot: &mut MatchSnapshot, patch: &PartialUpdate) {
    set(&mut snapshot.team1_name, &patch.team1_name);
    set(&mut snapshot.team2_name, &patch.team2_name);
    set(&mut snapshot.team1_score, &patch.team1_score);
    set(&mut snapshot.team2_score, &patch.team2_score);
    set(&mut snapshot.team1_overs, &patch.team1_overs);
    set(&mut snapshot.team2_overs, &patch.team2_overs);
    set(&mut snapshot.status, &patch.status);
    set(&mut snapshot.stadium_name, &patch.stadium_name);
    set(&mut snapshot.striker, &patch.striker);
    set(&mut snapshot.non_striker, &patch.non_striker);
    set(&mut snapshot.team1_players, &patch.team1_players);
    set(&mut snapshot.team2_players, &patch.team2_players);
}

fn set<T: Clone>(field: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *field = value.clone();
    }
}
