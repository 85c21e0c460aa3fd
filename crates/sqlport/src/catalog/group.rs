//! Run-length grouping of ordinal-tagged records.

/// A run of records belonging to one parent entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<K, T> {
    pub key: K,
    pub rows: Vec<T>,
}

/// Group an already ordered record sequence in a single forward scan.
///
/// A row with ordinal 1 closes the current group and opens a new one keyed by
/// `key_of(row)`. The first row always opens a group, whatever its ordinal.
/// Rows are never reordered, so concatenating the groups reproduces the input.
pub fn group_by_ordinal<T, K, O, F>(rows: Vec<T>, ordinal_of: O, key_of: F) -> Vec<Group<K, T>>
where
    O: Fn(&T) -> i32,
    F: Fn(&T) -> K,
{
    let mut groups = Vec::new();
    let mut current: Option<Group<K, T>> = None;

    for row in rows {
        match current.as_mut() {
            Some(group) if ordinal_of(&row) != 1 => group.rows.push(row),
            _ => {
                if let Some(done) = current.take() {
                    groups.push(done);
                }
                current = Some(Group {
                    key: key_of(&row),
                    rows: vec![row],
                });
            }
        }
    }

    if let Some(done) = current {
        groups.push(done);
    }
    groups
}
