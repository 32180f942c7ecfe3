use std::collections::BTreeMap;

use itertools::Itertools;

/// The wildcard marker inside a compressed tuple: the column may take any value of its
/// variable's domain in this row.
pub(crate) const ANY_VALUE: i64 = i64::MIN;

/// Compresses a tuple set by replacing columns with [`ANY_VALUE`].
///
/// Tuples that agree everywhere except in one column are merged when the differing column
/// covers the whole domain of its variable (given by `domain_sizes`). This runs to a fixed
/// point, since a merge may enable further merges in other columns.
pub(crate) fn compress_tuples(domain_sizes: &[u64], tuples: &mut Vec<Vec<i64>>) {
    if tuples.is_empty() {
        return;
    }
    let arity = domain_sizes.len();

    tuples.sort_unstable();
    tuples.dedup();

    loop {
        let mut changed = false;
        for column in 0..arity {
            let mut groups: BTreeMap<Vec<i64>, Vec<i64>> = BTreeMap::new();
            for tuple in tuples.iter() {
                let mut masked = tuple.clone();
                masked[column] = ANY_VALUE;
                groups.entry(masked).or_default().push(tuple[column]);
            }

            let mut rebuilt = Vec::with_capacity(tuples.len());
            for (mut masked, values) in groups {
                let values: Vec<i64> = values.into_iter().sorted().dedup().collect();
                if values.contains(&ANY_VALUE) || values.len() as u64 == domain_sizes[column] {
                    // The column is irrelevant for this row group.
                    rebuilt.push(masked);
                } else {
                    for value in values {
                        masked[column] = value;
                        rebuilt.push(masked.clone());
                    }
                }
            }

            if rebuilt.len() < tuples.len() {
                changed = true;
            }
            rebuilt.sort_unstable();
            *tuples = rebuilt;
        }
        if !changed {
            break;
        }
    }
}

/// Fully compresses a tuple set into rows of per-column value lists.
///
/// Rows that agree on all other columns are merged by unioning the differing column into a
/// value list; an empty list means "any value". This subsumes the wildcard-only compression
/// and typically produces far fewer rows, at the price of a weaker linear relaxation.
pub(crate) fn fully_compress_tuples(
    domain_sizes: &[u64],
    tuples: &[Vec<i64>],
) -> Vec<Vec<Vec<i64>>> {
    let arity = domain_sizes.len();
    let mut rows: Vec<Vec<Vec<i64>>> = tuples
        .iter()
        .map(|tuple| {
            tuple
                .iter()
                .map(|&value| {
                    if value == ANY_VALUE {
                        vec![]
                    } else {
                        vec![value]
                    }
                })
                .collect()
        })
        .collect();
    rows.sort_unstable();
    rows.dedup();

    loop {
        let mut changed = false;
        for column in 0..arity {
            let mut groups: BTreeMap<Vec<Vec<i64>>, Vec<Vec<i64>>> = BTreeMap::new();
            for row in &rows {
                let mut masked = row.clone();
                masked[column] = vec![];
                groups
                    .entry(masked)
                    .or_default()
                    .push(row[column].clone());
            }

            let mut rebuilt = Vec::with_capacity(rows.len());
            for (mut masked, cells) in groups {
                let is_any = cells.iter().any(Vec::is_empty);
                let values: Vec<i64> = cells.into_iter().flatten().sorted().dedup().collect();
                if is_any || values.len() as u64 >= domain_sizes[column] {
                    rebuilt.push(masked);
                } else {
                    masked[column] = values;
                    rebuilt.push(masked);
                }
            }

            if rebuilt.len() < rows.len() {
                changed = true;
            }
            rebuilt.sort_unstable();
            rows = rebuilt;
        }
        if !changed {
            break;
        }
    }

    rows
}
