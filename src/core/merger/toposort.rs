use std::collections::BTreeSet;

/// Order `count` nodes so every node comes after the nodes it points to
/// through `edges` (`(from, to)` means `from` depends on `to`).
///
/// Cycles do not fail the sort: when no node is free, the smallest remaining
/// index is emitted next, so the result is always a total, stable order.
pub fn toposort(count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut outstanding = vec![0usize; count];
    let mut dependents = vec![Vec::new(); count];
    for &(from, to) in edges {
        if from >= count || to >= count || from == to {
            continue;
        }
        outstanding[from] += 1;
        dependents[to].push(from);
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&n| outstanding[n] == 0).collect();
    let mut remaining: BTreeSet<usize> = (0..count).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(&first) = remaining.iter().next() {
        let next = match ready.pop_first() {
            Some(next) => next,
            None => {
                tracing::debug!("Dependency cycle, forcing node {} out of order", first);
                first
            }
        };
        if !remaining.remove(&next) {
            continue;
        }
        order.push(next);
        for &dependent in &dependents[next] {
            if outstanding[dependent] > 0 {
                outstanding[dependent] -= 1;
                if outstanding[dependent] == 0 && remaining.contains(&dependent) {
                    ready.insert(dependent);
                }
            }
        }
    }

    order
}
