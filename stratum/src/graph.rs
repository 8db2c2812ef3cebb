//! Deterministic ordering of dependency graphs.
//!
//! Both declarations within a layer and the layers of a topology form
//! graphs keyed by name, where each node lists the nodes it depends on.
//! Ordering uses Kahn's algorithm with the ready set kept sorted, so ties are
//! always broken by ascending name.

use std::collections::{BTreeMap, BTreeSet};

/// Node name mapped to the names it depends on.
pub(crate) type DependencyGraph<'a> = BTreeMap<&'a str, BTreeSet<&'a str>>;

/// Order `graph` so every node follows its dependencies.
///
/// Dependencies naming nodes outside `graph` are ignored; callers validate
/// edges before ordering.
///
/// # Errors
///
/// Returns the nodes of one cycle, starting and ending with the same node,
/// when the graph is not acyclic.
pub(crate) fn topological_order<'a>(
    graph: &DependencyGraph<'a>,
) -> Result<Vec<&'a str>, Vec<&'a str>> {
    let mut pending: BTreeMap<&'a str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&'a str, Vec<&'a str>> = BTreeMap::new();
    for (&node, deps) in graph {
        let in_graph = deps.iter().filter(|dep| graph.contains_key(*dep));
        let mut count = 0;
        for &dep in in_graph {
            count += 1;
            dependents.entry(dep).or_default().push(node);
        }
        pending.insert(node, count);
    }

    let mut ready: BTreeSet<&'a str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(graph.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        pending.remove(node);
        for &dependent in dependents.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = pending.get_mut(dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        Err(find_cycle(graph, &pending.keys().copied().collect()))
    }
}

/// Walk dependency edges among `remaining` until a node repeats.
///
/// Every node left over by Kahn's algorithm still has a dependency inside
/// the leftover set, so the walk always closes a cycle.
fn find_cycle<'a>(graph: &DependencyGraph<'a>, remaining: &BTreeSet<&'a str>) -> Vec<&'a str> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path: Vec<&'a str> = Vec::new();
    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|node| *node == current) {
            let mut cycle = path.split_off(position);
            cycle.push(current);
            return cycle;
        }
        path.push(current);
        let next = graph
            .get(current)
            .and_then(|deps| deps.iter().find(|dep| remaining.contains(*dep)));
        match next {
            Some(&dep) => current = dep,
            None => return path,
        }
    }
}

/// Render a cycle for error messages.
pub(crate) fn describe_cycle(cycle: &[&str]) -> String {
    cycle.join(" -> ")
}
