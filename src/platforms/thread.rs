//! Reply-tree helpers shared by the platform adapters.
//!
//! Only single-branch self-threads are supported. When the author replied more
//! than once to the same post, the branch with the most replies below it is
//! followed and the others are dropped.

use std::collections::{HashMap, HashSet};

/// Pick the reply to follow: the one with the largest weight, the earliest
/// on ties.
pub fn pick_continuation<T>(candidates: &[T], weight: impl Fn(&T) -> u64) -> Option<&T> {
    let mut best: Option<(&T, u64)> = None;
    for candidate in candidates {
        let w = weight(candidate);
        if best.map_or(true, |(_, best_w)| w > best_w) {
            best = Some((candidate, w));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Linearise a fully materialised reply tree.
///
/// `edges` holds one `(post_id, parent_id)` pair per candidate reply.
/// Starting from `root_id`, each step follows the child with the most
/// transitive descendants. Returns the ids of the chosen path, root first.
pub fn linear_path<'a>(root_id: &'a str, edges: &[(&'a str, &'a str)]) -> Vec<&'a str> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(id, parent) in edges {
        children.entry(parent).or_default().push(id);
    }

    let mut memo: HashMap<&str, u64> = HashMap::new();
    let mut path = vec![root_id];
    let mut visited: HashSet<&str> = HashSet::from([root_id]);
    let mut current = root_id;

    while let Some(kids) = children.get(current) {
        let weighted: Vec<(&str, u64)> = kids
            .iter()
            .copied()
            .filter(|k| !visited.contains(k))
            .map(|k| (k, descendant_count(k, &children, &mut memo)))
            .collect();
        let Some(&(next, _)) = pick_continuation(&weighted, |&(_, n)| n) else {
            break;
        };
        visited.insert(next);
        path.push(next);
        current = next;
    }

    path
}

/// Number of transitive replies below `id`.
fn descendant_count<'a>(
    id: &'a str,
    children: &HashMap<&'a str, Vec<&'a str>>,
    memo: &mut HashMap<&'a str, u64>,
) -> u64 {
    if let Some(&n) = memo.get(id) {
        return n;
    }
    // Iterative post-order so deep threads don't overflow the stack.
    let mut stack = vec![(id, false)];
    let mut on_stack: HashSet<&str> = HashSet::new();
    while let Some((node, expanded)) = stack.pop() {
        if memo.contains_key(node) {
            continue;
        }
        let kids = children.get(node).map(Vec::as_slice).unwrap_or_default();
        if expanded {
            let total: u64 = kids
                .iter()
                .map(|k| 1 + memo.get(k).copied().unwrap_or(0))
                .sum();
            memo.insert(node, total);
            on_stack.remove(node);
        } else {
            if !on_stack.insert(node) {
                // Cycle; count it as a leaf.
                memo.insert(node, 0);
                continue;
            }
            stack.push((node, true));
            stack.extend(kids.iter().filter(|k| !memo.contains_key(*k)).map(|k| (*k, false)));
        }
    }
    memo.get(id).copied().unwrap_or(0)
}
