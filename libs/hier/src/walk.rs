//! Memoized hierarchy traversal.
//!
//! Hierarchical queries (pin directions, backward reachability, input
//! capacitance) depend on the same query evaluated on child modules.
//! [`evaluate`] resolves such queries with an explicit worklist instead of
//! native recursion, so deep hierarchies cannot overflow the stack and
//! shared subqueries are computed once.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Evaluates the query `root`, first evaluating every query it depends on.
///
/// `deps` lists the subqueries a key needs. `compute` produces a key's value and
/// may read the values of its dependencies from the memo table it is given.
/// Results are stored in `memo` and reused by later calls.
///
/// A dependency that is already being evaluated further up the worklist (a
/// cycle in the hierarchy) is not re-entered: `compute` simply does not find it
/// in the memo table and must treat it as unknown.
pub fn evaluate<K, V, E, D, C>(
    root: K,
    memo: &mut HashMap<K, V>,
    mut deps: D,
    mut compute: C,
) -> Result<V, E>
where
    K: Clone + Eq + Hash,
    V: Clone,
    D: FnMut(&K) -> Result<Vec<K>, E>,
    C: FnMut(&K, &HashMap<K, V>) -> Result<V, E>,
{
    if let Some(value) = memo.get(&root) {
        return Ok(value.clone());
    }

    let mut stack = vec![(root.clone(), false)];
    let mut active = HashSet::new();

    while let Some((key, expanded)) = stack.pop() {
        if memo.contains_key(&key) {
            continue;
        }
        if expanded {
            let value = compute(&key, memo)?;
            active.remove(&key);
            if key == root {
                memo.insert(key, value.clone());
                return Ok(value);
            }
            memo.insert(key, value);
        } else {
            if !active.insert(key.clone()) {
                continue;
            }
            let children = deps(&key)?;
            stack.push((key, true));
            for child in children {
                if !memo.contains_key(&child) && !active.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
    }

    // The root is always the bottom frame of the worklist, so the loop
    // returns before the stack drains.
    unreachable!("worklist drained without evaluating the root query")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_dependencies_once() {
        // Diamond: 0 -> {1, 2}, 1 -> 3, 2 -> 3.
        let graph: HashMap<u32, Vec<u32>> =
            HashMap::from([(0, vec![1, 2]), (1, vec![3]), (2, vec![3]), (3, vec![])]);
        let mut calls = HashMap::<u32, usize>::new();
        let mut memo = HashMap::new();
        let value = evaluate(
            0u32,
            &mut memo,
            |k| Ok::<_, ()>(graph[k].clone()),
            |k, memo: &HashMap<u32, u32>| {
                *calls.entry(*k).or_default() += 1;
                Ok(1 + graph[k].iter().map(|c| memo[c]).sum::<u32>())
            },
        )
        .unwrap();
        assert_eq!(value, 5);
        assert!(calls.values().all(|&n| n == 1));
    }

    #[test]
    fn tolerates_cycles() {
        let graph: HashMap<u32, Vec<u32>> = HashMap::from([(0, vec![1]), (1, vec![0])]);
        let mut memo = HashMap::new();
        let value = evaluate(
            0u32,
            &mut memo,
            |k| Ok::<_, ()>(graph[k].clone()),
            |k, memo: &HashMap<u32, u32>| {
                Ok(1 + graph[k].iter().filter_map(|c| memo.get(c)).sum::<u32>())
            },
        )
        .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let depth = 100_000u32;
        let mut memo = HashMap::new();
        let value = evaluate(
            0u32,
            &mut memo,
            |k| Ok::<_, ()>(if *k < depth { vec![k + 1] } else { vec![] }),
            |k, memo: &HashMap<u32, u64>| Ok(memo.get(&(k + 1)).copied().unwrap_or(0) + 1),
        )
        .unwrap();
        assert_eq!(value, depth as u64 + 1);
    }
}
