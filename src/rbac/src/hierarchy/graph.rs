//! Parent -> children adjacency with iterative traversals
//!
//! Every traversal keeps an explicit stack and visited set, so stack depth
//! does not grow with the graph and a cycle that slipped into storage is
//! walked once instead of forever.

use crate::types::Edge;
use std::collections::{HashMap, HashSet};

/// Visit state for the three-colour cycle search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path (grey)
    Active,
    /// Fully explored (black)
    Done,
}

/// Full parent -> [children] map loaded in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenMap {
    children: HashMap<String, Vec<String>>,
}

impl ChildrenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from edge rows
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = Edge>,
    {
        let mut map = Self::new();
        for edge in edges {
            map.insert(edge.parent, edge.child);
        }
        map
    }

    pub fn insert(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        let siblings = self.children.entry(parent.into()).or_default();
        let child = child.into();
        if !siblings.contains(&child) {
            siblings.push(child);
        }
    }

    /// Direct children of `name`
    pub fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_edge(&self, parent: &str, child: &str) -> bool {
        self.children(parent).iter().any(|c| c == child)
    }

    pub fn edge_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate every stored edge
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.children.iter().flat_map(|(parent, children)| {
            children.iter().map(move |child| Edge::new(parent.clone(), child.clone()))
        })
    }

    /// Would adding `parent -> child` close a loop?
    ///
    /// Walks down from `child`; finding `parent` (including `child == parent`)
    /// means it already reaches the would-be parent.
    pub fn detect_cycle(&self, parent: &str, child: &str) -> bool {
        if parent == child {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![child];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for next in self.children(current) {
                if next == parent {
                    return true;
                }
                if !visited.contains(next.as_str()) {
                    stack.push(next);
                }
            }
        }

        false
    }

    /// Every item reachable from `name` through one or more edges
    ///
    /// `name` itself is included only when it sits on a cycle.
    pub fn descendants(&self, name: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        self.collect_descendants(name, &mut found);
        found
    }

    /// Union of the descendant sets of every name in `roots`
    pub fn descendants_of_all<'a, I>(&self, roots: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = HashSet::new();
        for root in roots {
            self.collect_descendants(root, &mut found);
        }
        found
    }

    /// Add the descendants of `name` to `found`
    ///
    /// `found` doubles as the visited set: a node already in it has had its
    /// children pushed, so meeting it again is a no-op.
    pub fn collect_descendants(&self, name: &str, found: &mut HashSet<String>) {
        let mut stack: Vec<&str> = self.children(name).iter().map(String::as_str).collect();

        while let Some(current) = stack.pop() {
            if found.contains(current) {
                continue;
            }
            found.insert(current.to_string());
            stack.extend(
                self.children(current)
                    .iter()
                    .map(String::as_str)
                    .filter(|next| !found.contains(*next)),
            );
        }
    }

    /// First cycle found, as a closed path (`a -> b -> a`)
    ///
    /// Three-colour DFS over every node; meeting a grey node closes a loop.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        let mut roots: Vec<&str> = self.children.keys().map(String::as_str).collect();
        roots.sort_unstable();

        for root in roots {
            if marks.contains_key(root) {
                continue;
            }

            // (node, index of the next child to visit)
            let mut path: Vec<(&str, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::Active);

            while let Some((node, next_index)) = path.last().copied() {
                let children = self.children(node);
                if next_index >= children.len() {
                    marks.insert(node, Mark::Done);
                    path.pop();
                    continue;
                }

                if let Some(top) = path.last_mut() {
                    top.1 += 1;
                }

                let child = children[next_index].as_str();
                match marks.get(child) {
                    Some(Mark::Active) => {
                        let start = path.iter().position(|(n, _)| *n == child).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|(n, _)| n.to_string()).collect();
                        cycle.push(child.to_string());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::Active);
                        path.push((child, 0));
                    }
                }
            }
        }

        None
    }
}
