//! Compact storage of traced paths as a prefix tree.

use std::collections::BTreeMap;

use crate::reflection::Reflection;

/// One step of a traced path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathElement {
    pub triangle: u32,
    /// Receiver visible from the hit point
    pub visible: bool,
}

impl From<&Reflection> for PathElement {
    fn from(r: &Reflection) -> Self {
        Self {
            triangle: r.triangle,
            visible: r.receiver_visible(),
        }
    }
}

/// Accumulates per-ray paths one depth batch at a time.
///
/// Only triangle ids and visibility flags are kept, not hit geometry.
#[derive(Debug, Clone, Default)]
pub struct PathBuilder {
    paths: Vec<Vec<PathElement>>,
    finished: Vec<bool>,
}

impl PathBuilder {
    pub fn new(rays: usize) -> Self {
        Self {
            paths: vec![Vec::new(); rays],
            finished: vec![false; rays],
        }
    }

    /// Append one batch of reflections (one per ray).
    pub fn push(&mut self, batch: &[Reflection]) {
        for ((path, done), r) in self.paths.iter_mut().zip(&mut self.finished).zip(batch) {
            if *done {
                continue;
            }
            if r.keep_going() {
                path.push(PathElement::from(r));
            } else {
                *done = true;
            }
        }
    }

    pub fn paths(&self) -> &[Vec<PathElement>] {
        &self.paths
    }

    /// Fold every stored path into a prefix tree.
    pub fn build_tree(&self) -> PathTree {
        let mut tree = PathTree::new();
        for path in &self.paths {
            tree.insert(path);
        }
        tree
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    visible: bool,
    children: BTreeMap<u32, Node>,
}

/// Distinct triangle sequences seen across all rays.
///
/// A node is visible when any ray reaching it could see the receiver.
#[derive(Debug, Clone, Default)]
pub struct PathTree {
    root: Node,
    len: usize,
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct non-empty prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add every prefix of `path`.
    pub fn insert(&mut self, path: &[PathElement]) {
        let mut node = &mut self.root;
        for element in path {
            let len = &mut self.len;
            node = node.children.entry(element.triangle).or_insert_with(|| {
                *len += 1;
                Node::default()
            });
            node.visible |= element.visible;
        }
    }

    /// Call `f` with the triangle sequence of every visible node, parents
    /// before children.
    pub fn for_each_visible(&self, mut f: impl FnMut(&[u32])) {
        let mut prefix = Vec::new();
        visit(&self.root, &mut prefix, &mut f);
    }

    /// Triangle sequences of every visible node.
    pub fn visible_paths(&self) -> Vec<Vec<u32>> {
        let mut out = Vec::new();
        self.for_each_visible(|p| out.push(p.to_vec()));
        out
    }
}

fn visit(node: &Node, prefix: &mut Vec<u32>, f: &mut impl FnMut(&[u32])) {
    for (&triangle, child) in &node.children {
        prefix.push(triangle);
        if child.visible {
            f(prefix);
        }
        visit(child, prefix, f);
        prefix.pop();
    }
}
