//! A generic quadtree with refine/reduce traversals.
//!
//! Ported from `original_source/alpine_renderer/utils/QuadTree.h`, which
//! keeps children as `std::array<unique_ptr<QuadTreeNode>, 4>` guarded by a
//! `bool m_children_present` flag. Rust's `Option<Box<[QuadTreeNode<T>; 4]>>`
//! collapses that flag and the array into a single owning field: "children
//! absent" and "children present" become one `None`/`Some` instead of two
//! fields that have to agree with each other.
//!
//! As in the original, this type does no performance tuning ("it's likely
//! possible to do things in a way that is better for cpu caches... not done
//! [yet]") — it exists to make refine/reduce obviously correct.

/// A node in the quadtree. Owns its four children exclusively; they are
/// either all present or all absent, never a partial set (spec §3).
#[derive(Debug)]
pub struct QuadTreeNode<T> {
    data: T,
    children: Option<Box<[QuadTreeNode<T>; 4]>>,
}

impl<T> QuadTreeNode<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            children: None,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn children(&self) -> Option<&[QuadTreeNode<T>; 4]> {
        self.children.as_deref()
    }

    pub fn children_mut(&mut self) -> Option<&mut [QuadTreeNode<T>; 4]> {
        self.children.as_deref_mut()
    }

    /// Gives this (childless) node four children. No-op if children are
    /// already present.
    pub fn add_children(&mut self, data: [T; 4]) {
        if self.children.is_some() {
            return;
        }
        let [a, b, c, d] = data;
        self.children = Some(Box::new([
            QuadTreeNode::new(a),
            QuadTreeNode::new(b),
            QuadTreeNode::new(c),
            QuadTreeNode::new(d),
        ]));
    }

    /// Drops all four children (and their subtrees), turning this node back
    /// into a leaf.
    pub fn remove_children(&mut self) {
        self.children = None;
    }
}

/// Top-down pre-order refine: for every childless node whose data satisfies
/// `should_refine`, create four children via `make_children`, then recurse
/// into whatever children now exist (the newly created ones included).
/// Idempotent when `should_refine` is stable (spec §4.1).
pub fn refine<T, P, M>(root: &mut QuadTreeNode<T>, should_refine: &P, make_children: &M)
where
    T: Clone,
    P: Fn(&T) -> bool,
    M: Fn(&T) -> [T; 4],
{
    if !root.has_children() && should_refine(&root.data) {
        root.add_children(make_children(&root.data));
    }
    if let Some(children) = root.children_mut() {
        for child in children.iter_mut() {
            refine(child, should_refine, make_children);
        }
    }
}

/// Bottom-up reduce: a node's children are dropped iff `may_drop` returns
/// true for all four of them; otherwise recurse into the children that
/// remain (spec §4.1).
pub fn reduce<T, D>(root: &mut QuadTreeNode<T>, may_drop: &D)
where
    D: Fn(&T) -> bool,
{
    let Some(children) = root.children() else {
        return;
    };
    let all_droppable = children.iter().all(|c| may_drop(&c.data));

    if all_droppable {
        root.remove_children();
        return;
    }

    for child in root.children_mut().unwrap().iter_mut() {
        reduce(child, may_drop);
    }
}

/// Stateless variant of refine: returns the frontier (leaves) of the
/// on-the-fly tree as a flat sequence, without mutating any persistent
/// tree. Used to compute the desired tile set from the camera (spec §4.1,
/// §4.2).
pub fn on_the_fly_traverse<T, P, R>(root: T, should_refine: &P, refine_one: &R) -> Vec<T>
where
    T: Clone,
    P: Fn(&T) -> bool,
    R: Fn(&T) -> [T; 4],
{
    if !should_refine(&root) {
        return vec![root];
    }
    refine_one(&root)
        .into_iter()
        .flat_map(|child| on_the_fly_traverse(child, should_refine, refine_one))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refine_creates_children_in_order() {
        let mut root = QuadTreeNode::new(0u32);
        refine(&mut root, &|d| *d < 1, &|d| [*d + 1, *d + 2, *d + 3, *d + 4]);
        let children = root.children().unwrap();
        assert_eq!(
            children.iter().map(|c| *c.data()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn refine_is_idempotent() {
        let mut root = QuadTreeNode::new(0u32);
        let should_refine = |d: &u32| *d == 0;
        let make_children = |d: &u32| [*d + 1; 4];
        refine(&mut root, &should_refine, &make_children);
        refine(&mut root, &should_refine, &make_children);
        assert_eq!(root.children().unwrap().len(), 4);
    }

    #[test]
    fn reduce_drops_only_when_all_children_droppable() {
        let mut root = QuadTreeNode::new(0u32);
        root.add_children([1, 2, 3, 4]);
        reduce(&mut root, &|d| *d != 3);
        assert!(root.has_children(), "one child (3) is not droppable");

        reduce(&mut root, &|_| true);
        assert!(!root.has_children());
    }

    #[test]
    fn reduce_recurses_into_surviving_children() {
        let mut root = QuadTreeNode::new(0u32);
        root.add_children([1, 2, 3, 4]);
        root.children_mut().unwrap()[0].add_children([10, 11, 12, 13]);
        // Keep child 0 (via its own grandchildren being undroppable), drop the rest.
        reduce(&mut root, &|d| *d == 0);
        assert!(root.has_children());
        assert!(root.children().unwrap()[0].has_children());
    }

    #[test]
    fn on_the_fly_traverse_returns_frontier() {
        let leaves = on_the_fly_traverse(0u32, &|d| *d < 2, &|d| [*d + 1; 4]);
        assert_eq!(leaves.len(), 4);
        assert!(leaves.iter().all(|&l| l == 2));
    }
}
