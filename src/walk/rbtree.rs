use super::{Budget, Walk, WalkEnd, WalkLimits};
use crate::debug::TypeLayouts;
use crate::error::{Error, Result};
use crate::memory::AddressSpace;
use std::collections::HashSet;
use std::ops::ControlFlow;

/// A red-black tree's depth is at most 2 * log2(n + 1) so anything deeper than this is
/// corrupt.
const MAX_DEPTH: usize = 128;

/// The parent pointer shares a word with the color in its low bits.
const COLOR_MASK: u64 = 3;

/// Offsets within `struct rb_node`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RbLayout {
    pub parent_color: u64,
    pub right: u64,
    pub left: u64,
}

impl RbLayout {
    pub fn for_pointer_size(pointer_size: usize) -> Self {
        let ptr = pointer_size as u64;
        RbLayout {
            parent_color: 0,
            right: ptr,
            left: 2 * ptr,
        }
    }

    pub fn from_types(types: &TypeLayouts) -> Result<Self> {
        Ok(RbLayout {
            parent_color: types.field_offset("struct rb_node", "__rb_parent_color")?,
            right: types.field_offset("struct rb_node", "rb_right")?,
            left: types.field_offset("struct rb_node", "rb_left")?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RbOrder {
    InOrder,
    PreOrder,
}

/// Walks the tree hanging off a `struct rb_root` (whose only field is the root node
/// pointer). Visitors get record addresses, i.e. node address minus `node_offset`.
pub struct RbWalker<'a> {
    space: &'a AddressSpace,
    root: u64,
    node_offset: u64,
    layout: RbLayout,
    order: RbOrder,
    validate: bool,
    limits: WalkLimits<'a>,
}

impl<'a> RbWalker<'a> {
    pub fn new(space: &'a AddressSpace, root: u64, node_offset: u64) -> Self {
        RbWalker {
            space,
            root,
            node_offset,
            layout: RbLayout::for_pointer_size(space.pointer_size()),
            order: RbOrder::InOrder,
            validate: false,
            limits: WalkLimits::default(),
        }
    }

    pub fn layout(mut self, layout: RbLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn order(mut self, order: RbOrder) -> Self {
        self.order = order;
        self
    }

    /// Check that every child's parent pointer names the node it hangs off.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn limits(mut self, limits: WalkLimits<'a>) -> Self {
        self.limits = limits;
        self
    }

    pub fn collect(&self) -> (Vec<u64>, Walk) {
        let mut records = Vec::new();
        let walk = self.walk(|record| {
            records.push(record);
            ControlFlow::Continue(())
        });
        (records, walk)
    }

    pub fn walk(&self, visit: impl FnMut(u64) -> ControlFlow<()>) -> Walk {
        let mut walk = Walk::new();
        let top = match self.space.read_pointer(self.root) {
            Ok(top) => top,
            Err(err) => {
                walk.truncate(err);
                return walk;
            }
        };
        match self.order {
            RbOrder::InOrder => self.in_order(top, &mut walk, visit),
            RbOrder::PreOrder => self.pre_order(top, &mut walk, visit),
        }
        walk
    }

    fn in_order(&self, top: u64, walk: &mut Walk, mut visit: impl FnMut(u64) -> ControlFlow<()>) {
        let mut budget = Budget::new(&self.limits);
        let mut seen = HashSet::new();
        let mut stack: Vec<u64> = Vec::new();
        let mut current = (top, 0);

        loop {
            while current.0 != 0 {
                let (node, parent) = current;
                if !budget.tick(walk, node) {
                    return;
                }
                if !self.enter(node, stack.len(), &mut seen, walk) {
                    break;
                }
                let left = match self.space.read_pointer_at(node, self.layout.left) {
                    Ok(left) => left,
                    Err(err) => {
                        walk.truncate(err);
                        break;
                    }
                };
                self.check_parent(node, parent, walk);
                stack.push(node);
                current = (left, node);
            }

            let Some(node) = stack.pop() else { break };
            walk.visited += 1;
            if visit(node.wrapping_sub(self.node_offset)).is_break() {
                walk.end = WalkEnd::Stopped;
                return;
            }
            current = (self.child(node, self.layout.right, walk), node);
        }
    }

    fn pre_order(&self, top: u64, walk: &mut Walk, mut visit: impl FnMut(u64) -> ControlFlow<()>) {
        let mut budget = Budget::new(&self.limits);
        let mut seen = HashSet::new();
        let mut stack = vec![(top, 0, 0)];

        while let Some((node, parent, depth)) = stack.pop() {
            if node == 0 {
                continue;
            }
            if !budget.tick(walk, node) {
                return;
            }
            if !self.enter(node, depth, &mut seen, walk) {
                continue;
            }
            let children = self
                .space
                .read_pointer_at(node, self.layout.left)
                .and_then(|left| Ok((left, self.space.read_pointer_at(node, self.layout.right)?)));
            let (left, right) = match children {
                Ok(children) => children,
                Err(err) => {
                    walk.truncate(err);
                    continue;
                }
            };
            self.check_parent(node, parent, walk);

            walk.visited += 1;
            if visit(node.wrapping_sub(self.node_offset)).is_break() {
                walk.end = WalkEnd::Stopped;
                return;
            }
            stack.push((right, node, depth + 1));
            stack.push((left, node, depth + 1));
        }
    }

    /// False means skip the node and its subtree.
    fn enter(&self, node: u64, depth: usize, seen: &mut HashSet<u64>, walk: &mut Walk) -> bool {
        if depth >= MAX_DEPTH {
            walk.truncate(Error::corrupt(node, format!("tree is deeper than {MAX_DEPTH}")));
            return false;
        }
        if !seen.insert(node) {
            walk.truncate(Error::corrupt(node, "node appears twice in the tree"));
            return false;
        }
        true
    }

    fn check_parent(&self, node: u64, parent: u64, walk: &mut Walk) {
        if !self.validate {
            return;
        }
        match self.space.read_pointer_at(node, self.layout.parent_color) {
            Ok(word) if word & !COLOR_MASK == parent => (),
            Ok(word) => walk.note(Error::corrupt(
                node,
                format!("parent is {:#x} but expected {parent:#x}", word & !COLOR_MASK),
            )),
            Err(err) => walk.note(err),
        }
    }

    /// Unreadable children cost their subtree but not the rest of the walk.
    fn child(&self, node: u64, offset: u64, walk: &mut Walk) -> u64 {
        match self.space.read_pointer_at(node, offset) {
            Ok(child) => child,
            Err(err) => {
                walk.truncate(err);
                0
            }
        }
    }
}
