use super::{Budget, Walk, WalkEnd, WalkLimits};
use crate::debug::TypeLayouts;
use crate::error::{Error, Result};
use crate::memory::AddressSpace;
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Offsets of `hlist_head.first`, `hlist_node.next` and `hlist_node.pprev`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HlistLayout {
    pub first: u64,
    pub next: u64,
    pub pprev: u64,
}

impl HlistLayout {
    pub fn for_pointer_size(pointer_size: usize) -> Self {
        HlistLayout {
            first: 0,
            next: 0,
            pprev: pointer_size as u64,
        }
    }

    pub fn from_types(types: &TypeLayouts) -> Result<Self> {
        Ok(HlistLayout {
            first: types.field_offset("struct hlist_head", "first")?,
            next: types.field_offset("struct hlist_node", "next")?,
            pprev: types.field_offset("struct hlist_node", "pprev")?,
        })
    }
}

/// Walks a NULL terminated hash list. The head only holds a pointer to the first node.
pub struct HlistWalker<'a> {
    space: &'a AddressSpace,
    head: u64,
    link_offset: u64,
    layout: HlistLayout,
    validate: bool,
    limits: WalkLimits<'a>,
}

impl<'a> HlistWalker<'a> {
    pub fn new(space: &'a AddressSpace, head: u64, link_offset: u64) -> Self {
        HlistWalker {
            space,
            head,
            link_offset,
            layout: HlistLayout::for_pointer_size(space.pointer_size()),
            validate: false,
            limits: WalkLimits::default(),
        }
    }

    pub fn layout(mut self, layout: HlistLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Check that each node's `pprev` points at the slot that pointed to it.
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

    pub fn walk(&self, mut visit: impl FnMut(u64) -> ControlFlow<()>) -> Walk {
        let mut walk = Walk::new();
        let mut budget = Budget::new(&self.limits);
        let mut seen = HashSet::new();

        let mut slot = self.head.wrapping_add(self.layout.first);
        let mut node = match self.space.read_pointer_at(self.head, self.layout.first) {
            Ok(first) => first,
            Err(err) => {
                walk.truncate(err);
                return walk;
            }
        };
        while node != 0 {
            if !budget.tick(&mut walk, node) {
                break;
            }
            if !seen.insert(node) {
                walk.truncate(Error::corrupt(node, "hlist loops back on itself"));
                break;
            }
            let next = match self.space.read_pointer_at(node, self.layout.next) {
                Ok(next) => next,
                Err(err) => {
                    walk.truncate(err);
                    break;
                }
            };
            if self.validate {
                match self.space.read_pointer_at(node, self.layout.pprev) {
                    Ok(pprev) if pprev == slot => (),
                    Ok(pprev) => walk.note(Error::corrupt(
                        node,
                        format!("pprev is {pprev:#x} but expected {slot:#x}"),
                    )),
                    Err(err) => walk.note(err),
                }
            }

            walk.visited += 1;
            if visit(node.wrapping_sub(self.link_offset)).is_break() {
                walk.end = WalkEnd::Stopped;
                break;
            }
            slot = node.wrapping_add(self.layout.next);
            node = next;
        }
        walk
    }
}
