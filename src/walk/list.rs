use super::{Budget, Walk, WalkEnd, WalkLimits};
use crate::debug::TypeLayouts;
use crate::error::{Error, Result};
use crate::memory::AddressSpace;
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Where `next` and `prev` live inside `struct list_head`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListLayout {
    pub next: u64,
    pub prev: u64,
}

impl ListLayout {
    pub fn for_pointer_size(pointer_size: usize) -> Self {
        ListLayout {
            next: 0,
            prev: pointer_size as u64,
        }
    }

    pub fn from_types(types: &TypeLayouts) -> Result<Self> {
        Ok(ListLayout {
            next: types.field_offset("struct list_head", "next")?,
            prev: types.field_offset("struct list_head", "prev")?,
        })
    }
}

/// Walks a circular doubly linked list (`struct list_head`) starting at a head that is
/// not itself an entry. Visitors get record addresses, i.e. link address minus
/// `link_offset`.
pub struct ListWalker<'a> {
    space: &'a AddressSpace,
    head: u64,
    link_offset: u64,
    layout: ListLayout,
    validate: bool,
    sentinel: Option<u64>,
    limits: WalkLimits<'a>,
}

impl<'a> ListWalker<'a> {
    pub fn new(space: &'a AddressSpace, head: u64, link_offset: u64) -> Self {
        ListWalker {
            space,
            head,
            link_offset,
            layout: ListLayout::for_pointer_size(space.pointer_size()),
            validate: false,
            sentinel: None,
            limits: WalkLimits::default(),
        }
    }

    pub fn layout(mut self, layout: ListLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Check that each node's back pointer names the node we came from.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// An extra link address that also ends the walk.
    pub fn sentinel(mut self, addr: u64) -> Self {
        self.sentinel = Some(addr);
        self
    }

    pub fn limits(mut self, limits: WalkLimits<'a>) -> Self {
        self.limits = limits;
        self
    }

    pub fn walk(&self, visit: impl FnMut(u64) -> ControlFlow<()>) -> Walk {
        self.walk_dir(self.layout.next, self.layout.prev, visit)
    }

    /// Same as walk but follows `prev` pointers.
    pub fn walk_reverse(&self, visit: impl FnMut(u64) -> ControlFlow<()>) -> Walk {
        self.walk_dir(self.layout.prev, self.layout.next, visit)
    }

    pub fn collect(&self) -> (Vec<u64>, Walk) {
        let mut records = Vec::new();
        let walk = self.walk(|record| {
            records.push(record);
            ControlFlow::Continue(())
        });
        (records, walk)
    }

    fn walk_dir(&self, step: u64, back: u64, mut visit: impl FnMut(u64) -> ControlFlow<()>) -> Walk {
        let mut walk = Walk::new();
        let mut budget = Budget::new(&self.limits);
        let mut seen = HashSet::new();

        let mut from = self.head;
        let mut link = match self.space.read_pointer_at(self.head, step) {
            Ok(link) => link,
            Err(err) => {
                walk.truncate(err);
                return walk;
            }
        };
        while link != self.head && Some(link) != self.sentinel {
            if link == 0 {
                walk.truncate(Error::corrupt(from, "NULL link in a circular list"));
                break;
            }
            if !budget.tick(&mut walk, link) {
                break;
            }
            if !seen.insert(link) {
                walk.truncate(Error::corrupt(link, "list loops without returning to its head"));
                break;
            }
            let next = match self.space.read_pointer_at(link, step) {
                Ok(next) => next,
                Err(err) => {
                    walk.truncate(err);
                    break;
                }
            };
            if self.validate {
                match self.space.read_pointer_at(link, back) {
                    Ok(ptr) if ptr == from => (),
                    Ok(ptr) => walk.note(Error::corrupt(
                        link,
                        format!("back link is {ptr:#x} but expected {from:#x}"),
                    )),
                    Err(err) => walk.note(err),
                }
            }

            walk.visited += 1;
            if visit(link.wrapping_sub(self.link_offset)).is_break() {
                walk.end = WalkEnd::Stopped;
                break;
            }
            from = link;
            link = next;
        }
        walk
    }
}
