//! Walkers for the kernel's intrusive data structures. Everything is plain address
//! arithmetic over the dump: "the next thing to visit" is just a u64, cycles are caught
//! with a seen set and every walk has a step budget.
//!
//! Walks never fail outright. Anything that goes wrong part way through (an unmapped
//! pointer, a cycle, a bad parent pointer) is recorded in the returned `Walk` and the
//! walker keeps whatever it already visited.
mod hlist;
mod list;
mod radix;
mod rbtree;

pub use hlist::{HlistLayout, HlistWalker};
pub use list::{ListLayout, ListWalker};
pub use radix::{RadixLayout, RadixSchema, RadixWalker};
pub use rbtree::{RbLayout, RbOrder, RbWalker};

use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

#[derive(Clone, Copy, Debug)]
pub struct WalkLimits<'a> {
    pub max_steps: usize,

    /// Checked before every visit. Set by another thread to stop long walks.
    pub abort: Option<&'a AtomicBool>,
}

impl Default for WalkLimits<'_> {
    fn default() -> Self {
        WalkLimits {
            max_steps: DEFAULT_MAX_STEPS,
            abort: None,
        }
    }
}

impl<'a> WalkLimits<'a> {
    pub fn new(max_steps: usize) -> Self {
        WalkLimits {
            max_steps,
            abort: None,
        }
    }

    pub fn with_abort(mut self, flag: &'a AtomicBool) -> Self {
        self.abort = Some(flag);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkEnd {
    /// Every reachable node was visited.
    Completed,

    /// The visitor asked to stop.
    Stopped,

    /// The abort flag was set.
    Aborted,

    /// Part of the structure couldn't be walked, see the diagnostics.
    Truncated,
}

#[derive(Debug)]
pub struct Walk {
    pub visited: usize,
    pub end: WalkEnd,
    pub diagnostics: Vec<Error>,
}

impl Default for Walk {
    fn default() -> Self {
        Walk::new()
    }
}

impl Walk {
    pub fn new() -> Self {
        Walk {
            visited: 0,
            end: WalkEnd::Completed,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.end == WalkEnd::Completed
    }

    /// Folds another walk over the same structure into this one, e.g. one per hash
    /// bucket. An abort anywhere aborts the whole.
    pub fn absorb(&mut self, other: Walk) {
        self.visited += other.visited;
        self.diagnostics.extend(other.diagnostics);
        self.end = match (self.end, other.end) {
            (WalkEnd::Aborted, _) | (_, WalkEnd::Aborted) => WalkEnd::Aborted,
            (WalkEnd::Truncated, _) | (_, WalkEnd::Truncated) => WalkEnd::Truncated,
            (WalkEnd::Stopped, _) | (_, WalkEnd::Stopped) => WalkEnd::Stopped,
            _ => WalkEnd::Completed,
        };
    }

    /// Records a problem that doesn't lose any nodes.
    fn note(&mut self, err: Error) {
        warn!("{err}");
        self.diagnostics.push(err);
    }

    /// Records a problem that cost part of the structure.
    fn truncate(&mut self, err: Error) {
        self.note(err);
        if self.end == WalkEnd::Completed {
            self.end = WalkEnd::Truncated;
        }
    }
}

struct Budget<'l, 'a> {
    limits: &'l WalkLimits<'a>,
    steps: usize,
}

impl<'l, 'a> Budget<'l, 'a> {
    fn new(limits: &'l WalkLimits<'a>) -> Self {
        Budget { limits, steps: 0 }
    }

    /// False once the walk has to end. `walk.end` says why.
    fn tick(&mut self, walk: &mut Walk, addr: u64) -> bool {
        if self.limits.abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            walk.end = WalkEnd::Aborted;
            return false;
        }
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            walk.truncate(Error::corrupt(
                addr,
                format!("gave up after {} steps", self.limits.max_steps),
            ));
            return false;
        }
        true
    }
}
