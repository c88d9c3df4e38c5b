use super::{Budget, Walk, WalkEnd, WalkLimits};
use crate::debug::{KernelVersion, TypeLayouts};
use crate::error::{Error, Result};
use crate::memory::{AddressSpace, offset_addr};
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Largest pointer value the xarray uses for internal entries that aren't nodes
/// (sibling and retry entries).
const XA_MAX_SPECIAL: u64 = 4096;

/// Page cache radix trees became xarrays in 4.20. The two encode internal node
/// pointers with different tags in the low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadixSchema {
    RadixTree,
    XArray,
}

impl RadixSchema {
    pub fn for_version(version: KernelVersion) -> Self {
        if version >= KernelVersion::new(4, 20, 0) {
            RadixSchema::XArray
        } else {
            RadixSchema::RadixTree
        }
    }

    pub fn internal_tag(self) -> u64 {
        match self {
            RadixSchema::RadixTree => 1,
            RadixSchema::XArray => 2,
        }
    }

    pub fn is_internal(self, entry: u64) -> bool {
        entry & 3 == self.internal_tag()
    }

    pub fn is_node(self, entry: u64) -> bool {
        match self {
            RadixSchema::RadixTree => self.is_internal(entry),
            RadixSchema::XArray => self.is_internal(entry) && entry > XA_MAX_SPECIAL,
        }
    }

    pub fn to_node(self, entry: u64) -> u64 {
        entry - self.internal_tag()
    }

    /// Exceptional (radix tree) or value (xarray) entries, e.g. page cache shadows.
    pub fn is_value(self, entry: u64) -> bool {
        match self {
            RadixSchema::RadixTree => entry & 3 == 2,
            RadixSchema::XArray => entry & 1 == 1,
        }
    }

    /// (root type, root field, node type)
    pub fn type_names(self) -> (&'static str, &'static str, &'static str) {
        match self {
            RadixSchema::RadixTree => ("struct radix_tree_root", "rnode", "struct radix_tree_node"),
            RadixSchema::XArray => ("struct xarray", "xa_head", "struct xa_node"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadixLayout {
    /// Offset of the head entry within the root.
    pub root: u64,
    pub shift: u64,
    pub slots: u64,

    /// log2 of the number of slots per node, 6 on most configs.
    pub chunk_shift: u32,
}

impl RadixLayout {
    /// Layout of a 64-bit kernel without debug options. The root starts with a lock and
    /// a flags word, nodes with four u8s (shift first), parent, root/array and a list head.
    pub fn for_pointer_size(pointer_size: usize) -> Self {
        let ptr = pointer_size as u64;
        RadixLayout {
            root: 8,
            shift: 0,
            slots: 5 * ptr,
            chunk_shift: 6,
        }
    }

    pub fn from_types(types: &TypeLayouts, schema: RadixSchema, pointer_size: usize) -> Result<Self> {
        let (root_type, root_field, node_type) = schema.type_names();
        let slots = types.field(node_type, "slots")?;
        let count = slots.size / pointer_size as u64;
        let chunk_shift = if count.is_power_of_two() { count.trailing_zeros() } else { 6 };
        Ok(RadixLayout {
            root: types.field_offset(root_type, root_field)?,
            shift: types.field_offset(node_type, "shift")?,
            slots: slots.offset,
            chunk_shift,
        })
    }
}

enum Pending {
    Node { node: u64, base: u64, shift: Option<u64> },
    Leaf { index: u64, entry: u64 },
}

/// Walks a radix tree or xarray delivering `(index, entry)` for every leaf in index
/// order.
pub struct RadixWalker<'a> {
    space: &'a AddressSpace,
    root: u64,
    schema: RadixSchema,
    layout: RadixLayout,
    limits: WalkLimits<'a>,
}

impl<'a> RadixWalker<'a> {
    pub fn new(space: &'a AddressSpace, root: u64, schema: RadixSchema, layout: RadixLayout) -> Self {
        RadixWalker {
            space,
            root,
            schema,
            layout,
            limits: WalkLimits::default(),
        }
    }

    pub fn limits(mut self, limits: WalkLimits<'a>) -> Self {
        self.limits = limits;
        self
    }

    pub fn collect(&self) -> (Vec<(u64, u64)>, Walk) {
        let mut entries = Vec::new();
        let walk = self.walk(|index, entry| {
            entries.push((index, entry));
            ControlFlow::Continue(())
        });
        (entries, walk)
    }

    pub fn walk(&self, mut visit: impl FnMut(u64, u64) -> ControlFlow<()>) -> Walk {
        let mut walk = Walk::new();
        let mut budget = Budget::new(&self.limits);
        let mut seen = HashSet::new();

        let head = match self.space.read_pointer_at(self.root, self.layout.root) {
            Ok(head) => head,
            Err(err) => {
                walk.truncate(err);
                return walk;
            }
        };
        let mut stack = Vec::new();
        if let Some(pending) = self.classify(head, 0, None) {
            stack.push(pending);
        }

        while let Some(pending) = stack.pop() {
            match pending {
                Pending::Leaf { index, entry } => {
                    if !budget.tick(&mut walk, entry) {
                        break;
                    }
                    walk.visited += 1;
                    if visit(index, entry).is_break() {
                        walk.end = WalkEnd::Stopped;
                        break;
                    }
                }
                Pending::Node { node, base, shift } => {
                    if !budget.tick(&mut walk, node) {
                        break;
                    }
                    if !seen.insert(node) {
                        walk.truncate(Error::corrupt(node, "node appears twice in the tree"));
                        continue;
                    }
                    if let Err(err) = self.expand(node, base, shift, &mut stack) {
                        walk.truncate(err);
                    }
                }
            }
        }
        walk
    }

    fn classify(&self, entry: u64, index: u64, shift: Option<u64>) -> Option<Pending> {
        if entry == 0 || (self.schema.is_internal(entry) && !self.schema.is_node(entry)) {
            None
        } else if self.schema.is_node(entry) {
            Some(Pending::Node {
                node: self.schema.to_node(entry),
                base: index,
                shift,
            })
        } else {
            Some(Pending::Leaf { index, entry })
        }
    }

    /// Pushes a node's children in reverse so they pop off in index order.
    fn expand(&self, node: u64, base: u64, expected: Option<u64>, stack: &mut Vec<Pending>) -> Result<()> {
        let shift = self.space.read_u8(offset_addr(node, self.layout.shift)?)? as u64;
        if expected.is_some_and(|e| e != shift) || shift >= 64 {
            return Err(Error::corrupt(
                node,
                format!("shift is {shift} but expected {}", expected.unwrap_or(0)),
            ));
        }
        let child_shift = shift.checked_sub(self.layout.chunk_shift as u64);

        let ptr = self.space.pointer_size() as u64;
        let count = 1u64 << self.layout.chunk_shift;
        let mut children = Vec::new();
        for i in 0..count {
            let entry = self.space.read_pointer_at(node, self.layout.slots + i * ptr)?;
            let index = base
                .checked_add(i << shift)
                .ok_or_else(|| Error::corrupt(node, format!("index overflows below {base:#x}")))?;
            match self.classify(entry, index, child_shift) {
                Some(Pending::Node { .. }) if child_shift.is_none() => {
                    return Err(Error::corrupt(node, "leaf node has a child node"));
                }
                Some(pending) => children.push(pending),
                None => (),
            }
        }
        stack.extend(children.into_iter().rev());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::testing::{BASE, Image};

    const ROOT: u64 = BASE;
    const NODE_SIZE: u64 = 0x240;

    /// Builds a two or three level tree holding `keys` and returns the image. Node n
    /// lives at BASE + 0x100 + n * NODE_SIZE. Leaves are `key << 4` so they carry no tag.
    fn tree(schema: RadixSchema, keys: &[u64], height: u32) -> Image {
        let layout = RadixLayout::for_pointer_size(8);
        let mut image = Image::new(0x10_0000);
        let mut next_node = 0;
        let mut alloc = |image: &mut Image, shift: u64| {
            let node = BASE + 0x100 + next_node * NODE_SIZE;
            next_node += 1;
            image.put_u8(node + layout.shift, shift as u8);
            node
        };

        let top_shift = 6 * (height as u64 - 1);
        let top = alloc(&mut image, top_shift);
        image.put_u64(ROOT + layout.root, top + schema.internal_tag());
        let mut nodes = std::collections::HashMap::new();
        for &key in keys {
            let mut node = top;
            let mut shift = top_shift;
            let mut prefix = 0;
            while shift > 0 {
                let slot = (key >> shift) & 63;
                prefix = (prefix << 6) | slot;
                let child = match nodes.get(&(shift, prefix)) {
                    Some(&child) => child,
                    None => {
                        let child = alloc(&mut image, shift - 6);
                        image.put_u64(node + layout.slots + slot * 8, child + schema.internal_tag());
                        nodes.insert((shift, prefix), child);
                        child
                    }
                };
                node = child;
                shift -= 6;
            }
            image.put_u64(node + layout.slots + (key & 63) * 8, key << 4);
        }
        image
    }

    fn walk(schema: RadixSchema, image: Image) -> (Vec<(u64, u64)>, Walk) {
        let space = image.build();
        let layout = RadixLayout::for_pointer_size(8);
        RadixWalker::new(&space, ROOT, schema, layout).collect()
    }

    #[test]
    fn same_leaves_under_both_schemas() {
        let keys = [3u64, 64, 65, 1000, 4095, 70_000];
        for schema in [RadixSchema::RadixTree, RadixSchema::XArray] {
            let (entries, walk) = walk(schema, tree(schema, &keys, 3));
            let expected: Vec<(u64, u64)> = keys.iter().map(|&k| (k, k << 4)).collect();
            assert_eq!(entries, expected, "{schema:?}");
            assert!(walk.is_complete());
        }
    }

    #[test]
    fn wrong_tag_finds_nothing_useful() {
        // Walking an xarray as if it were a radix tree treats the head as a leaf.
        let image = tree(RadixSchema::XArray, &[5], 2);
        let (entries, _) = walk(RadixSchema::RadixTree, image);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 0);
    }

    #[test]
    fn direct_leaf_at_root() {
        let mut image = Image::new(0x100);
        image.put_u64(ROOT + 8, 0x1234_5670);
        let (entries, walk) = walk(RadixSchema::XArray, image);
        assert_eq!(entries, [(0, 0x1234_5670)]);
        assert!(walk.is_complete());
    }

    #[test]
    fn value_and_sibling_entries() {
        let schema = RadixSchema::XArray;
        assert!(schema.is_value(0x1235));
        assert!(schema.is_internal(0x402) && !schema.is_node(0x402));
        assert!(schema.is_node(0xffff_ff80_1234_5002));
        assert!(RadixSchema::RadixTree.is_value(0x1236));
        assert_eq!(RadixSchema::for_version(KernelVersion::new(4, 19, 0)), RadixSchema::RadixTree);
        assert_eq!(RadixSchema::for_version(KernelVersion::new(5, 4, 0)), RadixSchema::XArray);

        let mut image = tree(schema, &[1, 2], 1);
        let layout = RadixLayout::for_pointer_size(8);
        let top = BASE + 0x100;
        image.put_u64(top + layout.slots + 3 * 8, 0x402); // retry entry
        image.put_u64(top + layout.slots + 4 * 8, 0x81); // value entry
        let (entries, _) = walk(schema, image);
        assert_eq!(entries, [(1, 0x10), (2, 0x20), (4, 0x81)]);
    }

    #[test]
    fn bad_shift_truncates_that_branch() {
        let schema = RadixSchema::RadixTree;
        let mut image = tree(schema, &[1, 100], 2);
        let layout = RadixLayout::for_pointer_size(8);
        // Second node allocated holds key 1, give it a bogus shift.
        image.put_u8(BASE + 0x100 + NODE_SIZE + layout.shift, 12);
        let (entries, walk) = walk(schema, image);
        assert_eq!(entries, [(100, 100 << 4)]);
        assert_eq!(walk.end, WalkEnd::Truncated);
    }

    #[test]
    fn layout_from_types() {
        use crate::debug::TypeDescriptor;
        let mut types = TypeLayouts::default();
        types
            .insert("struct xarray", TypeDescriptor::new(16).field("xa_lock", 0, 4).field("xa_head", 8, 8))
            .insert(
                "struct xa_node",
                TypeDescriptor::new(576).field("shift", 0, 1).field("slots", 40, 512),
            );
        let layout = RadixLayout::from_types(&types, RadixSchema::XArray, 8).unwrap();
        assert_eq!(layout, RadixLayout::for_pointer_size(8));
    }

    #[test]
    fn pointers_near_the_top_of_memory() {
        let schema = RadixSchema::XArray;
        let mut image = Image::new(0x100);
        image.put_u64(ROOT + 8, 0xffff_ffff_ffff_fff8 | schema.internal_tag());
        let space = image.build();
        let layout = RadixLayout {
            shift: 0x10,
            ..RadixLayout::for_pointer_size(8)
        };
        let (entries, walk) = RadixWalker::new(&space, ROOT, schema, layout).collect();
        assert!(entries.is_empty());
        assert_eq!(walk.end, WalkEnd::Truncated);
        assert!(walk.diagnostics[0].is_unmapped());

        let (_, walk) = RadixWalker::new(&space, 0xffff_ffff_ffff_fff8, schema, layout).collect();
        assert!(walk.diagnostics[0].is_unmapped());
    }
}
