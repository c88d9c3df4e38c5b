use crate::debug::{
    Candidate, KernelVersion, LayoutEntry, StructView, SymbolLookup, TypeLayouts, VersionRange,
    VersionedLayout,
};
use crate::error::Result;
use crate::memory::AddressSpace;
use crate::walk::{DEFAULT_MAX_STEPS, HlistLayout, ListLayout, RadixLayout, RadixSchema, RbLayout, WalkLimits};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const V4_5: KernelVersion = KernelVersion::new(4, 5, 0);
const V4_20: KernelVersion = KernelVersion::new(4, 20, 0);
const V5_14: KernelVersion = KernelVersion::new(5, 14, 0);
const V6_4: KernelVersion = KernelVersion::new(6, 4, 0);

/// Fields whose names changed between kernel versions.
pub const LAYOUT: &[LayoutEntry] = &[
    LayoutEntry {
        key: "module.base",
        candidates: &[
            Candidate::new(VersionRange::before(V4_5), "struct module", "module_core"),
            Candidate::new(VersionRange::between(V4_5, V6_4), "struct module", "core_layout.base"),
            Candidate::new(VersionRange::since(V6_4), "struct module", "mem[0].base"),
        ],
    },
    LayoutEntry {
        key: "module.size",
        candidates: &[
            Candidate::new(VersionRange::before(V4_5), "struct module", "core_size"),
            Candidate::new(VersionRange::between(V4_5, V6_4), "struct module", "core_layout.size"),
            Candidate::new(VersionRange::since(V6_4), "struct module", "mem[0].size"),
        ],
    },
    LayoutEntry {
        key: "address_space.pages",
        candidates: &[
            Candidate::new(VersionRange::before(V4_20), "struct address_space", "page_tree"),
            Candidate::new(VersionRange::since(V4_20), "struct address_space", "i_pages"),
        ],
    },
    LayoutEntry {
        key: "task_struct.state",
        candidates: &[
            Candidate::new(VersionRange::before(V5_14), "struct task_struct", "state"),
            Candidate::new(VersionRange::since(V5_14), "struct task_struct", "__state"),
        ],
    },
];

/// Everything a report needs to look at one dump. Immutable apart from the abort flag
/// so any number of reports can share it across threads.
pub struct Session {
    pub space: AddressSpace,
    pub types: TypeLayouts,
    pub symbols: Box<dyn SymbolLookup>,
    pub version: KernelVersion,
    pub layout: VersionedLayout,
    pub explain: bool,
    pub max_steps: usize,
    abort: AtomicBool,
}

impl Session {
    pub fn new(
        space: AddressSpace,
        types: TypeLayouts,
        symbols: Box<dyn SymbolLookup>,
        version: KernelVersion,
    ) -> Self {
        let layout = VersionedLayout::resolve(LAYOUT, version, &types);
        for key in layout.missing() {
            debug!("no layout for {key} in kernel {version}");
        }
        Session {
            space,
            types,
            symbols,
            version,
            layout,
            explain: false,
            max_steps: DEFAULT_MAX_STEPS,
            abort: AtomicBool::new(false),
        }
    }

    /// Asks every walk in progress to stop. Reports that haven't started are skipped.
    pub fn abort(&self) {
        warn!("aborting");
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn abort_flag(&self) -> &AtomicBool {
        &self.abort
    }

    pub fn limits(&self) -> WalkLimits<'_> {
        WalkLimits::new(self.max_steps).with_abort(&self.abort)
    }

    pub fn symbol(&self, name: &str) -> Result<u64> {
        self.symbols.address_of(name)
    }

    pub fn view<'a>(&'a self, addr: u64, type_name: &'a str) -> StructView<'a> {
        StructView::new(&self.space, &self.types, addr, type_name)
    }

    pub fn pointer_size(&self) -> usize {
        self.space.pointer_size()
    }

    // Walker layouts come from the metadata when it has them.

    pub fn list_layout(&self) -> ListLayout {
        ListLayout::from_types(&self.types).unwrap_or_else(|_| ListLayout::for_pointer_size(self.pointer_size()))
    }

    pub fn hlist_layout(&self) -> HlistLayout {
        HlistLayout::from_types(&self.types).unwrap_or_else(|_| HlistLayout::for_pointer_size(self.pointer_size()))
    }

    pub fn rb_layout(&self) -> RbLayout {
        RbLayout::from_types(&self.types).unwrap_or_else(|_| RbLayout::for_pointer_size(self.pointer_size()))
    }

    pub fn radix_schema(&self) -> RadixSchema {
        RadixSchema::for_version(self.version)
    }

    pub fn radix_layout(&self) -> RadixLayout {
        RadixLayout::from_types(&self.types, self.radix_schema(), self.pointer_size())
            .unwrap_or_else(|_| RadixLayout::for_pointer_size(self.pointer_size()))
    }
}
