mod node;

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};
use rand::rngs::SmallRng;
use serde::Serialize;

pub use node::PageTableEntry;
use node::{Node, NodeId, NodeSlots};

use crate::config::{SimConfig, VirtualAddressWidth};
use crate::modules::allocation::{
    AllocationContext, AllocationStrategyModule, PlacementError,
};
use crate::modules::frame_pool::{FrameId, FramePool};
use crate::util::{ceil_log2, div_ceil, format_physical_frame, format_virtual_address};

/// Why a frame is held by a page table. Frees dispatch on this to return
/// each frame to its originating pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Data { page: u64 },
    Table { level: u32 },
    SwapPage { page: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTableError {
    /// Page number outside `[1, num_pages]`.
    OutOfRange { page: u64 },
    /// The table pool ran dry while building a node.
    TableFramesExhausted,
    /// An interior level was missing during a walk that may not grow the
    /// tree.
    WalkBroken { page: u64 },
    /// The placement policy rejected the request.
    Placement(PlacementError),
    /// Data and swap pool were both empty during fault handling.
    PoolsExhausted { page: u64 },
}

impl fmt::Display for PageTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageTableError::OutOfRange { page } => write!(f, "page {} is out of range", page),
            PageTableError::TableFramesExhausted => {
                write!(f, "no table frame left for a new node")
            }
            PageTableError::WalkBroken { page } => {
                write!(f, "interior table missing on the walk to page {}", page)
            }
            PageTableError::Placement(inner) => write!(f, "{}", inner),
            PageTableError::PoolsExhausted { page } => {
                write!(f, "no frame left to install page {}", page)
            }
        }
    }
}

impl From<PlacementError> for PageTableError {
    fn from(inner: PlacementError) -> Self {
        PageTableError::Placement(inner)
    }
}

/// One exported row of a page table, in the result-document encoding.
#[derive(Debug, Clone, Serialize)]
pub struct PageMapping {
    pub process_id: String,
    pub page_number: u64,
    pub virtual_address: String,
    pub physical_frame: String,
    pub in_ram: bool,
}

/// Number of levels a table of `num_pages` pages needs, between 1 and 4.
pub(crate) fn calculate_levels(num_pages: u64, bits_per_level: u32) -> u32 {
    let index_bits = ceil_log2(num_pages);
    let levels = (index_bits + bits_per_level - 1) / bits_per_level;
    levels.clamp(1, 4)
}

/// Per-process hierarchical translation structure.
///
/// The tree lives in a flat arena indexed by node id; node 0 is the root.
/// Interior slots hold `Option<NodeId>`, so a slot is valid exactly when
/// its child exists. Levels are fixed at construction: pages only ever
/// install leaf PTEs after the initial allocation built the interior.
pub struct PageTable {
    process_id: String,
    num_pages: u64,
    page_size_bytes: u64,
    entry_size: u64,
    width: VirtualAddressWidth,
    entries_per_table: u64,
    bits_per_level: u32,
    levels: u32,
    /// RAM share hint derived from `frame_percent`; informational.
    max_frames: u64,
    nodes: Vec<Node>,
    top_level_frame: FrameId,
    /// Reverse index, 1-based page number to frame. Authoritative for
    /// `lookup`.
    entries: HashMap<u64, FrameId>,
    ram_claims: HashMap<FrameId, Claim>,
    swap_claims: HashMap<FrameId, Claim>,
}

impl PageTable {
    pub fn new(process_id: &str, num_pages: u64, config: &SimConfig, frame_percent: f64) -> Self {
        let entries_per_table = config.entries_per_table();
        let bits_per_level = entries_per_table.trailing_zeros();
        let levels = calculate_levels(num_pages, bits_per_level);

        let root = if levels == 1 {
            Node::leaf(num_pages as usize)
        } else {
            Node::interior(entries_per_table as usize)
        };

        debug!(
            "process {}: page table with {} levels, {} pages, {} entries per table",
            process_id, levels, num_pages, entries_per_table
        );

        Self {
            process_id: process_id.to_string(),
            num_pages,
            page_size_bytes: config.page_size_bytes,
            entry_size: config.entry_size(),
            width: config.virtual_address_width,
            entries_per_table,
            bits_per_level,
            levels,
            max_frames: (config.data_frames() as f64 * frame_percent / 100.0) as u64,
            nodes: vec![root],
            top_level_frame: 0,
            entries: HashMap::new(),
            ram_claims: HashMap::new(),
            swap_claims: HashMap::new(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn top_level_frame(&self) -> FrameId {
        self.top_level_frame
    }

    pub fn max_frames(&self) -> u64 {
        self.max_frames
    }

    pub fn ram_claims(&self) -> &HashMap<FrameId, Claim> {
        &self.ram_claims
    }

    pub fn swap_claims(&self) -> &HashMap<FrameId, Claim> {
        &self.swap_claims
    }

    /// Builds the full tree and installs every page of the process.
    ///
    /// The root and every interior node take one frame each from the
    /// table pool; data pages are placed by `strategy`, spilling into
    /// swap once the data pool runs dry. On failure the caller owns the
    /// rollback: `free_frames` and `free_swap_frames` return whatever was
    /// partially claimed.
    pub fn allocate(
        &mut self,
        strategy: &mut dyn AllocationStrategyModule,
        ctx: &mut AllocationContext,
        data_pool: &mut FramePool,
        table_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        rng: &mut SmallRng,
    ) -> Result<(), PageTableError> {
        let root_frame = table_pool
            .take_random(rng)
            .ok_or(PageTableError::TableFramesExhausted)?;
        self.top_level_frame = root_frame;
        self.nodes[0].table_frame = root_frame;
        self.ram_claims.insert(root_frame, Claim::Table { level: 1 });
        trace!(
            "process {}: root table in frame {}",
            self.process_id,
            root_frame
        );

        if self.num_pages == 0 {
            return Ok(());
        }

        let placement = strategy.allocate(ctx, self.num_pages, data_pool, swap_pool, rng)?;
        let ram_pages = placement.ram.len() as u64;

        for page in 1..=self.num_pages {
            let (frame, in_ram) = if page <= ram_pages {
                (placement.ram[(page - 1) as usize], true)
            } else {
                (placement.swap[(page - ram_pages - 1) as usize], false)
            };
            self.set_page_entry(page, frame, in_ram, table_pool, rng)?;
            self.entries.insert(page, frame);
            if in_ram {
                self.ram_claims.insert(frame, Claim::Data { page });
            } else {
                self.swap_claims.insert(frame, Claim::SwapPage { page });
            }
        }

        if let Some(&highest) = placement.ram.iter().max() {
            ctx.last_used_frame = ctx.last_used_frame.max(highest);
        }

        debug!(
            "process {}: allocated {} pages in RAM, {} in swap, {} table nodes",
            self.process_id,
            ram_pages,
            self.num_pages - ram_pages,
            self.nodes.len()
        );
        Ok(())
    }

    /// Authoritative page-to-frame translation, 1-based.
    pub fn lookup(&self, page_number: u64) -> Option<FrameId> {
        if page_number < 1 || page_number > self.num_pages {
            return None;
        }
        self.entries.get(&page_number).copied()
    }

    /// Walks the tree for `virtual_address` and reports whether the
    /// reference faults: a broken walk, an uninstalled page or a page
    /// living in swap all do.
    pub fn access(&self, virtual_address: u64) -> bool {
        let page_number = virtual_address / self.page_size_bytes + 1;
        if page_number > self.num_pages {
            return true;
        }
        match self.walk_leaf(page_number - 1) {
            Some(entry) if entry.valid => !entry.in_ram,
            _ => true,
        }
    }

    /// Installs a frame for a faulting page: data RAM first, swap as the
    /// fallback. The interior path must already exist; faults never grow
    /// the tree.
    pub fn handle_page_fault(
        &mut self,
        page_number: u64,
        data_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        rng: &mut SmallRng,
    ) -> Result<FrameId, PageTableError> {
        if page_number < 1 || page_number > self.num_pages {
            return Err(PageTableError::OutOfRange { page: page_number });
        }
        if self.walk_leaf(page_number - 1).is_none() {
            return Err(PageTableError::WalkBroken { page: page_number });
        }

        let (frame, in_ram) = if let Some(frame) = data_pool.take_random(rng) {
            (frame, true)
        } else if let Some(frame) = swap_pool.take_random(rng) {
            (frame, false)
        } else {
            return Err(PageTableError::PoolsExhausted { page: page_number });
        };

        let entry = self
            .walk_leaf_mut(page_number - 1)
            .expect("walk was just checked");
        *entry = PageTableEntry {
            frame,
            valid: true,
            in_ram,
        };
        self.entries.insert(page_number, frame);
        if in_ram {
            self.ram_claims.insert(frame, Claim::Data { page: page_number });
        } else {
            self.swap_claims
                .insert(frame, Claim::SwapPage { page: page_number });
        }

        trace!(
            "process {}: fault on page {} resolved to frame {} (in ram: {})",
            self.process_id,
            page_number,
            frame,
            in_ram
        );
        Ok(frame)
    }

    /// Returns every RAM frame to its pool: table claims to the table
    /// pool, data claims to the data pool.
    pub fn free_frames(&mut self, data_pool: &mut FramePool, table_pool: &mut FramePool) {
        for (frame, claim) in self.ram_claims.drain() {
            match claim {
                Claim::Table { .. } => table_pool.release(frame),
                _ => data_pool.release(frame),
            }
        }
    }

    /// Returns every swap frame to the swap pool.
    pub fn free_swap_frames(&mut self, swap_pool: &mut FramePool) {
        for (frame, _) in self.swap_claims.drain() {
            swap_pool.release(frame);
        }
    }

    /// One row per page of the process, in the export encoding.
    pub fn export_table(&self) -> Vec<PageMapping> {
        (1..=self.num_pages)
            .map(|page_number| {
                let (frame, in_ram) = match self.walk_leaf(page_number - 1) {
                    Some(entry) if entry.valid => (entry.frame, entry.in_ram),
                    _ => (0, false),
                };
                PageMapping {
                    process_id: self.process_id.clone(),
                    page_number,
                    virtual_address: format_virtual_address(
                        (page_number - 1) * self.page_size_bytes,
                        self.width,
                    ),
                    physical_frame: format_physical_frame(frame, in_ram),
                    in_ram,
                }
            })
            .collect()
    }

    /// Bytes occupied by every allocated node of this table.
    pub fn size_bytes(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| node.entry_count() * self.entry_size)
            .sum()
    }

    /// Size a fully built table of `num_pages` pages will occupy, without
    /// building it. Used for the aggregate footprint check before any
    /// frame moves.
    pub fn estimated_size_bytes(num_pages: u64, entries_per_table: u64, entry_size: u64) -> u64 {
        let bits_per_level = entries_per_table.trailing_zeros();
        let levels = calculate_levels(num_pages, bits_per_level);
        if levels == 1 {
            return num_pages * entry_size;
        }

        let mut nodes = 1; // root
        let mut per_level = num_pages;
        for _ in 2..=levels {
            per_level = div_ceil(per_level, entries_per_table);
            nodes += per_level;
        }
        nodes * entries_per_table * entry_size
    }

    /// Slot index of `p0` at `level` (levels count from 1 at the root).
    fn slot_index(&self, p0: u64, level: u32) -> usize {
        if self.levels == 1 {
            return p0 as usize;
        }
        let shift = (self.levels - level) * self.bits_per_level;
        ((p0 >> shift) & (self.entries_per_table - 1)) as usize
    }

    fn walk_leaf(&self, p0: u64) -> Option<&PageTableEntry> {
        let mut node: NodeId = 0;
        for level in 1..self.levels {
            let index = self.slot_index(p0, level);
            match &self.nodes[node].slots {
                NodeSlots::Interior(slots) => node = (*slots.get(index)?)?,
                NodeSlots::Leaf(_) => return None,
            }
        }
        let index = self.slot_index(p0, self.levels);
        match &self.nodes[node].slots {
            NodeSlots::Leaf(slots) => slots.get(index),
            NodeSlots::Interior(_) => None,
        }
    }

    fn walk_leaf_mut(&mut self, p0: u64) -> Option<&mut PageTableEntry> {
        let mut node: NodeId = 0;
        for level in 1..self.levels {
            let index = self.slot_index(p0, level);
            match &self.nodes[node].slots {
                NodeSlots::Interior(slots) => node = (*slots.get(index)?)?,
                NodeSlots::Leaf(_) => return None,
            }
        }
        let index = self.slot_index(p0, self.levels);
        match &mut self.nodes[node].slots {
            NodeSlots::Leaf(slots) => slots.get_mut(index),
            NodeSlots::Interior(_) => None,
        }
    }

    /// Sets the PTE for a page, creating the interior path on first use.
    /// Every new node takes one table frame.
    fn set_page_entry(
        &mut self,
        page_number: u64,
        frame: FrameId,
        in_ram: bool,
        table_pool: &mut FramePool,
        rng: &mut SmallRng,
    ) -> Result<(), PageTableError> {
        let p0 = page_number - 1;
        let mut node: NodeId = 0;

        for level in 1..self.levels {
            let index = self.slot_index(p0, level);
            let existing = match &self.nodes[node].slots {
                NodeSlots::Interior(slots) => slots[index],
                NodeSlots::Leaf(_) => {
                    return Err(PageTableError::WalkBroken { page: page_number })
                }
            };

            node = match existing {
                Some(child) => child,
                None => {
                    let table_frame = table_pool
                        .take_random(rng)
                        .ok_or(PageTableError::TableFramesExhausted)?;
                    let mut child = if level + 1 == self.levels {
                        Node::leaf(self.entries_per_table as usize)
                    } else {
                        Node::interior(self.entries_per_table as usize)
                    };
                    child.table_frame = table_frame;
                    self.ram_claims
                        .insert(table_frame, Claim::Table { level: level + 1 });

                    let child_id = self.nodes.len();
                    self.nodes.push(child);
                    if let NodeSlots::Interior(slots) = &mut self.nodes[node].slots {
                        slots[index] = Some(child_id);
                    }
                    trace!(
                        "process {}: level {} table in frame {}",
                        self.process_id,
                        level + 1,
                        table_frame
                    );
                    child_id
                }
            };
        }

        let index = self.slot_index(p0, self.levels);
        match &mut self.nodes[node].slots {
            NodeSlots::Leaf(slots) => {
                slots[index] = PageTableEntry {
                    frame,
                    valid: true,
                    in_ram,
                };
                Ok(())
            }
            NodeSlots::Interior(_) => Err(PageTableError::WalkBroken { page: page_number }),
        }
    }
}
