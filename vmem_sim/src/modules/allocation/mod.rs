/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

mod best_fit;
mod contiguous;
mod first_fit;
mod next_fit;
mod quick_fit;
mod worst_fit;

use std::fmt;

use rand::rngs::SmallRng;

pub use best_fit::BestFitStrategy;
pub use contiguous::ContiguousPlacement;
pub use first_fit::FirstFitStrategy;
pub use next_fit::NextFitStrategy;
pub use quick_fit::QuickFitStrategy;
pub use worst_fit::WorstFitStrategy;

use super::frame_pool::{FrameId, FramePool};

/// Placement state shared by all allocations of one simulation run.
///
/// `last_search_frame` belongs to Next Fit and `last_used_frame` to the
/// contiguous placement mode; both survive across allocation requests and
/// are cleared by the driver's `reset`.
#[derive(Debug, Clone, Default)]
pub struct AllocationContext {
    pub last_search_frame: FrameId,
    pub last_used_frame: FrameId,
    pub table_frame_limit: FrameId,
}

impl AllocationContext {
    pub fn new(table_frame_limit: FrameId) -> Self {
        Self {
            last_search_frame: 0,
            last_used_frame: 0,
            table_frame_limit,
        }
    }

    pub fn reset(&mut self) {
        self.last_search_frame = 0;
        self.last_used_frame = 0;
    }
}

/// Frames handed out by one allocation request, already removed from
/// their pools. RAM frames are ordered page-by-page; swap frames are the
/// lowest-numbered frames that were available, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    pub ram: Vec<FrameId>,
    pub swap: Vec<FrameId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// No contiguous run of free data frames was long enough.
    NoContiguousRun { pages: u64 },
    /// The swap pool holds fewer frames than the overflow needs.
    SwapExhausted { needed: u64, available: u64 },
    /// Swap overflow must start at frame 0 and stay contiguous, but those
    /// frames are no longer free.
    SwapNotContiguous { needed: u64 },
    /// Quick Fit only: no predefined size class covers the request.
    NoSizeClass { pages: u64 },
    /// Quick Fit only: the selected class has no block left.
    EmptySizeClass { class: u64 },
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::NoContiguousRun { pages } => {
                write!(f, "no contiguous run of {} free frames", pages)
            }
            PlacementError::SwapExhausted { needed, available } => {
                write!(f, "swap pool holds {} of {} needed frames", available, needed)
            }
            PlacementError::SwapNotContiguous { needed } => {
                write!(f, "swap frames [0, {}) are not all free", needed)
            }
            PlacementError::NoSizeClass { pages } => {
                write!(f, "no predefined size class fits {} pages", pages)
            }
            PlacementError::EmptySizeClass { class } => {
                write!(f, "size class {} has no free block", class)
            }
        }
    }
}

/// Uniform interface of the physical placement policies.
///
/// A request for `pages` pages is split into
/// `ram = min(pages, |data_pool|)` RAM pages placed by the policy and the
/// remainder in swap, always granted lowest-numbered-first. On failure the
/// pools are left exactly as they were.
pub trait AllocationStrategyModule {
    fn name(&self) -> &'static str;

    fn allocate(
        &mut self,
        ctx: &mut AllocationContext,
        pages: u64,
        data_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        rng: &mut SmallRng,
    ) -> Result<Placement, PlacementError>;
}

/// A maximal range of consecutive free frames, `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    pub(crate) start: FrameId,
    pub(crate) len: u64,
}

/// Sweeps a sorted frame slice into its maximal contiguous runs.
pub(crate) fn contiguous_runs(frames: &[FrameId]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut iter = frames.iter().copied();
    let mut current = match iter.next() {
        Some(first) => Run {
            start: first,
            len: 1,
        },
        None => return runs,
    };

    for frame in iter {
        if frame == current.start + current.len {
            current.len += 1;
        } else {
            runs.push(current);
            current = Run {
                start: frame,
                len: 1,
            };
        }
    }
    runs.push(current);
    runs
}

/// RAM/swap split for a request against the current data pool.
pub(crate) fn split_request(pages: u64, data_pool: &FramePool) -> (u64, u64) {
    let ram = pages.min(data_pool.len() as u64);
    (ram, pages - ram)
}

/// Takes the `count` lowest-numbered swap frames, or fails without
/// touching the pool.
pub(crate) fn reserve_swap(
    swap_pool: &mut FramePool,
    count: u64,
) -> Result<Vec<FrameId>, PlacementError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    swap_pool
        .take_lowest(count as usize)
        .ok_or(PlacementError::SwapExhausted {
            needed: count,
            available: swap_pool.len() as u64,
        })
}

/// Removes `[start, start + count)` from the pool. The caller must have
/// established that the run exists.
pub(crate) fn take_run(data_pool: &mut FramePool, start: FrameId, count: u64) -> Vec<FrameId> {
    data_pool
        .take_range(start, count)
        .expect("selected run vanished from its pool")
}
