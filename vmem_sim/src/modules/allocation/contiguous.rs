use log::trace;
use rand::rngs::SmallRng;

use super::{AllocationContext, AllocationStrategyModule, Placement, PlacementError};
use crate::modules::frame_pool::{FrameId, FramePool};

/// Placement mode that packs every process directly behind the previous
/// one.
///
/// The RAM span starts at `max(table_frame_limit, last_used_frame + 1)`.
/// Whatever does not fit inside the data pool from there overflows into
/// swap, which must hand out the contiguous frames `[0, overflow)`. There
/// is no fallback to scattered frames; a broken span on either side fails
/// the request.
pub struct ContiguousPlacement;

impl AllocationStrategyModule for ContiguousPlacement {
    fn name(&self) -> &'static str {
        "Contiguous"
    }

    fn allocate(
        &mut self,
        ctx: &mut AllocationContext,
        pages: u64,
        data_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        _rng: &mut SmallRng,
    ) -> Result<Placement, PlacementError> {
        let start: FrameId = ctx.table_frame_limit.max(ctx.last_used_frame + 1);

        // length of the free span at `start`, capped by the request
        let frames = data_pool.sorted_view();
        let index = frames.partition_point(|&frame| frame < start);
        let mut ram: u64 = 0;
        while ram < pages
            && index + (ram as usize) < frames.len()
            && frames[index + ram as usize] == start + ram
        {
            ram += 1;
        }
        if ram == 0 {
            return Err(PlacementError::NoContiguousRun { pages });
        }

        let overflow = pages - ram;
        trace!(
            "contiguous: {} pages at frame {} ({} ram, {} swap)",
            pages,
            start,
            ram,
            overflow
        );

        let swap_frames = match swap_pool.take_range(0, overflow) {
            Some(frames) => frames,
            None => {
                if (swap_pool.len() as u64) < overflow {
                    return Err(PlacementError::SwapExhausted {
                        needed: overflow,
                        available: swap_pool.len() as u64,
                    });
                }
                return Err(PlacementError::SwapNotContiguous { needed: overflow });
            }
        };
        let ram_frames = data_pool
            .take_range(start, ram)
            .expect("span membership was just checked");

        Ok(Placement {
            ram: ram_frames,
            swap: swap_frames,
        })
    }
}
