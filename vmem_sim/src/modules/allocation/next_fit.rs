use log::trace;
use rand::rngs::SmallRng;

use super::{
    reserve_swap, split_request, take_run, AllocationContext, AllocationStrategyModule, Placement,
    PlacementError, Run,
};
use crate::modules::frame_pool::{FrameId, FramePool};

/// First Fit that resumes scanning where the previous allocation left
/// off, wrapping to the pool start when nothing fits after that point.
///
/// The resume position lives in [`AllocationContext::last_search_frame`]:
/// it is shared by every process of a run and survives across requests.
pub struct NextFitStrategy;

/// Scans `frames[begin..]` for the first run of at least `want` frames.
/// A run is cut at `begin` even if free frames precede it, which mirrors
/// how the search resumes mid-run after a wrap.
fn find_run_from(frames: &[FrameId], begin: usize, want: u64) -> Option<Run> {
    let mut i = begin;
    while i < frames.len() {
        let start = frames[i];
        let mut j = i;
        while j < frames.len() && frames[j] == start + (j - i) as u64 {
            j += 1;
        }
        let len = (j - i) as u64;
        if len >= want {
            return Some(Run { start, len });
        }
        i = j;
    }
    None
}

impl AllocationStrategyModule for NextFitStrategy {
    fn name(&self) -> &'static str {
        "Next Fit"
    }

    fn allocate(
        &mut self,
        ctx: &mut AllocationContext,
        pages: u64,
        data_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        _rng: &mut SmallRng,
    ) -> Result<Placement, PlacementError> {
        let (ram, swap) = split_request(pages, data_pool);
        trace!(
            "next fit: {} pages ({} ram, {} swap), resuming at frame {}",
            pages,
            ram,
            swap,
            ctx.last_search_frame
        );

        let run = if ram == 0 {
            None
        } else {
            let frames = data_pool.sorted_view();
            let resume = frames.partition_point(|&frame| frame < ctx.last_search_frame);
            let found = find_run_from(frames, resume, ram)
                .or_else(|| find_run_from(frames, 0, ram))
                .ok_or(PlacementError::NoContiguousRun { pages: ram })?;
            Some(found)
        };

        let swap_frames = reserve_swap(swap_pool, swap)?;
        let ram_frames = match run {
            Some(run) => {
                ctx.last_search_frame = run.start + ram;
                take_run(data_pool, run.start, ram)
            }
            None => Vec::new(),
        };

        Ok(Placement {
            ram: ram_frames,
            swap: swap_frames,
        })
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::super::test::{
        data_pool_from, test_strategy_failure_leaves_pools_alone, test_strategy_swap_overflow,
    };
    use super::*;
    use crate::modules::frame_pool::PoolKind;

    fn allocate(
        ctx: &mut AllocationContext,
        pages: u64,
        data_pool: &mut FramePool,
    ) -> Result<Placement, PlacementError> {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);
        NextFitStrategy.allocate(ctx, pages, data_pool, &mut swap_pool, &mut rng)
    }

    #[test]
    fn test_next_fit_resumes_after_the_previous_allocation() {
        let mut ctx = AllocationContext::new(0);
        let mut data_pool = data_pool_from(&(0..32).collect::<Vec<_>>());

        let first = allocate(&mut ctx, 8, &mut data_pool).unwrap();
        assert_eq!(first.ram, (0..8).collect::<Vec<_>>());
        assert_eq!(ctx.last_search_frame, 8);

        let second = allocate(&mut ctx, 8, &mut data_pool).unwrap();
        assert_eq!(second.ram, (8..16).collect::<Vec<_>>());
        assert_eq!(ctx.last_search_frame, 16);
    }

    #[test]
    fn test_next_fit_wraps_to_the_pool_start() {
        let mut ctx = AllocationContext::new(0);
        ctx.last_search_frame = 20;
        // only [4, 10) is big enough, and it lies before the resume point
        let mut data_pool = data_pool_from(&[4, 5, 6, 7, 8, 9, 20, 21]);

        let placement = allocate(&mut ctx, 4, &mut data_pool).unwrap();
        assert_eq!(placement.ram, vec![4, 5, 6, 7]);
        assert_eq!(ctx.last_search_frame, 8);
    }

    #[test]
    fn test_next_fit_cuts_the_run_at_the_resume_point() {
        let mut ctx = AllocationContext::new(0);
        ctx.last_search_frame = 6;
        // one long run [0, 10); resuming inside it leaves only 4 frames
        let mut data_pool = data_pool_from(&(0..10).collect::<Vec<_>>());

        let placement = allocate(&mut ctx, 5, &mut data_pool).unwrap();
        // the tail is too short, so the wrap finds the full run again
        assert_eq!(placement.ram, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_next_fit_swap_overflow() {
        test_strategy_swap_overflow(NextFitStrategy);
    }

    #[test]
    fn test_next_fit_failure_leaves_pools_alone() {
        test_strategy_failure_leaves_pools_alone(NextFitStrategy);
    }
}
