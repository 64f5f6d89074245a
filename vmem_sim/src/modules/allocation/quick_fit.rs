use log::trace;
use rand::rngs::SmallRng;

use super::{
    contiguous_runs, reserve_swap, split_request, take_run, AllocationContext,
    AllocationStrategyModule, Placement, PlacementError, Run,
};
use crate::modules::frame_pool::FramePool;

/// Serves requests from per-size-class block lists.
///
/// The classes are fixed at 1, 4 and 16 pages. Every contiguous run is
/// swept into the list of every class it satisfies, the request picks the
/// smallest class covering its RAM share, and the first block of that
/// class wins. A request larger than the largest class fails outright,
/// even when a big enough run exists.
pub struct QuickFitStrategy {
    class_sizes: [u64; 3],
}

impl QuickFitStrategy {
    pub fn new() -> Self {
        Self {
            class_sizes: [1, 4, 16],
        }
    }

    fn class_lists(&self, data_pool: &FramePool) -> Vec<(u64, Vec<Run>)> {
        let runs = contiguous_runs(data_pool.sorted_view());
        self.class_sizes
            .iter()
            .map(|&class| {
                let blocks = runs.iter().copied().filter(|run| run.len >= class).collect();
                (class, blocks)
            })
            .collect()
    }
}

impl Default for QuickFitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStrategyModule for QuickFitStrategy {
    fn name(&self) -> &'static str {
        "Quick Fit"
    }

    fn allocate(
        &mut self,
        _ctx: &mut AllocationContext,
        pages: u64,
        data_pool: &mut FramePool,
        swap_pool: &mut FramePool,
        _rng: &mut SmallRng,
    ) -> Result<Placement, PlacementError> {
        let (ram, swap) = split_request(pages, data_pool);
        trace!("quick fit: {} pages ({} ram, {} swap)", pages, ram, swap);

        let block = if ram == 0 {
            None
        } else {
            let (class, blocks) = self
                .class_lists(data_pool)
                .into_iter()
                .find(|(class, _)| *class >= ram)
                .ok_or(PlacementError::NoSizeClass { pages: ram })?;
            let block = blocks
                .first()
                .copied()
                .ok_or(PlacementError::EmptySizeClass { class })?;
            trace!("quick fit: class {} serves {} pages", class, ram);
            Some(block)
        };

        let swap_frames = reserve_swap(swap_pool, swap)?;
        let ram_frames = match block {
            Some(block) => take_run(data_pool, block.start, ram),
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

    fn allocate(pages: u64, data_pool: &mut FramePool) -> Result<Placement, PlacementError> {
        let mut rng = SmallRng::seed_from_u64(10);
        let mut ctx = AllocationContext::new(0);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);
        QuickFitStrategy::new().allocate(&mut ctx, pages, data_pool, &mut swap_pool, &mut rng)
    }

    #[test]
    fn test_quick_fit_picks_the_smallest_covering_class() {
        // runs: [0,6) feeds classes 1 and 4; [10,30) feeds all three
        let mut frames: Vec<u64> = (0..6).collect();
        frames.extend(10..30);
        let mut data_pool = data_pool_from(&frames);

        // 5 pages need class 16, so the 20-frame run wins over the 6-frame one
        let placement = allocate(5, &mut data_pool).unwrap();
        assert_eq!(placement.ram, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_quick_fit_fails_when_the_class_is_empty() {
        // a 6-frame run satisfies classes 1 and 4 but not 16
        let mut data_pool = data_pool_from(&[0, 1, 2, 3, 4, 5]);

        let result = allocate(5, &mut data_pool);
        assert_eq!(result, Err(PlacementError::EmptySizeClass { class: 16 }));
        assert_eq!(data_pool.len(), 6);
    }

    #[test]
    fn test_quick_fit_rejects_requests_beyond_the_largest_class() {
        let mut data_pool = data_pool_from(&(0..64).collect::<Vec<_>>());
        let result = allocate(17, &mut data_pool);
        assert_eq!(result, Err(PlacementError::NoSizeClass { pages: 17 }));
    }

    #[test]
    fn test_quick_fit_swap_overflow() {
        // the 4-frame RAM share fits class 4
        test_strategy_swap_overflow(QuickFitStrategy::new());
    }

    #[test]
    fn test_quick_fit_failure_leaves_pools_alone() {
        test_strategy_failure_leaves_pools_alone(QuickFitStrategy::new());
    }
}
