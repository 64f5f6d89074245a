use log::trace;
use rand::rngs::SmallRng;

use super::{
    contiguous_runs, reserve_swap, split_request, take_run, AllocationContext,
    AllocationStrategyModule, Placement, PlacementError,
};
use crate::modules::frame_pool::FramePool;

/// Takes the first contiguous run long enough for the RAM share.
pub struct FirstFitStrategy;

impl AllocationStrategyModule for FirstFitStrategy {
    fn name(&self) -> &'static str {
        "First Fit"
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
        trace!("first fit: {} pages ({} ram, {} swap)", pages, ram, swap);

        let run = if ram == 0 {
            None
        } else {
            let found = contiguous_runs(data_pool.sorted_view())
                .into_iter()
                .find(|run| run.len >= ram)
                .ok_or(PlacementError::NoContiguousRun { pages: ram })?;
            Some(found)
        };

        let swap_frames = reserve_swap(swap_pool, swap)?;
        let ram_frames = match run {
            Some(run) => take_run(data_pool, run.start, ram),
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

    #[test]
    fn test_first_fit_takes_the_first_big_enough_run() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut ctx = AllocationContext::new(0);
        // runs: [0,2), [5,7), [10,14)
        let mut data_pool = data_pool_from(&[0, 1, 5, 6, 10, 11, 12, 13]);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);

        let placement = FirstFitStrategy
            .allocate(&mut ctx, 3, &mut data_pool, &mut swap_pool, &mut rng)
            .unwrap();
        assert_eq!(placement.ram, vec![10, 11, 12]);
        assert!(placement.swap.is_empty());
        assert_eq!(data_pool.sorted_view(), &[0, 1, 5, 6, 13]);
    }

    #[test]
    fn test_first_fit_fails_without_a_run() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut ctx = AllocationContext::new(0);
        let mut data_pool = data_pool_from(&[0, 2, 4, 6]);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);

        let result =
            FirstFitStrategy.allocate(&mut ctx, 2, &mut data_pool, &mut swap_pool, &mut rng);
        assert_eq!(result, Err(PlacementError::NoContiguousRun { pages: 2 }));
        assert_eq!(data_pool.len(), 4);
    }

    #[test]
    fn test_first_fit_swap_overflow() {
        test_strategy_swap_overflow(FirstFitStrategy);
    }

    #[test]
    fn test_first_fit_failure_leaves_pools_alone() {
        test_strategy_failure_leaves_pools_alone(FirstFitStrategy);
    }
}
