use log::trace;
use rand::rngs::SmallRng;

use super::{
    contiguous_runs, reserve_swap, split_request, take_run, AllocationContext,
    AllocationStrategyModule, Placement, PlacementError,
};
use crate::modules::frame_pool::FramePool;

/// Takes the smallest contiguous run that still fits the RAM share; ties
/// go to the lowest start frame.
pub struct BestFitStrategy;

impl AllocationStrategyModule for BestFitStrategy {
    fn name(&self) -> &'static str {
        "Best Fit"
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
        trace!("best fit: {} pages ({} ram, {} swap)", pages, ram, swap);

        let run = if ram == 0 {
            None
        } else {
            // strict < keeps the earliest run among equally small ones
            let found = contiguous_runs(data_pool.sorted_view())
                .into_iter()
                .filter(|run| run.len >= ram)
                .fold(None, |best: Option<super::Run>, run| match best {
                    Some(best) if best.len <= run.len => Some(best),
                    _ => Some(run),
                })
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
    fn test_best_fit_prefers_the_tightest_run() {
        let mut rng = SmallRng::seed_from_u64(6);
        let mut ctx = AllocationContext::new(0);
        // runs: [0,6), [10,13), [20,24)
        let mut data_pool = data_pool_from(&[0, 1, 2, 3, 4, 5, 10, 11, 12, 20, 21, 22, 23]);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);

        let placement = BestFitStrategy
            .allocate(&mut ctx, 3, &mut data_pool, &mut swap_pool, &mut rng)
            .unwrap();
        assert_eq!(placement.ram, vec![10, 11, 12]);
    }

    #[test]
    fn test_best_fit_ties_break_to_the_lowest_start() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut ctx = AllocationContext::new(0);
        // two runs of length 3
        let mut data_pool = data_pool_from(&[5, 6, 7, 15, 16, 17]);
        let mut swap_pool = FramePool::new(PoolKind::Swap, 0..0);

        let placement = BestFitStrategy
            .allocate(&mut ctx, 3, &mut data_pool, &mut swap_pool, &mut rng)
            .unwrap();
        assert_eq!(placement.ram, vec![5, 6, 7]);
    }

    #[test]
    fn test_best_fit_swap_overflow() {
        test_strategy_swap_overflow(BestFitStrategy);
    }

    #[test]
    fn test_best_fit_failure_leaves_pools_alone() {
        test_strategy_failure_leaves_pools_alone(BestFitStrategy);
    }
}
