use rand::rngs::SmallRng;
use rand::Rng;

/// Chance that a reference stays close to the previous one.
const LOCALITY_BIAS: f64 = 0.7;

/// Half-width of the locality window around the last accessed page.
const LOCALITY_WINDOW: i64 = 3;

/// Generates the synthetic, locality-biased page reference stream.
///
/// Page numbers here are 0-based: they multiply directly into virtual
/// addresses. With probability [`LOCALITY_BIAS`] the next page lies within
/// `±LOCALITY_WINDOW` of the previous one, clamped to the process range;
/// otherwise it is drawn uniformly.
pub(crate) fn next_page(last_page: u64, max_page: u64, rng: &mut SmallRng) -> u64 {
    if rng.gen_bool(LOCALITY_BIAS) {
        let delta = rng.gen_range(-LOCALITY_WINDOW..=LOCALITY_WINDOW);
        (last_page as i64 + delta).clamp(0, max_page as i64) as u64
    } else {
        rng.gen_range(0..=max_page)
    }
}

#[cfg(test)]
mod test {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_pages_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(21);
        let mut last = 0;
        for _ in 0..10_000 {
            last = next_page(last, 15, &mut rng);
            assert!(last <= 15);
        }
    }

    #[test]
    fn test_single_page_processes_always_access_page_zero() {
        let mut rng = SmallRng::seed_from_u64(22);
        for _ in 0..100 {
            assert_eq!(next_page(0, 0, &mut rng), 0);
        }
    }

    #[test]
    fn test_locality_dominates_the_stream() {
        let mut rng = SmallRng::seed_from_u64(23);
        let mut last = 5_000;
        let mut near = 0;
        let total = 10_000;
        for _ in 0..total {
            let page = next_page(last, 10_000, &mut rng);
            if (page as i64 - last as i64).abs() <= LOCALITY_WINDOW {
                near += 1;
            }
            last = page;
        }
        // 70% local plus the rare uniform draw that lands nearby
        assert!(near as f64 / total as f64 > 0.6);
    }
}
