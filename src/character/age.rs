use std::ops::RangeInclusive;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

pub const MIN_AGE: u32 = 1;
pub const MAX_AGE: u32 = 500;

/// Age buckets and their selection weights (percent).
const AGE_BUCKETS: &[(RangeInclusive<u32>, u32)] = &[
    (1..=13, 5),
    (13..=17, 10),
    (18..=35, 45),
    (36..=50, 20),
    (50..=100, 10),
    (101..=200, 5),
    (201..=500, 5),
];

pub fn random_age_with<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    let weights = AGE_BUCKETS.iter().map(|(_, weight)| *weight);
    let Ok(index) = WeightedIndex::new(weights) else {
        return rng.gen_range(MIN_AGE..=MAX_AGE);
    };
    let (range, _) = &AGE_BUCKETS[index.sample(rng)];
    rng.gen_range(range.clone())
}

pub fn random_age() -> u32 {
    random_age_with(&mut rand::thread_rng())
}

/// Parses a submitted age, clamping into the supported range.
pub fn normalize_age(value: &str) -> Option<u32> {
    let digits: String = value.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u32>()
        .ok()
        .map(|age| age.clamp(MIN_AGE, MAX_AGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_ages_stay_in_range_and_favour_adults() {
        let mut rng = StdRng::seed_from_u64(7);
        let ages: Vec<u32> = (0..2000).map(|_| random_age_with(&mut rng)).collect();
        assert!(ages.iter().all(|age| (MIN_AGE..=MAX_AGE).contains(age)));
        let young_adults = ages.iter().filter(|age| (18..=35).contains(*age)).count();
        assert!(young_adults > 600, "expected the 18-35 bucket to dominate");
    }

    #[test]
    fn normalize_age_clamps_and_strips_units() {
        assert_eq!(normalize_age("124 years"), Some(124));
        assert_eq!(normalize_age("0"), Some(1));
        assert_eq!(normalize_age("9000"), Some(500));
        assert_eq!(normalize_age("old"), None);
    }
}
