//! Choosing each round's difficulty and time limit.

use std::time::Duration;

use keyrace_protocol::{Difficulty, GameMode};
use rand::Rng;

/// Difficulty and length of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPlan {
    pub difficulty: Difficulty,
    pub time_limit: Duration,
}

impl RoundPlan {
    const fn new(difficulty: Difficulty, secs: u64) -> Self {
        Self {
            difficulty,
            time_limit: Duration::from_secs(secs),
        }
    }

    pub const EASY: Self = Self::new(Difficulty::Easy, 40);
    pub const MEDIUM: Self = Self::new(Difficulty::Medium, 45);
    pub const HARD: Self = Self::new(Difficulty::Hard, 90);
}

/// Picks the plan for `round` (1-based) in `mode`.
///
/// - `Random`: medium or hard with equal odds.
/// - `Tier`: round 1 easy, rounds 2–4 medium, then hard from round 5 on.
pub fn select_round<R: Rng + ?Sized>(mode: GameMode, round: u32, rng: &mut R) -> RoundPlan {
    match mode {
        GameMode::Random => {
            if rng.random_bool(0.5) {
                RoundPlan::HARD
            } else {
                RoundPlan::MEDIUM
            }
        }
        GameMode::Tier => match round {
            0 | 1 => RoundPlan::EASY,
            2..=4 => RoundPlan::MEDIUM,
            _ => RoundPlan::HARD,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_tier_ladder() {
        let mut rng = StdRng::seed_from_u64(1);
        let plans: Vec<_> = (1..=7)
            .map(|round| select_round(GameMode::Tier, round, &mut rng))
            .collect();
        assert_eq!(
            plans,
            vec![
                RoundPlan::EASY,
                RoundPlan::MEDIUM,
                RoundPlan::MEDIUM,
                RoundPlan::MEDIUM,
                RoundPlan::HARD,
                RoundPlan::HARD,
                RoundPlan::HARD,
            ]
        );
    }

    #[test]
    fn test_tier_first_round_is_easy_forty_seconds() {
        let plan = select_round(GameMode::Tier, 1, &mut StdRng::seed_from_u64(0));
        assert_eq!(plan.difficulty, Difficulty::Easy);
        assert_eq!(plan.time_limit, Duration::from_secs(40));
    }

    #[test]
    fn test_tier_difficulty_never_decreases() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut last = Difficulty::Easy;
        for round in 1..=50 {
            let plan = select_round(GameMode::Tier, round, &mut rng);
            assert!(plan.difficulty >= last);
            last = plan.difficulty;
        }
    }

    #[test]
    fn test_random_only_medium_or_hard_with_matching_time() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen_medium = false;
        let mut seen_hard = false;
        for _ in 0..200 {
            let plan = select_round(GameMode::Random, 1, &mut rng);
            match plan.difficulty {
                Difficulty::Medium => {
                    assert_eq!(plan.time_limit, Duration::from_secs(45));
                    seen_medium = true;
                }
                Difficulty::Hard => {
                    assert_eq!(plan.time_limit, Duration::from_secs(90));
                    seen_hard = true;
                }
                Difficulty::Easy => panic!("random mode never picks easy"),
            }
        }
        assert!(seen_medium && seen_hard);
    }

    #[test]
    fn test_same_seed_same_plans() {
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| select_round(GameMode::Random, 1, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
