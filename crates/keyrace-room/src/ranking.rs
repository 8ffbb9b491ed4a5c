//! Final standings for a round.

use std::cmp::Ordering;
use std::time::Duration;

use keyrace_protocol::{PlayerId, Standing};

/// One racer's result as seen by the ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceEntry {
    pub player: PlayerId,
    pub username: String,
    pub progress: f64,
    pub wpm: f64,
    /// Time from round start to 100%, if they got there.
    pub completion: Option<Duration>,
    /// Position in the room's join order.
    pub join_order: usize,
}

fn compare(a: &RaceEntry, b: &RaceEntry) -> Ordering {
    match (a.completion, b.completion) {
        // Reported at millisecond resolution; finer gaps are a tie.
        (Some(x), Some(y)) => x.as_millis().cmp(&y.as_millis()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.progress.total_cmp(&a.progress))
    .then_with(|| b.wpm.total_cmp(&a.wpm))
    .then_with(|| a.join_order.cmp(&b.join_order))
}

/// Orders racers and assigns ranks 1..=N without gaps.
///
/// Finishers come first, fastest first. Everyone else is ordered by
/// progress, then WPM, then who joined the room earlier.
pub fn rank(entries: &[RaceEntry]) -> Vec<Standing> {
    let mut ordered: Vec<&RaceEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| compare(a, b));

    ordered
        .into_iter()
        .zip(1u32..)
        .map(|(entry, rank)| Standing {
            rank,
            connection_id: entry.player,
            username: entry.username.clone(),
            progress: entry.progress,
            wpm: entry.wpm,
            completed: entry.completion.is_some(),
            completion_ms: entry.completion.map(|d| d.as_millis() as u64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, progress: f64, wpm: f64, completion_ms: Option<u64>) -> RaceEntry {
        RaceEntry {
            player: PlayerId(id),
            username: format!("p{id}"),
            progress,
            wpm,
            completion: completion_ms.map(Duration::from_millis),
            join_order: id as usize,
        }
    }

    fn order(standings: &[Standing]) -> Vec<u64> {
        standings.iter().map(|s| s.connection_id.0).collect()
    }

    #[test]
    fn test_rank_finishers_by_completion_time() {
        let standings = rank(&[
            entry(1, 100.0, 50.0, Some(30_000)),
            entry(2, 100.0, 90.0, Some(20_000)),
            entry(3, 100.0, 70.0, Some(25_000)),
        ]);
        assert_eq!(order(&standings), vec![2, 3, 1]);
        assert_eq!(standings[0].completion_ms, Some(20_000));
    }

    #[test]
    fn test_rank_finishers_ahead_of_everyone_else() {
        let standings = rank(&[
            entry(1, 99.9, 200.0, None),
            entry(2, 100.0, 10.0, Some(89_000)),
        ]);
        assert_eq!(order(&standings), vec![2, 1]);
        assert!(standings[0].completed);
        assert!(!standings[1].completed);
    }

    #[test]
    fn test_rank_unfinished_by_progress_then_wpm() {
        let standings = rank(&[
            entry(1, 40.0, 80.0, None),
            entry(2, 60.0, 20.0, None),
            entry(3, 40.0, 90.0, None),
        ]);
        assert_eq!(order(&standings), vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_full_tie_falls_back_to_join_order() {
        let standings = rank(&[
            entry(3, 10.0, 10.0, None),
            entry(1, 10.0, 10.0, None),
            entry(2, 10.0, 10.0, None),
        ]);
        assert_eq!(order(&standings), vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_numbers_are_contiguous() {
        let standings = rank(&[
            entry(1, 10.0, 10.0, None),
            entry(2, 10.0, 10.0, None),
            entry(3, 100.0, 10.0, Some(5)),
            entry(4, 0.0, 0.0, None),
        ]);
        let ranks: Vec<u32> = standings.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_rank_same_millisecond_finish_ordered_by_wpm() {
        let mut slow = entry(1, 100.0, 50.0, None);
        slow.completion = Some(Duration::from_micros(30_000_100));
        let mut fast = entry(2, 100.0, 90.0, None);
        fast.completion = Some(Duration::from_micros(30_000_900));

        let standings = rank(&[slow, fast]);
        assert_eq!(order(&standings), vec![2, 1]);
        assert_eq!(standings[0].completion_ms, Some(30_000));
        assert_eq!(standings[1].completion_ms, Some(30_000));
    }

    #[test]
    fn test_rank_same_millisecond_and_wpm_falls_back_to_join_order() {
        let mut later = entry(2, 100.0, 60.0, None);
        later.completion = Some(Duration::from_micros(12_000_050));
        let mut earlier = entry(1, 100.0, 60.0, None);
        earlier.completion = Some(Duration::from_micros(12_000_700));

        let standings = rank(&[later, earlier]);
        assert_eq!(order(&standings), vec![1, 2]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(&[]).is_empty());
    }
}
