//! Property-Based Tests for the spaced-repetition scheduler
//!
//! Tests the following invariants:
//! - A correct answer never lowers the mastery level
//! - An incorrect answer never raises the mastery level, and resets the
//!   interval to the first rung of the (possibly demoted) level
//! - The stored interval always belongs to the current level's ladder
//! - Counters only ever grow, and the next review is interval days after
//!   the review timestamp

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use wordquiz_backend::services::spaced_repetition::{
    advance, Progress, INTERVAL_LADDER, MAX_MASTERY_LEVEL,
};

fn arb_progress() -> impl Strategy<Value = Progress> {
    (
        0i32..=MAX_MASTERY_LEVEL,
        // Includes 0 (never reviewed) and junk values outside any ladder.
        prop_oneof![Just(0i64), 1i64..=120i64],
        0i32..=10_000i32,
        0i32..=10_000i32,
    )
        .prop_map(|(mastery_level, review_interval, correct_count, wrong_count)| Progress {
            mastery_level,
            review_interval,
            correct_count,
            wrong_count,
            last_reviewed_at: None,
            next_review_at: None,
        })
}

fn arb_review_time() -> impl Strategy<Value = chrono::DateTime<Utc>> {
    (0i64..=4_000_000_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

proptest! {
    #[test]
    fn correct_never_lowers_level(progress in arb_progress(), now in arb_review_time()) {
        let next = advance(&progress, true, now);
        prop_assert!(next.mastery_level >= progress.mastery_level);
        prop_assert!(next.mastery_level <= MAX_MASTERY_LEVEL);
    }

    #[test]
    fn incorrect_never_raises_level(progress in arb_progress(), now in arb_review_time()) {
        let next = advance(&progress, false, now);
        prop_assert!(next.mastery_level <= progress.mastery_level);
        prop_assert!(next.mastery_level >= 0);
    }

    #[test]
    fn interval_always_on_current_ladder(
        progress in arb_progress(),
        is_correct in any::<bool>(),
        now in arb_review_time(),
    ) {
        let next = advance(&progress, is_correct, now);
        let ladder = INTERVAL_LADDER[next.mastery_level as usize];
        prop_assert!(
            ladder.contains(&next.review_interval),
            "interval {} not in ladder {:?} for level {}",
            next.review_interval,
            ladder,
            next.mastery_level
        );
    }

    #[test]
    fn incorrect_resets_to_first_rung(progress in arb_progress(), now in arb_review_time()) {
        let next = advance(&progress, false, now);
        let ladder = INTERVAL_LADDER[next.mastery_level as usize];
        prop_assert_eq!(next.review_interval, ladder[0]);
    }

    #[test]
    fn counters_only_grow(
        progress in arb_progress(),
        is_correct in any::<bool>(),
        now in arb_review_time(),
    ) {
        let next = advance(&progress, is_correct, now);
        if is_correct {
            prop_assert_eq!(next.correct_count, progress.correct_count + 1);
            prop_assert_eq!(next.wrong_count, progress.wrong_count);
        } else {
            prop_assert_eq!(next.wrong_count, progress.wrong_count + 1);
            prop_assert_eq!(next.correct_count, progress.correct_count);
        }
    }

    #[test]
    fn next_review_is_interval_days_after_now(
        progress in arb_progress(),
        is_correct in any::<bool>(),
        now in arb_review_time(),
    ) {
        let next = advance(&progress, is_correct, now);
        prop_assert_eq!(next.last_reviewed_at, Some(now));
        prop_assert_eq!(
            next.next_review_at,
            Some(now + Duration::days(next.review_interval))
        );
    }
}
