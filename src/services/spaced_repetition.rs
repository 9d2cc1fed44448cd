use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Review-interval ladder, indexed by mastery level. Values are days until
/// the next review; a level is climbed by exhausting its ladder entries.
pub const INTERVAL_LADDER: [&[i64]; 6] = [&[1, 3], &[5, 10], &[14, 21], &[30], &[60], &[90]];

pub const MAX_MASTERY_LEVEL: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub mastery_level: i32,
    pub review_interval: i64,
    pub correct_count: i32,
    pub wrong_count: i32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
}

impl Default for Progress {
    /// State for a word that has never been reviewed. The zero interval is
    /// not a ladder member, so the first correct answer lands on the level-0
    /// ladder start.
    fn default() -> Self {
        Self {
            mastery_level: 0,
            review_interval: 0,
            correct_count: 0,
            wrong_count: 0,
            last_reviewed_at: None,
            next_review_at: None,
        }
    }
}

/// Advances a learner's progress after one graded answer.
///
/// Correct: move to the next interval of the current level; at the end of a
/// level, promote and start the next level's ladder; level 5 caps at its last
/// interval. An interval that is not on the current ladder resets to the
/// ladder start. Incorrect: demote one level (floor 0) and reset to that
/// level's first interval.
pub fn advance(progress: &Progress, is_correct: bool, now: DateTime<Utc>) -> Progress {
    let mut mastery_level = progress.mastery_level.clamp(0, MAX_MASTERY_LEVEL);
    let mut review_interval = progress.review_interval;
    let mut correct_count = progress.correct_count;
    let mut wrong_count = progress.wrong_count;

    let ladder = INTERVAL_LADDER[mastery_level as usize];

    if is_correct {
        correct_count += 1;

        match ladder.iter().position(|&days| days == review_interval) {
            None => review_interval = ladder[0],
            Some(index) if index + 1 < ladder.len() => review_interval = ladder[index + 1],
            Some(_) if mastery_level < MAX_MASTERY_LEVEL => {
                mastery_level += 1;
                review_interval = INTERVAL_LADDER[mastery_level as usize][0];
            }
            // Level 5, last interval: scheduling has reached its cap.
            Some(_) => {}
        }
    } else {
        wrong_count += 1;

        if mastery_level > 0 {
            mastery_level -= 1;
        }
        review_interval = INTERVAL_LADDER[mastery_level as usize][0];
    }

    Progress {
        mastery_level,
        review_interval,
        correct_count,
        wrong_count,
        last_reviewed_at: Some(now),
        next_review_at: Some(now + Duration::days(review_interval)),
    }
}
