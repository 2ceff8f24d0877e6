//! Per-day decomposition of manual entries

use chrono::{DateTime, Utc};
use worktally_util::{end_of_day, start_of_day, whole_seconds_between};

/// One calendar-day slice of a manual entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: DateTime<Utc>,
    /// Last instant of the day for every segment but the final one
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Split `[start, end)` at each UTC midnight.
///
/// Durations are the differences of whole-second offsets from `start`
/// measured at each midnight, so they always add up to exactly
/// `floor(end - start)`. An entry ending exactly at midnight yields no
/// zero-length segment for the following day. Returns nothing when
/// `end <= start`.
pub fn split_by_day(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Segment> {
    if end <= start {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut day = start.date_naive();
    let mut seg_start = start;
    let mut elapsed = 0;

    loop {
        let Some(next_day) = day.succ_opt() else {
            break;
        };
        let midnight = start_of_day(next_day);

        if end <= midnight {
            segments.push(Segment {
                start: seg_start,
                end,
                duration_seconds: whole_seconds_between(start, end) - elapsed,
            });
            break;
        }

        let offset = whole_seconds_between(start, midnight);
        segments.push(Segment {
            start: seg_start,
            end: end_of_day(day),
            duration_seconds: offset - elapsed,
        });

        elapsed = offset;
        day = next_day;
        seg_start = midnight;
    }

    segments
}
