//! The schedule parser. Classifies a schedule string into a
//! [`Classification`] describing what the job state machine should do with
//! it. Pure and side-effect free so RRULE determinism can be tested
//! without a store.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rrule::RRuleSet;

/// What `bike::schedule` should do in response to a raw schedule string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Write an `STP` status; no queue/timeline insertion.
    Stop,
    /// Push straight onto the job's queue.
    Enqueue {
        /// `NOW` overwrites the stored schedule to `STOP` before enqueuing.
        normalize_to_stop: bool,
    },
    /// Insert into the timeline at the given time.
    Timeline {
        at: DateTime<Utc>,
        /// `AT:<ts>` overwrites the stored schedule to `STOP` first.
        normalize_to_stop: bool,
    },
    /// The schedule string didn't parse as a recognized token or RRULE.
    Bad,
}

/// Classify `schedule` given the current time, an optional RRULE anchor
/// (`after`), and an optional backoff to apply to a bare `CONTINUE`.
pub fn classify(
    schedule: &str,
    now: DateTime<Utc>,
    rrule_after: Option<DateTime<Utc>>,
    backoff: Option<Duration>,
) -> Classification {
    match schedule {
        "STOP" => Classification::Stop,
        "CONTINUE" => match backoff {
            Some(b) if b > Duration::from_secs(0) => Classification::Timeline {
                at: now + chrono::Duration::from_std(b).unwrap_or(chrono::Duration::zero()),
                normalize_to_stop: false,
            },
            _ => Classification::Enqueue {
                normalize_to_stop: false,
            },
        },
        "NOW" => Classification::Enqueue {
            normalize_to_stop: true,
        },
        s if s.starts_with("AT:") => match s.trim_start_matches("AT:").parse::<i64>() {
            Ok(ts) => Classification::Timeline {
                at: Utc.timestamp(ts, 0),
                normalize_to_stop: true,
            },
            Err(_) => Classification::Bad,
        },
        rrule_text => classify_rrule(rrule_text, rrule_after.unwrap_or(now)),
    }
}

fn classify_rrule(text: &str, after: DateTime<Utc>) -> Classification {
    match text.parse::<RRuleSet>() {
        Ok(set) => {
            // `after` is exclusive: "the first fire strictly after after".
            let next = set.into_iter().find(|occurrence| *occurrence > after);
            match next {
                Some(next_run) => Classification::Timeline {
                    at: next_run.with_timezone(&Utc),
                    normalize_to_stop: false,
                },
                None => Classification::Stop,
            }
        }
        Err(_) => Classification::Bad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp(secs, 0)
    }

    #[test]
    fn stop_is_stop() {
        assert_eq!(classify("STOP", ts(0), None, None), Classification::Stop);
    }

    #[test]
    fn continue_without_backoff_enqueues() {
        assert_eq!(
            classify("CONTINUE", ts(0), None, None),
            Classification::Enqueue {
                normalize_to_stop: false
            }
        );
    }

    #[test]
    fn continue_with_backoff_timelines_in_the_future() {
        let now = ts(1000);
        let result = classify("CONTINUE", now, None, Some(Duration::from_secs(2)));
        assert_eq!(
            result,
            Classification::Timeline {
                at: ts(1002),
                normalize_to_stop: false
            }
        );
    }

    #[test]
    fn continue_with_zero_backoff_enqueues_directly() {
        let result = classify("CONTINUE", ts(0), None, Some(Duration::from_secs(0)));
        assert_eq!(
            result,
            Classification::Enqueue {
                normalize_to_stop: false
            }
        );
    }

    #[test]
    fn now_enqueues_and_normalizes() {
        assert_eq!(
            classify("NOW", ts(0), None, None),
            Classification::Enqueue {
                normalize_to_stop: true
            }
        );
    }

    #[test]
    fn at_timelines_and_normalizes() {
        assert_eq!(
            classify("AT:500", ts(0), None, None),
            Classification::Timeline {
                at: ts(500),
                normalize_to_stop: true
            }
        );
    }

    #[test]
    fn at_with_garbage_timestamp_is_bad() {
        assert_eq!(classify("AT:not-a-number", ts(0), None, None), Classification::Bad);
    }

    #[test]
    fn malformed_rrule_is_bad() {
        assert_eq!(classify("not a schedule", ts(0), None, None), Classification::Bad);
    }

    #[test]
    fn rrule_determinism() {
        let rule = "DTSTART:19700101T000000Z\nRRULE:FREQ=SECONDLY;COUNT=5";
        let a = classify(rule, ts(0), Some(ts(10)), None);
        let b = classify(rule, ts(0), Some(ts(10)), None);
        assert_eq!(a, b);
    }

    #[test]
    fn exhausted_rrule_stops() {
        let rule = "DTSTART:19700101T000000Z\nRRULE:FREQ=SECONDLY;COUNT=2";
        // After the second (and last) occurrence, the rule is exhausted.
        let result = classify(rule, ts(0), Some(ts(100)), None);
        assert_eq!(result, Classification::Stop);
    }

    #[test]
    fn secondly_rrule_fires_again_soon() {
        let rule = "DTSTART:19700101T000000Z\nRRULE:FREQ=SECONDLY";
        match classify(rule, ts(0), Some(ts(59)), None) {
            Classification::Timeline {
                at,
                normalize_to_stop,
            } => {
                assert!(!normalize_to_stop);
                assert_eq!(at, ts(60));
            }
            other => panic!("expected Timeline, got {:?}", other),
        }
    }
}
