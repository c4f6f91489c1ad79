mod common;

use chrono::{DateTime, Duration, Utc};
use common::t0;
use licensor_activation::{RateDecision, RateLimiter};
use licensor_types::RateLimitReason;
use proptest::prelude::*;

/// Strictly increasing request times built from positive gaps in seconds.
fn schedule(gaps: &[i64]) -> Vec<DateTime<Utc>> {
    let mut at = t0();
    gaps.iter()
        .map(|gap| {
            at += Duration::seconds(*gap);
            at
        })
        .collect()
}

proptest! {
    #[test]
    fn allowed_requests_respect_min_interval(gaps in prop::collection::vec(1i64..400, 1..60)) {
        let limiter = RateLimiter::default();
        let mut allowed = Vec::new();
        for at in schedule(&gaps) {
            if limiter.check_and_record(&"id", at).is_allowed() {
                allowed.push(at);
            }
        }
        for pair in allowed.windows(2) {
            prop_assert!(pair[1] - pair[0] >= Duration::seconds(60));
        }
    }

    #[test]
    fn never_more_than_five_in_ten_minutes(gaps in prop::collection::vec(1i64..200, 1..80)) {
        let limiter = RateLimiter::default();
        let mut allowed: Vec<DateTime<Utc>> = Vec::new();
        for at in schedule(&gaps) {
            if limiter.check_and_record(&"id", at).is_allowed() {
                allowed.push(at);
            }
        }
        for (i, start) in allowed.iter().enumerate() {
            let in_window = allowed[i..]
                .iter()
                .take_while(|at| **at - *start < Duration::minutes(10))
                .count();
            prop_assert!(in_window <= 5);
        }
    }

    #[test]
    fn every_denial_has_a_positive_retry_hint(gaps in prop::collection::vec(1i64..120, 1..60)) {
        let limiter = RateLimiter::default();
        for at in schedule(&gaps) {
            if let RateDecision::Deny(denial) = limiter.check_and_record(&"id", at) {
                prop_assert!(denial.retry_after_secs() > 0);
            }
        }
    }

    #[test]
    fn exceeded_is_always_followed_by_lockout(gaps in prop::collection::vec(60i64..120, 6..20)) {
        let limiter = RateLimiter::default();
        let mut locked_at = None;
        for at in schedule(&gaps) {
            let decision = limiter.check_and_record(&"id", at);
            match (locked_at, decision) {
                (None, RateDecision::Deny(d)) if d.reason == RateLimitReason::RateLimitExceeded => {
                    locked_at = Some(at);
                }
                (Some(start), decision) if at - start < Duration::minutes(15) => {
                    prop_assert!(matches!(
                        decision,
                        RateDecision::Deny(d) if d.reason == RateLimitReason::RateLimitThrottled
                    ));
                }
                _ => {}
            }
        }
    }
}
