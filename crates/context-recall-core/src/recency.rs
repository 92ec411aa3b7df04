//! Recency boost for "what did I do lately" queries.
//!
//! Piecewise-linear multiplier over content age in days:
//!
//! | Age (days) | Multiplier |
//! |------------|------------|
//! | `< 0` (future timestamp / clock skew) | `1.0` |
//! | `0 ..< 7` | `2.0 → 1.5` |
//! | `7 ..< 30` | `1.5 → 1.2` |
//! | `>= 30` | `1.0` |

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{keys, RetrievalResult};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Score multiplier for content `age_days` old.
pub fn recency_multiplier(age_days: f64) -> f64 {
    if age_days < 0.0 {
        1.0
    } else if age_days < 7.0 {
        2.0 - (age_days / 7.0) * 0.5
    } else if age_days < 30.0 {
        1.5 - ((age_days - 7.0) / 23.0) * 0.3
    } else {
        1.0
    }
}

/// Age in fractional days between `created_at` and `now`.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds() as f64 / MS_PER_DAY
}

/// Multiply each result's score by its recency multiplier and record the
/// multiplier under `metadata.recency_multiplier`.
///
/// Results without a `created_at` are left untouched.
pub fn apply_recency_boost(results: &mut [RetrievalResult], now: DateTime<Utc>) {
    for result in results.iter_mut() {
        let Some(created_at) = result.created_at else {
            continue;
        };
        let multiplier = recency_multiplier(age_in_days(created_at, now));
        result.relevance_score = result.relevance_score.map(|s| s * multiplier);
        result
            .metadata
            .insert(keys::RECENCY_MULTIPLIER.into(), Value::from(multiplier));
    }
}
