//! Impression to click/conversion correlation
//!
//! Hash join on `user_id`. Every impression is paired with every
//! click/conversion record of the same user, so k impressions and j
//! matching records produce k×j events. Output order is impressions in
//! input order, then matches in input order.

use adcorr_common::{FieldValue, RawRecord};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{CorrelationError, JoinSide};
use crate::normalize::TIMESTAMP_FIELD;

pub const USER_ID_FIELD: &str = "user_id";
pub const CAMPAIGN_FIELD: &str = "ad_campaign_id";

/// What the matched record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The matched record carries an `ad_campaign_id`
    Click,
    Conversion,
}

impl Action {
    fn of(record: &RawRecord) -> Self {
        if record.contains(CAMPAIGN_FIELD) {
            Action::Click
        } else {
            Action::Conversion
        }
    }
}

/// One (impression, click/conversion) match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatedEvent {
    pub user_id: FieldValue,
    /// Timestamp of the impression
    pub timestamp: FieldValue,
    pub action: Action,
}

/// Join impressions with click/conversion records on `user_id`
///
/// Any record without `user_id`, or a matched impression without
/// `timestamp`, fails the whole join.
pub fn correlate(
    impressions: &[RawRecord],
    clicks_conversions: &[RawRecord],
) -> Result<Vec<CorrelatedEvent>, CorrelationError> {
    let mut buckets: HashMap<&FieldValue, Vec<Action>> = HashMap::new();
    for (index, record) in clicks_conversions.iter().enumerate() {
        let user_id = record.get(USER_ID_FIELD).ok_or(CorrelationError {
            side: JoinSide::ClickConversion,
            field: USER_ID_FIELD,
            index,
        })?;
        buckets.entry(user_id).or_default().push(Action::of(record));
    }

    let mut events = Vec::new();
    for (index, impression) in impressions.iter().enumerate() {
        let user_id = impression.get(USER_ID_FIELD).ok_or(CorrelationError {
            side: JoinSide::Impression,
            field: USER_ID_FIELD,
            index,
        })?;

        let Some(actions) = buckets.get(user_id) else {
            continue;
        };

        let timestamp = impression.get(TIMESTAMP_FIELD).ok_or(CorrelationError {
            side: JoinSide::Impression,
            field: TIMESTAMP_FIELD,
            index,
        })?;

        events.extend(actions.iter().map(|&action| CorrelatedEvent {
            user_id: user_id.clone(),
            timestamp: timestamp.clone(),
            action,
        }));
    }

    Ok(events)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn impression(user: &str, ts: &str) -> RawRecord {
        RawRecord::from_pairs([("user_id", user), ("timestamp", ts), ("website", "a.com")])
    }

    fn conversion(user: &str) -> RawRecord {
        RawRecord::from_pairs([("user_id", user), ("conversion_type", "signup")])
    }

    fn click(user: &str, campaign: &str) -> RawRecord {
        RawRecord::from_pairs([("user_id", user), ("conversion_type", "signup"), ("ad_campaign_id", campaign)])
    }

    /// The quadratic join the hash join must agree with
    fn nested_loop(impressions: &[RawRecord], clicks: &[RawRecord]) -> Vec<CorrelatedEvent> {
        let mut out = Vec::new();
        for imp in impressions {
            for cc in clicks {
                if imp.get("user_id") == cc.get("user_id") {
                    out.push(CorrelatedEvent {
                        user_id: imp.get("user_id").unwrap().clone(),
                        timestamp: imp.get("timestamp").unwrap().clone(),
                        action: Action::of(cc),
                    });
                }
            }
        }
        out
    }

    #[test]
    fn test_conversion_without_campaign() {
        let events = correlate(&[impression("u1", "2024-01-01T10:00:00")], &[conversion("u1")]).unwrap();
        assert_eq!(
            events,
            vec![CorrelatedEvent {
                user_id: FieldValue::from("u1"),
                timestamp: FieldValue::from("2024-01-01T10:00:00"),
                action: Action::Conversion,
            }]
        );
    }

    #[test]
    fn test_campaign_marks_click() {
        let events = correlate(&[impression("u1", "t")], &[click("u1", "camp1")]).unwrap();
        assert_eq!(events[0].action, Action::Click);
    }

    #[test]
    fn test_full_cross_match_per_user() {
        let impressions = [impression("u1", "t1"), impression("u1", "t2")];
        let clicks = [conversion("u1"), click("u1", "c1"), click("u1", "c2"), conversion("u2")];
        let events = correlate(&impressions, &clicks).unwrap();
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_matches_nested_loop_order_exactly() {
        let impressions = [
            impression("u2", "t1"),
            impression("u1", "t2"),
            impression("u3", "t3"),
            impression("u2", "t4"),
        ];
        let clicks = [click("u2", "c1"), conversion("u1"), conversion("u2"), click("u1", "c9")];
        assert_eq!(correlate(&impressions, &clicks).unwrap(), nested_loop(&impressions, &clicks));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let impressions = [impression("u1", "t1"), impression("u2", "t2")];
        let clicks = [conversion("u2"), click("u1", "c1")];
        let a = serde_json::to_string(&correlate(&impressions, &clicks).unwrap()).unwrap();
        let b = serde_json::to_string(&correlate(&impressions, &clicks).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_text_user_id_never_matches_number() {
        let imp = RawRecord::from_pairs([("user_id", FieldValue::Int(1)), ("timestamp", FieldValue::from("t"))]);
        let events = correlate(&[imp], &[conversion("1")]).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_numeric_user_ids_match_by_value() {
        let imp = RawRecord::from_pairs([("user_id", FieldValue::Int(1)), ("timestamp", FieldValue::from("t"))]);
        let click = RawRecord::from_pairs([("user_id", FieldValue::Float(1.0)), ("conversion_type", FieldValue::from("signup"))]);
        let events = correlate(&[imp], &[click]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, Action::Conversion);
    }

    #[test]
    fn test_missing_user_id_on_either_side_fails() {
        let no_user = RawRecord::from_pairs([("timestamp", "t")]);
        let err = correlate(&[impression("u1", "t"), no_user], &[conversion("u1")]).unwrap_err();
        assert_eq!(err.side, JoinSide::Impression);
        assert_eq!(err.index, 1);

        let no_user = RawRecord::from_pairs([("conversion_type", "signup")]);
        let err = correlate(&[impression("u1", "t")], &[no_user]).unwrap_err();
        assert_eq!(err.side, JoinSide::ClickConversion);
        assert_eq!(err.field, "user_id");
    }

    #[test]
    fn test_serialized_shape() {
        let events = correlate(&[impression("u1", "t")], &[click("u1", "camp1")]).unwrap();
        assert_eq!(
            serde_json::to_string(&events[0]).unwrap(),
            r#"{"user_id":"u1","timestamp":"t","action":"click"}"#
        );
    }
}
