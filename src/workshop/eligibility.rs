//! Founder-grant (Gründungszuschuss) eligibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::completion::resolve_path;
use super::requirements::BENEFIT_DAYS_PATH;

/// Remaining unemployment-benefit days required at application time.
pub const MIN_BENEFIT_DAYS: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEligibility {
    pub eligible: bool,
    pub days_remaining: u32,
    /// Days missing to reach the minimum, 0 when eligible.
    pub shortfall: u32,
}

pub fn check_grant_eligibility(days_remaining: u32) -> GrantEligibility {
    GrantEligibility {
        eligible: days_remaining >= MIN_BENEFIT_DAYS,
        days_remaining,
        shortfall: MIN_BENEFIT_DAYS.saturating_sub(days_remaining),
    }
}

/// A whole, non-negative day count. Accepts JSON integers, integral floats
/// like `150.0` and strings of digits; counts above `u32::MAX` saturate.
pub fn benefit_days(value: &Value) -> Option<u32> {
    let days = match value {
        Value::Number(n) => match n.as_u64() {
            Some(days) => days,
            None => {
                let days = n.as_f64()?;
                if !days.is_finite() || days < 0.0 || days.fract() != 0.0 {
                    return None;
                }
                days as u64
            }
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<u64>().unwrap_or(u64::MAX)
        }
        _ => return None,
    };
    Some(u32::try_from(days).unwrap_or(u32::MAX))
}

/// Eligibility from an intake record, `None` while the day count is not a
/// whole non-negative number.
pub fn eligibility_from_record(record: &Value) -> Option<GrantEligibility> {
    let days = benefit_days(resolve_path(record, BENEFIT_DAYS_PATH)?)?;
    Some(check_grant_eligibility(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threshold_is_inclusive() {
        let at = check_grant_eligibility(150);
        assert!(at.eligible);
        assert_eq!(at.shortfall, 0);

        let below = check_grant_eligibility(149);
        assert!(!below.eligible);
        assert_eq!(below.shortfall, 1);

        assert_eq!(check_grant_eligibility(0).shortfall, MIN_BENEFIT_DAYS);
    }

    #[test]
    fn reads_days_from_record() {
        let record = json!({"personal": {"benefitDaysRemaining": 200}});
        assert!(eligibility_from_record(&record).unwrap().eligible);

        let record = json!({"personal": {"benefitDaysRemaining": " 120 "}});
        assert!(!eligibility_from_record(&record).unwrap().eligible);
    }

    #[test]
    fn day_count_accepts_only_whole_non_negative_numbers() {
        assert_eq!(benefit_days(&json!(150)), Some(150));
        assert_eq!(benefit_days(&json!(150.0)), Some(150));
        assert_eq!(benefit_days(&json!("0")), Some(0));
        for rejected in [
            json!("NaN"),
            json!("inf"),
            json!("-40"),
            json!(-40),
            json!(12.5),
            json!("12.5"),
            json!("150.0"),
            json!("+150"),
            json!(""),
            json!(true),
            json!([150]),
        ] {
            assert_eq!(benefit_days(&rejected), None, "{rejected} should be rejected");
        }
    }

    #[test]
    fn integral_float_days_are_read_from_record() {
        let record = json!({"personal": {"benefitDaysRemaining": 150.0}});
        let eligibility = eligibility_from_record(&record).unwrap();
        assert!(eligibility.eligible);
        assert_eq!(eligibility.days_remaining, 150);
    }

    #[test]
    fn missing_or_vague_days_yield_none() {
        assert!(eligibility_from_record(&json!({})).is_none());
        let record = json!({"personal": {"benefitDaysRemaining": "ungefähr ein Jahr"}});
        assert!(eligibility_from_record(&record).is_none());
        let record = json!({"personal": {"benefitDaysRemaining": -3}});
        assert!(eligibility_from_record(&record).is_none());
    }
}
