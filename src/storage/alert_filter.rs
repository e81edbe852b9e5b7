//! Alert query filters.
//!
//! A request query string is parsed into an [`AlertFilter`]: a conjunction of
//! [`FilterPredicate`] values drawn from a closed set of keys. Unknown keys are rejected, never
//! ignored. Parsing is pure; every pair is validated before a backend is touched.
//!
//! Predicates fall into two groups:
//! - alert-scoped: `scenario`, `since`, `until`, `simulated`, `has_active_decision=false`
//! - decision-scoped: `scope`, `decision_type`, `ip`, `range`, `has_active_decision=true`
//!
//! An alert matches when every alert-scoped predicate holds and, if any decision-scoped
//! predicate is present, one of its decisions satisfies all of them at once.
//! `has_active_decision=false` holds when no visible decision of the alert is active,
//! which includes alerts without decisions.

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

use crate::error_handling::types::FilterError;
use crate::network::address_range::AddressRange;
use crate::storage::types::{Alert, Decision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPredicate {
    Scope(String),
    DecisionType(String),
    Scenario(String),
    /// Decision interval must contain this point.
    Ip(AddressRange),
    /// Decision interval must overlap this block.
    Range(AddressRange),
    /// Alert started no earlier than `now - delta`.
    Since(TimeDelta),
    /// Alert started before `now - delta`.
    Until(TimeDelta),
    Simulated(bool),
    HasActiveDecision(bool),
}

impl FilterPredicate {
    pub fn parse(key: &str, value: &str) -> Result<Self, FilterError> {
        let predicate = match key {
            "scope" => FilterPredicate::Scope(value.to_string()),
            "decision_type" => FilterPredicate::DecisionType(value.to_string()),
            "scenario" => FilterPredicate::Scenario(value.to_string()),
            "ip" => FilterPredicate::Ip(AddressRange::from_address(value)?),
            "range" => FilterPredicate::Range(AddressRange::from_cidr(value)?),
            "since" => FilterPredicate::Since(parse_delta(value)?),
            "until" => FilterPredicate::Until(parse_delta(value)?),
            "simulated" => FilterPredicate::Simulated(parse_bool(value)?),
            "has_active_decision" => FilterPredicate::HasActiveDecision(parse_bool(value)?),
            _ => {
                return Err(FilterError::UnknownFilterKey {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        };
        Ok(predicate)
    }

    pub fn is_decision_scoped(&self) -> bool {
        matches!(
            self,
            FilterPredicate::Scope(_)
                | FilterPredicate::DecisionType(_)
                | FilterPredicate::Ip(_)
                | FilterPredicate::Range(_)
                | FilterPredicate::HasActiveDecision(true)
        )
    }
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(value: &str) -> Result<bool, FilterError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(FilterError::TypeConversionError {
            value: value.to_string(),
            reason: format!("parsing \"{}\": invalid syntax", value),
        }),
    }
}

const DURATION_UNITS: &[&str] = &["ns", "us", "µs", "μs", "ms", "s", "m", "h"];

/// Parses a signed duration such as `90m` or `-1h`.
///
/// Only `ns us µs ms s m h` units are valid; days, weeks and months are rejected.
fn parse_delta(value: &str) -> Result<TimeDelta, FilterError> {
    let (negative, magnitude) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if magnitude == "0" {
        return Ok(TimeDelta::zero());
    }
    check_duration_units(value, magnitude)?;

    let normalized = magnitude.replace(&['µ', 'μ'][..], "u");
    let duration = humantime::parse_duration(&normalized)
        .map_err(|e| FilterError::DurationParseError(e.to_string()))?;
    let delta = TimeDelta::from_std(duration)
        .map_err(|_| FilterError::DurationParseError(format!("duration '{}' is too large", value)))?;
    Ok(if negative { -delta } else { delta })
}

/// Splits `magnitude` into `<number><unit>` groups and checks every unit.
fn check_duration_units(value: &str, magnitude: &str) -> Result<(), FilterError> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    if magnitude.is_empty() {
        return Err(FilterError::DurationParseError(format!(
            "invalid duration \"{}\"",
            value
        )));
    }

    let mut rest = magnitude;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return Err(FilterError::DurationParseError(format!(
                "invalid duration \"{}\"",
                value
            )));
        }
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        if unit.is_empty() {
            return Err(FilterError::DurationParseError(format!(
                "missing unit in duration \"{}\"",
                value
            )));
        }
        if !DURATION_UNITS.contains(&unit) {
            return Err(FilterError::DurationParseError(format!(
                "unknown unit \"{}\" in duration \"{}\"",
                unit, value
            )));
        }
        rest = &rest[unit_len..];
    }
    Ok(())
}

/// `now - delta`, saturating at the representable bounds.
pub fn window_start(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    predicates: Vec<FilterPredicate>,
}

impl AlertFilter {
    /// Parses query pairs in request order. The first invalid pair decides the error.
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut predicates = Vec::new();
        for (key, value) in pairs {
            predicates.push(FilterPredicate::parse(key.as_ref(), value.as_ref())?);
        }
        debug!("parsed alert filter: {:?}", predicates);
        Ok(Self { predicates })
    }

    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    /// Simulation policy: the last `simulated` key wins, `default` applies when absent.
    pub fn include_simulated(&self, default: bool) -> bool {
        self.predicates
            .iter()
            .rev()
            .find_map(|p| match p {
                FilterPredicate::Simulated(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(default)
    }

    pub fn has_decision_predicates(&self) -> bool {
        self.predicates.iter().any(FilterPredicate::is_decision_scoped)
    }

    /// Evaluates the alert-level conjunction, including the decision existence test.
    pub fn matches(&self, alert: &Alert, include_simulated: bool, now: DateTime<Utc>) -> bool {
        if !include_simulated && alert.simulated {
            return false;
        }
        for predicate in &self.predicates {
            let ok = match predicate {
                FilterPredicate::Scenario(s) => &alert.scenario == s,
                FilterPredicate::Since(delta) => alert.start_at >= window_start(now, *delta),
                FilterPredicate::Until(delta) => alert.start_at < window_start(now, *delta),
                FilterPredicate::HasActiveDecision(false) => !alert
                    .decisions
                    .iter()
                    .any(|d| (include_simulated || !d.simulated) && d.is_active(now)),
                _ => true,
            };
            if !ok {
                return false;
            }
        }
        if self.has_decision_predicates() {
            return alert
                .decisions
                .iter()
                .any(|d| self.decision_matches(d, include_simulated, now));
        }
        true
    }

    /// Evaluates the decision-scoped predicates against one decision.
    pub fn decision_matches(
        &self,
        decision: &Decision,
        include_simulated: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if !include_simulated && decision.simulated {
            return false;
        }
        self.predicates.iter().all(|predicate| match predicate {
            FilterPredicate::Scope(s) => &decision.scope == s,
            FilterPredicate::DecisionType(t) => &decision.decision_type == t,
            FilterPredicate::Ip(point) => decision.range.is_some_and(|r| r.contains(point)),
            FilterPredicate::Range(block) => decision.range.is_some_and(|r| r.overlaps(block)),
            FilterPredicate::HasActiveDecision(true) => decision.is_active(now),
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::CodecError;
    use crate::storage::types::{NewDecision, Source};
    use uuid::Uuid;

    fn sample_alert(simulated: bool, now: DateTime<Utc>) -> Alert {
        let decision = NewDecision {
            origin: "test".into(),
            scenario: "crowdsecurity/ssh-bf".into(),
            scope: "Ip".into(),
            decision_type: "ban".into(),
            value: "91.121.79.195".into(),
            until: now + TimeDelta::hours(4),
            range: Some(AddressRange::encode("91.121.79.195").unwrap()),
            simulated,
        }
        .to_decision(1, now);
        Alert {
            capacity: 5,
            created_at: now,
            decisions: vec![decision],
            events: vec![],
            events_count: 6,
            id: 1,
            leakspeed: "10s".into(),
            machine_id: "test".into(),
            message: String::new(),
            scenario: "crowdsecurity/ssh-bf".into(),
            scenario_hash: "hash".into(),
            scenario_version: "0.1".into(),
            simulated,
            source: Source {
                scope: "Ip".into(),
                value: "91.121.79.195".into(),
                ..Default::default()
            },
            start_at: now,
            stop_at: now,
            uuid: Uuid::new_v4(),
        }
    }

    fn filter(pairs: &[(&str, &str)]) -> Result<AlertFilter, FilterError> {
        AlertFilter::from_query(pairs.iter().copied())
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = filter(&[("scope", "Ip"), ("test", "test")]).unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownFilterKey {
                key: "test".into(),
                value: "test".into()
            }
        );
    }

    #[test]
    fn test_first_invalid_pair_wins() {
        let err = filter(&[("ip", "gruueq"), ("range", "ratata")]).unwrap_err();
        assert_eq!(
            err,
            FilterError::Codec(CodecError::InvalidAddressFormat("gruueq".into()))
        );
    }

    #[test]
    fn test_bool_and_duration_errors() {
        let err = filter(&[("has_active_decision", "ratatqata")]).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("'ratatqata' is not a boolean: "));
        assert!(err.to_string().ends_with(": unable to parse type"));

        let err = filter(&[("since", "1zuzu")]).unwrap_err();
        assert!(matches!(err, FilterError::DurationParseError(_)));
        assert!(err.to_string().starts_with("while parsing duration: "));
    }

    #[test]
    fn test_bool_literals() {
        for literal in ["1", "t", "T", "TRUE", "true", "True"] {
            let f = filter(&[("simulated", literal)]).unwrap();
            assert!(f.include_simulated(false), "{}", literal);
        }
        for literal in ["0", "f", "F", "FALSE", "false", "False"] {
            let f = filter(&[("simulated", literal)]).unwrap();
            assert!(!f.include_simulated(true), "{}", literal);
        }
        assert_eq!(
            filter(&[("has_active_decision", "True")]).unwrap().predicates(),
            &[FilterPredicate::HasActiveDecision(true)]
        );

        for literal in ["yes", "tRuE", "2", ""] {
            let err = filter(&[("simulated", literal)]).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!(
                    "'{0}' is not a boolean: parsing \"{0}\": invalid syntax: unable to parse type",
                    literal
                )
            );
        }
    }

    #[test]
    fn test_duration_units() {
        let accepted: &[(&str, TimeDelta)] = &[
            ("90m", TimeDelta::minutes(90)),
            ("2h", TimeDelta::hours(2)),
            ("15s", TimeDelta::seconds(15)),
            ("250ms", TimeDelta::milliseconds(250)),
            ("1us", TimeDelta::microseconds(1)),
            ("1µs", TimeDelta::microseconds(1)),
            ("1ns", TimeDelta::nanoseconds(1)),
            ("-1h", TimeDelta::hours(-1)),
            ("+1h", TimeDelta::hours(1)),
            ("0", TimeDelta::zero()),
        ];
        for (raw, expected) in accepted {
            let f = filter(&[("since", *raw)]).unwrap();
            assert_eq!(f.predicates(), &[FilterPredicate::Since(*expected)], "{}", raw);
        }

        for raw in ["1d", "2w", "1M", "1y", "1", "h", "", "-", "1 h"] {
            let err = filter(&[("until", raw)]).unwrap_err();
            assert!(matches!(err, FilterError::DurationParseError(_)), "{}", raw);
        }
        assert_eq!(
            filter(&[("since", "1d")]).unwrap_err().to_string(),
            "while parsing duration: unknown unit \"d\" in duration \"1d\""
        );
    }

    #[test]
    fn test_negative_since_points_to_future() {
        let now = Utc::now();
        let alert = sample_alert(false, now);
        assert!(!filter(&[("since", "-1h")]).unwrap().matches(&alert, false, now));
        assert!(filter(&[("until", "-1h")]).unwrap().matches(&alert, false, now));
        assert_eq!(
            window_start(now, TimeDelta::days(1_000_000_000)),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(
            window_start(now, TimeDelta::days(-1_000_000_000)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_inactive_means_no_active_decision() {
        let now = Utc::now();
        let inactive = filter(&[("has_active_decision", "false")]).unwrap();
        let active = filter(&[("has_active_decision", "true")]).unwrap();
        assert!(!inactive.has_decision_predicates());
        assert!(active.has_decision_predicates());

        let mut mixed = sample_alert(false, now);
        let mut expired = mixed.decisions[0].clone();
        expired.until = now - TimeDelta::minutes(1);
        mixed.decisions.push(expired.clone());
        assert!(active.matches(&mixed, false, now));
        assert!(!inactive.matches(&mixed, false, now));

        let mut only_expired = sample_alert(false, now);
        only_expired.decisions = vec![expired];
        assert!(!active.matches(&only_expired, false, now));
        assert!(inactive.matches(&only_expired, false, now));

        let mut bare = sample_alert(false, now);
        bare.decisions.clear();
        assert!(!active.matches(&bare, false, now));
        assert!(inactive.matches(&bare, false, now));

        // an active decision hidden by the simulation policy does not count
        let mut hidden = sample_alert(false, now);
        hidden.decisions[0].simulated = true;
        assert!(inactive.matches(&hidden, false, now));
        assert!(!inactive.matches(&hidden, true, now));
    }

    #[test]
    fn test_decision_predicates() {
        let now = Utc::now();
        let alert = sample_alert(false, now);

        let cases: &[(&[(&str, &str)], bool)] = &[
            (&[], true),
            (&[("decision_type", "ban")], true),
            (&[("decision_type", "ratata")], false),
            (&[("scope", "Ip")], true),
            (&[("scope", "rarara")], false),
            (&[("scenario", "crowdsecurity/ssh-bf")], true),
            (&[("scenario", "crowdsecurity/nope")], false),
            (&[("ip", "91.121.79.195")], true),
            (&[("ip", "99.122.77.195")], false),
            (&[("range", "91.121.79.0/24")], true),
            (&[("range", "99.122.77.0/24")], false),
            (&[("has_active_decision", "true")], true),
            (&[("has_active_decision", "false")], false),
            (&[("scope", "Ip"), ("decision_type", "captcha")], false),
        ];
        for (pairs, expected) in cases {
            let f = filter(pairs).unwrap();
            let include = f.include_simulated(false);
            assert_eq!(f.matches(&alert, include, now), *expected, "{:?}", pairs);
        }
    }

    #[test]
    fn test_time_window() {
        let now = Utc::now();
        let mut alert = sample_alert(false, now);
        alert.start_at = now - TimeDelta::seconds(30);

        let f = filter(&[("since", "1h")]).unwrap();
        assert!(f.matches(&alert, false, now));
        let f = filter(&[("since", "1ns")]).unwrap();
        assert!(!f.matches(&alert, false, now));
        let f = filter(&[("until", "1ns")]).unwrap();
        assert!(f.matches(&alert, false, now));
        let f = filter(&[("until", "1m")]).unwrap();
        assert!(!f.matches(&alert, false, now));
    }

    #[test]
    fn test_simulation_policy() {
        let now = Utc::now();
        let simulated = sample_alert(true, now);

        let absent = AlertFilter::default();
        assert!(!absent.include_simulated(false));
        assert!(!absent.matches(&simulated, absent.include_simulated(false), now));

        let on = filter(&[("simulated", "true")]).unwrap();
        assert!(on.matches(&simulated, on.include_simulated(false), now));

        let off = filter(&[("simulated", "false")]).unwrap();
        assert!(!off.include_simulated(true));
    }
}
