//! Inbound alert payloads.
//!
//! Every field is optional at the serde level so that a missing mandatory field is reported
//! as a validation failure listing all absent fields, rather than a generic parse error.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error_handling::types::IngestError;
use crate::network::address_range::AddressRange;
use crate::storage::types::{format_duration, Event, NewAlert, NewDecision, Source};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceInput {
    pub scope: Option<String>,
    pub value: Option<String>,
    pub ip: Option<String>,
    pub range: Option<String>,
    pub as_name: Option<String>,
    pub as_number: Option<String>,
    pub cn: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionInput {
    pub duration: Option<String>,
    pub scope: Option<String>,
    #[serde(rename = "type")]
    pub decision_type: Option<String>,
    pub value: Option<String>,
    pub origin: Option<String>,
    pub scenario: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertInput {
    pub scenario: Option<String>,
    pub scenario_hash: Option<String>,
    pub scenario_version: Option<String>,
    pub simulated: Option<bool>,
    pub source: Option<SourceInput>,
    pub message: Option<String>,
    pub events_count: Option<i32>,
    pub capacity: Option<i32>,
    pub leakspeed: Option<String>,
    pub start_at: Option<String>,
    pub stop_at: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub decisions: Vec<DecisionInput>,
}

impl AlertInput {
    /// Paths of the absent mandatory fields, in reporting order.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.scenario.is_none() {
            missing.push("scenario".to_string());
        }
        if self.scenario_hash.is_none() {
            missing.push("scenario_hash".to_string());
        }
        if self.scenario_version.is_none() {
            missing.push("scenario_version".to_string());
        }
        if self.simulated.is_none() {
            missing.push("simulated".to_string());
        }
        match &self.source {
            None => missing.push("source".to_string()),
            Some(source) => {
                if source.scope.is_none() {
                    missing.push("source.scope".to_string());
                }
                if source.value.is_none() {
                    missing.push("source.value".to_string());
                }
            }
        }
        for (i, decision) in self.decisions.iter().enumerate() {
            let fields = [
                ("duration", decision.duration.is_none()),
                ("scope", decision.scope.is_none()),
                ("type", decision.decision_type.is_none()),
                ("value", decision.value.is_none()),
            ];
            for (name, absent) in fields {
                if absent {
                    missing.push(format!("decisions.{}.{}", i, name));
                }
            }
        }
        missing
    }

    /// Validates the payload and expands it into an insert record owned by `machine_id`.
    pub fn into_new_alert(
        self,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> Result<NewAlert, IngestError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(IngestError::MissingRequiredField(missing));
        }

        let start_at = parse_timestamp("start_at", self.start_at.as_deref(), now)?;
        let stop_at = parse_timestamp("stop_at", self.stop_at.as_deref(), now)?;

        // checked by missing_fields above
        let scenario = self.scenario.unwrap_or_default();
        let simulated = self.simulated.unwrap_or_default();
        let source = self.source.unwrap_or_default();
        let source = Source {
            as_name: source.as_name,
            as_number: source.as_number,
            cn: source.cn,
            ip: source.ip,
            latitude: source.latitude,
            longitude: source.longitude,
            range: source.range,
            scope: source.scope.unwrap_or_default(),
            value: source.value.unwrap_or_default(),
        };
        let events_count = self.events_count.unwrap_or(0);

        let mut decisions = Vec::with_capacity(self.decisions.len());
        for (i, decision) in self.decisions.into_iter().enumerate() {
            decisions.push(expand_decision(i, decision, machine_id, &scenario, simulated, now)?);
        }

        let message = match self.message {
            Some(message) if !message.is_empty() => message,
            _ => format!(
                "{} {} performed '{}' ({} events over {})",
                source.scope,
                source.value,
                scenario,
                events_count,
                format_duration(stop_at - start_at)
            ),
        };

        Ok(NewAlert {
            uuid: Uuid::new_v4(),
            machine_id: machine_id.to_string(),
            scenario,
            scenario_hash: self.scenario_hash.unwrap_or_default(),
            scenario_version: self.scenario_version.unwrap_or_default(),
            message,
            events_count,
            capacity: self.capacity.unwrap_or(0),
            leakspeed: self.leakspeed.unwrap_or_default(),
            start_at,
            stop_at,
            simulated,
            source,
            events: self.events,
            created_at: now,
            decisions,
        })
    }
}

fn parse_timestamp(
    field: &str,
    value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, IngestError> {
    match value {
        None => Ok(now),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                IngestError::InvalidField(format!(
                    "{} in body must be of type date-time: \"{}\": {}",
                    field, raw, e
                ))
            }),
    }
}

fn expand_decision(
    index: usize,
    input: DecisionInput,
    machine_id: &str,
    scenario: &str,
    simulated: bool,
    now: DateTime<Utc>,
) -> Result<NewDecision, IngestError> {
    let raw_duration = input.duration.unwrap_or_default();
    let duration = humantime::parse_duration(&raw_duration)
        .map_err(|e| e.to_string())
        .and_then(|d| TimeDelta::from_std(d).map_err(|e| e.to_string()))
        .map_err(|e| {
            IngestError::InvalidField(format!(
                "decisions.{}.duration: '{}' is not a valid duration: {}",
                index, raw_duration, e
            ))
        })?;

    let until = now.checked_add_signed(duration).ok_or_else(|| {
        IngestError::InvalidField(format!(
            "decisions.{}.duration: '{}' is out of range",
            index, raw_duration
        ))
    })?;

    let scope = input.scope.unwrap_or_default();
    let value = input.value.unwrap_or_default();
    let range = if scope.eq_ignore_ascii_case("ip") || scope.eq_ignore_ascii_case("range") {
        Some(AddressRange::encode(&value)?)
    } else {
        None
    };

    Ok(NewDecision {
        origin: input.origin.unwrap_or_else(|| machine_id.to_string()),
        scenario: input.scenario.unwrap_or_else(|| scenario.to_string()),
        scope,
        decision_type: input.decision_type.unwrap_or_default(),
        value,
        until,
        range,
        simulated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::CodecError;

    fn parse(json: &str) -> AlertInput {
        serde_json::from_str(json).unwrap()
    }

    const VALID: &str = r#"{
        "scenario": "crowdsecurity/ssh-bf",
        "scenario_hash": "4441dcff07020f6690d998b7101e642359ba405c2abb83565bbbdcee36de280f",
        "scenario_version": "0.1",
        "simulated": false,
        "events_count": 6,
        "capacity": 5,
        "leakspeed": "10s",
        "start_at": "2020-10-09T10:00:01Z",
        "stop_at": "2020-10-09T10:00:07Z",
        "source": {"scope": "Ip", "value": "91.121.79.195", "ip": "91.121.79.195", "cn": "FR"},
        "decisions": [{"duration": "4h", "scope": "Ip", "type": "ban", "value": "91.121.79.195"}]
    }"#;

    #[test]
    fn test_missing_fields_in_order() {
        let input = parse(r#"{"decisions": [{"scope": "Ip"}]}"#);
        assert_eq!(
            input.missing_fields(),
            vec![
                "scenario",
                "scenario_hash",
                "scenario_version",
                "simulated",
                "source",
                "decisions.0.duration",
                "decisions.0.type",
                "decisions.0.value",
            ]
        );

        let input = parse(r#"{"scenario":"a","scenario_hash":"b","scenario_version":"c","simulated":true,"source":{}}"#);
        assert_eq!(input.missing_fields(), vec!["source.scope", "source.value"]);
    }

    #[test]
    fn test_expansion_defaults() {
        let now = Utc::now();
        let alert = parse(VALID).into_new_alert("sensor-1", now).unwrap();

        assert_eq!(alert.machine_id, "sensor-1");
        assert_eq!(alert.events_count, 6);
        assert_eq!(
            alert.message,
            "Ip 91.121.79.195 performed 'crowdsecurity/ssh-bf' (6 events over 6s)"
        );
        assert_eq!(alert.source.cn.as_deref(), Some("FR"));

        let decision = &alert.decisions[0];
        assert_eq!(decision.origin, "sensor-1");
        assert_eq!(decision.scenario, "crowdsecurity/ssh-bf");
        assert_eq!(decision.until, now + TimeDelta::hours(4));
        assert!(decision.range.unwrap().is_point());
        assert!(!decision.simulated);
    }

    #[test]
    fn test_message_kept_and_simulated_inherited() {
        let now = Utc::now();
        let mut input = parse(VALID);
        input.message = Some("custom".into());
        input.simulated = Some(true);
        input.decisions[0].scope = Some("range".into());
        input.decisions[0].value = Some("91.121.79.0/24".into());

        let alert = input.into_new_alert("sensor-1", now).unwrap();
        assert_eq!(alert.message, "custom");
        assert!(alert.decisions[0].simulated);
        assert!(!alert.decisions[0].range.unwrap().is_point());
    }

    #[test]
    fn test_non_address_scope_has_no_range() {
        let mut input = parse(VALID);
        input.decisions[0].scope = Some("Country".into());
        input.decisions[0].value = Some("FR".into());
        let alert = input.into_new_alert("sensor-1", Utc::now()).unwrap();
        assert!(alert.decisions[0].range.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let now = Utc::now();

        let mut input = parse(VALID);
        input.decisions[0].value = Some("gruueq".into());
        assert!(matches!(
            input.into_new_alert("m", now),
            Err(IngestError::InvalidDecision(CodecError::InvalidAddressFormat(_)))
        ));

        let mut input = parse(VALID);
        input.decisions[0].duration = Some("forever".into());
        assert!(matches!(
            input.into_new_alert("m", now),
            Err(IngestError::InvalidField(_))
        ));

        let mut input = parse(VALID);
        input.start_at = Some("yesterday".into());
        assert!(matches!(
            input.into_new_alert("m", now),
            Err(IngestError::InvalidField(_))
        ));
    }
}
