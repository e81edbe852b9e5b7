use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::address_range::AddressRange;

/// A persisted alert with the decisions visible to the current query.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
    pub decisions: Vec<Decision>,
    pub events: Vec<Event>,
    pub events_count: i32,
    pub id: i64,
    pub leakspeed: String,
    pub machine_id: String,
    pub message: String,
    pub scenario: String,
    pub scenario_hash: String,
    pub scenario_version: String,
    pub simulated: bool,
    pub source: Source,
    pub start_at: DateTime<Utc>,
    pub stop_at: DateTime<Utc>,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Time left before expiry at query time, negative once expired.
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ip: Option<i64>,
    pub id: i64,
    pub origin: String,
    pub scenario: String,
    pub scope: String,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ip: Option<i64>,
    #[serde(rename = "type")]
    pub decision_type: String,
    pub value: String,
    #[serde(skip)]
    pub until: DateTime<Utc>,
    #[serde(skip)]
    pub range: Option<AddressRange>,
}

impl Decision {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub scope: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub meta: Vec<Meta>,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub key: String,
    pub value: String,
}

/// A validated alert ready to be persisted. The identifier is assigned by the backend.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub uuid: Uuid,
    pub machine_id: String,
    pub scenario: String,
    pub scenario_hash: String,
    pub scenario_version: String,
    pub message: String,
    pub events_count: i32,
    pub capacity: i32,
    pub leakspeed: String,
    pub start_at: DateTime<Utc>,
    pub stop_at: DateTime<Utc>,
    pub simulated: bool,
    pub source: Source,
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    pub decisions: Vec<NewDecision>,
}

#[derive(Debug, Clone)]
pub struct NewDecision {
    pub origin: String,
    pub scenario: String,
    pub scope: String,
    pub decision_type: String,
    pub value: String,
    pub until: DateTime<Utc>,
    /// Set for `Ip` and `Range` scoped decisions.
    pub range: Option<AddressRange>,
    pub simulated: bool,
}

impl NewDecision {
    /// Materializes the stored view of this decision under the given identifier.
    pub fn to_decision(&self, id: i64, now: DateTime<Utc>) -> Decision {
        Decision {
            duration: format_duration(self.until - now),
            end_ip: self.range.map(|r| r.end_columns().0),
            id,
            origin: self.origin.clone(),
            scenario: self.scenario.clone(),
            scope: self.scope.clone(),
            simulated: self.simulated,
            start_ip: self.range.map(|r| r.start_columns().0),
            decision_type: self.decision_type.clone(),
            value: self.value.clone(),
            until: self.until,
            range: self.range,
        }
    }
}

/// Renders a signed duration the compact way (`4h`, `1m30s`, `-2s`), truncated to seconds.
pub fn format_duration(delta: TimeDelta) -> String {
    let seconds = delta.num_seconds();
    let formatted = humantime::format_duration(std::time::Duration::from_secs(
        seconds.unsigned_abs(),
    ))
    .to_string()
    .replace(' ', "");
    if seconds < 0 {
        format!("-{}", formatted)
    } else {
        formatted
    }
}
