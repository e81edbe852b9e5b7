use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::network::address_range::AddressRange;
use crate::storage::alert_filter::{window_start, AlertFilter, FilterPredicate};
use crate::storage::db_entities::{alerts, decisions};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{format_duration, Alert, Decision, NewAlert, NewDecision, Source};

/// Upper bound on the number of ids bound into one `IN (...)` list.
const ID_CHUNK: usize = 500;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT NOT NULL,
        created_at TEXT NOT NULL,
        machine_id TEXT NOT NULL,
        scenario TEXT NOT NULL,
        scenario_hash TEXT NOT NULL,
        scenario_version TEXT NOT NULL,
        message TEXT NOT NULL,
        events_count INTEGER NOT NULL,
        capacity INTEGER NOT NULL,
        leakspeed TEXT NOT NULL,
        start_at TEXT NOT NULL,
        stop_at TEXT NOT NULL,
        simulated BOOLEAN NOT NULL,
        source_scope TEXT NOT NULL,
        source_value TEXT NOT NULL,
        source_ip TEXT,
        source_range TEXT,
        source_as_name TEXT,
        source_as_number TEXT,
        source_cn TEXT,
        source_latitude REAL,
        source_longitude REAL,
        events TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS decisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        alert_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        until TEXT NOT NULL,
        scenario TEXT NOT NULL,
        origin TEXT NOT NULL,
        decision_type TEXT NOT NULL,
        scope TEXT NOT NULL,
        value TEXT NOT NULL,
        ip_size INTEGER,
        start_ip INTEGER,
        start_suffix INTEGER,
        end_ip INTEGER,
        end_suffix INTEGER,
        simulated BOOLEAN NOT NULL,
        FOREIGN KEY(alert_id) REFERENCES alerts(id)
    );",
    "CREATE INDEX IF NOT EXISTS idx_decisions_alert_id ON decisions(alert_id);",
    "CREATE INDEX IF NOT EXISTS idx_decisions_range ON decisions(ip_size, start_ip, start_suffix, end_ip, end_suffix);",
    "CREATE INDEX IF NOT EXISTS idx_alerts_start_at ON alerts(start_at);",
];

fn read_err(e: DbErr) -> StorageError {
    error!("alert storage read failed: {}", e);
    StorageError::ReadFailed(e.to_string())
}

fn write_err(e: DbErr) -> StorageError {
    error!("alert storage write failed: {}", e);
    StorageError::WriteFailed(e.to_string())
}

pub struct DatabaseStorage {
    db: DatabaseConnection,
    /// Serializes batch transactions so identifier assignment never interleaves.
    write_lock: Mutex<()>,
    bulk_size: usize,
}

impl DatabaseStorage {
    /// Create or open the SQLite database at `path` and ensure the schema exists.
    pub async fn new_file<P: AsRef<Path>>(
        path: P,
        max_connections: u32,
        bulk_size: usize,
    ) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path_ref.display());
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(max_connections).sqlx_logging(false);

        let db = Database::connect(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        db.execute_unprepared("PRAGMA journal_mode=WAL;")
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        for statement in SCHEMA {
            db.execute_unprepared(statement).await.map_err(write_err)?;
        }

        info!("opened alert database at {}", path_ref.display());
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            bulk_size: bulk_size.max(1),
        })
    }

    async fn load_decisions(
        &self,
        alert_ids: &[i64],
        include_simulated: bool,
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, Vec<Decision>>, StorageError> {
        let mut by_alert: HashMap<i64, Vec<Decision>> = HashMap::new();
        for chunk in alert_ids.chunks(ID_CHUNK) {
            let mut query = decisions::Entity::find()
                .filter(decisions::Column::AlertId.is_in(chunk.iter().copied()));
            if !include_simulated {
                query = query.filter(decisions::Column::Simulated.eq(false));
            }
            let rows = query
                .order_by_asc(decisions::Column::Id)
                .all(&self.db)
                .await
                .map_err(read_err)?;
            for row in rows {
                let alert_id = row.alert_id;
                by_alert
                    .entry(alert_id)
                    .or_default()
                    .push(decision_from_model(row, now));
            }
        }
        Ok(by_alert)
    }
}

fn alert_active_model(alert: &NewAlert) -> Result<alerts::ActiveModel, StorageError> {
    let events = serde_json::to_string(&alert.events)
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    Ok(alerts::ActiveModel {
        id: NotSet,
        uuid: Set(alert.uuid.to_string()),
        created_at: Set(alert.created_at),
        machine_id: Set(alert.machine_id.clone()),
        scenario: Set(alert.scenario.clone()),
        scenario_hash: Set(alert.scenario_hash.clone()),
        scenario_version: Set(alert.scenario_version.clone()),
        message: Set(alert.message.clone()),
        events_count: Set(alert.events_count),
        capacity: Set(alert.capacity),
        leakspeed: Set(alert.leakspeed.clone()),
        start_at: Set(alert.start_at),
        stop_at: Set(alert.stop_at),
        simulated: Set(alert.simulated),
        source_scope: Set(alert.source.scope.clone()),
        source_value: Set(alert.source.value.clone()),
        source_ip: Set(alert.source.ip.clone()),
        source_range: Set(alert.source.range.clone()),
        source_as_name: Set(alert.source.as_name.clone()),
        source_as_number: Set(alert.source.as_number.clone()),
        source_cn: Set(alert.source.cn.clone()),
        source_latitude: Set(alert.source.latitude),
        source_longitude: Set(alert.source.longitude),
        events: Set(events),
    })
}

fn decision_active_model(
    alert_id: i64,
    created_at: DateTime<Utc>,
    decision: &NewDecision,
) -> decisions::ActiveModel {
    let start = decision.range.map(|r| r.start_columns());
    let end = decision.range.map(|r| r.end_columns());
    decisions::ActiveModel {
        id: NotSet,
        alert_id: Set(alert_id),
        created_at: Set(created_at),
        until: Set(decision.until),
        scenario: Set(decision.scenario.clone()),
        origin: Set(decision.origin.clone()),
        decision_type: Set(decision.decision_type.clone()),
        scope: Set(decision.scope.clone()),
        value: Set(decision.value.clone()),
        ip_size: Set(decision.range.map(|r| r.family.size())),
        start_ip: Set(start.map(|c| c.0)),
        start_suffix: Set(start.map(|c| c.1)),
        end_ip: Set(end.map(|c| c.0)),
        end_suffix: Set(end.map(|c| c.1)),
        simulated: Set(decision.simulated),
    }
}

fn decision_from_model(model: decisions::Model, now: DateTime<Utc>) -> Decision {
    let range = match (
        model.ip_size,
        model.start_ip,
        model.start_suffix,
        model.end_ip,
        model.end_suffix,
    ) {
        (Some(size), Some(si), Some(ss), Some(ei), Some(es)) => {
            AddressRange::from_columns(size, (si, ss), (ei, es))
        }
        _ => None,
    };
    Decision {
        duration: format_duration(model.until - now),
        end_ip: model.end_ip,
        id: model.id,
        origin: model.origin,
        scenario: model.scenario,
        scope: model.scope,
        simulated: model.simulated,
        start_ip: model.start_ip,
        decision_type: model.decision_type,
        value: model.value,
        until: model.until,
        range,
    }
}

fn alert_from_model(
    model: alerts::Model,
    decisions: Vec<Decision>,
) -> Result<Alert, StorageError> {
    let uuid = Uuid::parse_str(&model.uuid).map_err(|e| StorageError::ReadFailed(e.to_string()))?;
    let events =
        serde_json::from_str(&model.events).map_err(|e| StorageError::ReadFailed(e.to_string()))?;
    Ok(Alert {
        capacity: model.capacity,
        created_at: model.created_at,
        decisions,
        events,
        events_count: model.events_count,
        id: model.id,
        leakspeed: model.leakspeed,
        machine_id: model.machine_id,
        message: model.message,
        scenario: model.scenario,
        scenario_hash: model.scenario_hash,
        scenario_version: model.scenario_version,
        simulated: model.simulated,
        source: Source {
            as_name: model.source_as_name,
            as_number: model.source_as_number,
            cn: model.source_cn,
            ip: model.source_ip,
            latitude: model.source_latitude,
            longitude: model.source_longitude,
            range: model.source_range,
            scope: model.source_scope,
            value: model.source_value,
        },
        start_at: model.start_at,
        stop_at: model.stop_at,
        uuid,
    })
}

/// `(ip, suffix) <= bound`, compared lexicographically.
fn pair_lte(ip: decisions::Column, suffix: decisions::Column, bound: (i64, i64)) -> Condition {
    Condition::any().add(ip.lt(bound.0)).add(
        Condition::all()
            .add(ip.eq(bound.0))
            .add(suffix.lte(bound.1)),
    )
}

/// `(ip, suffix) >= bound`, compared lexicographically.
fn pair_gte(ip: decisions::Column, suffix: decisions::Column, bound: (i64, i64)) -> Condition {
    Condition::any().add(ip.gt(bound.0)).add(
        Condition::all()
            .add(ip.eq(bound.0))
            .add(suffix.gte(bound.1)),
    )
}

/// Decision interval lies around `[low, high]`: `start <= low` and `end >= high`.
///
/// Containment of a point passes the point twice; overlap with a block passes its end then
/// its start.
fn interval_condition(range: &AddressRange, low: (i64, i64), high: (i64, i64)) -> Condition {
    Condition::all()
        .add(decisions::Column::IpSize.eq(range.family.size()))
        .add(pair_lte(
            decisions::Column::StartIp,
            decisions::Column::StartSuffix,
            low,
        ))
        .add(pair_gte(
            decisions::Column::EndIp,
            decisions::Column::EndSuffix,
            high,
        ))
}

/// Translates a filter into a condition over `alerts`.
///
/// Decision-scoped predicates are grouped into a single `id IN (SELECT alert_id ...)`
/// subquery so that one decision has to satisfy all of them. `has_active_decision=false`
/// becomes a separate `NOT IN` over the active decisions.
fn alert_condition(filter: &AlertFilter, include_simulated: bool, now: DateTime<Utc>) -> Condition {
    let mut cond = Condition::all();
    let mut decision_cond = Condition::all();
    if !include_simulated {
        cond = cond.add(alerts::Column::Simulated.eq(false));
        decision_cond = decision_cond.add(decisions::Column::Simulated.eq(false));
    }

    for predicate in filter.predicates() {
        match predicate {
            FilterPredicate::Scenario(s) => {
                cond = cond.add(alerts::Column::Scenario.eq(s.as_str()));
            }
            FilterPredicate::Since(delta) => {
                cond = cond.add(alerts::Column::StartAt.gte(window_start(now, *delta)));
            }
            FilterPredicate::Until(delta) => {
                cond = cond.add(alerts::Column::StartAt.lt(window_start(now, *delta)));
            }
            FilterPredicate::Scope(s) => {
                decision_cond = decision_cond.add(decisions::Column::Scope.eq(s.as_str()));
            }
            FilterPredicate::DecisionType(t) => {
                decision_cond = decision_cond.add(decisions::Column::DecisionType.eq(t.as_str()));
            }
            FilterPredicate::Ip(point) => {
                decision_cond = decision_cond.add(interval_condition(
                    point,
                    point.start_columns(),
                    point.end_columns(),
                ));
            }
            FilterPredicate::Range(block) => {
                decision_cond = decision_cond.add(interval_condition(
                    block,
                    block.end_columns(),
                    block.start_columns(),
                ));
            }
            FilterPredicate::HasActiveDecision(true) => {
                decision_cond = decision_cond.add(decisions::Column::Until.gt(now));
            }
            FilterPredicate::HasActiveDecision(false) => {
                let mut active = Condition::all().add(decisions::Column::Until.gt(now));
                if !include_simulated {
                    active = active.add(decisions::Column::Simulated.eq(false));
                }
                cond = cond.add(
                    alerts::Column::Id.not_in_subquery(
                        Query::select()
                            .column(decisions::Column::AlertId)
                            .from(decisions::Entity)
                            .cond_where(active)
                            .to_owned(),
                    ),
                );
            }
            FilterPredicate::Simulated(_) => {}
        }
    }

    if filter.has_decision_predicates() {
        cond = cond.add(
            alerts::Column::Id.in_subquery(
                Query::select()
                    .column(decisions::Column::AlertId)
                    .from(decisions::Entity)
                    .cond_where(decision_cond)
                    .to_owned(),
            ),
        );
    }
    cond
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<i64>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let txn = self.db.begin().await.map_err(write_err)?;

        let mut ids = Vec::with_capacity(alerts.len());
        for alert in &alerts {
            let inserted = alerts::Entity::insert(alert_active_model(alert)?)
                .exec(&txn)
                .await
                .map_err(write_err)?;
            let alert_id = inserted.last_insert_id;

            let rows: Vec<decisions::ActiveModel> = alert
                .decisions
                .iter()
                .map(|d| decision_active_model(alert_id, alert.created_at, d))
                .collect();
            for chunk in rows.chunks(self.bulk_size) {
                decisions::Entity::insert_many(chunk.iter().cloned())
                    .exec(&txn)
                    .await
                    .map_err(write_err)?;
            }
            ids.push(alert_id);
        }

        txn.commit().await.map_err(write_err)?;
        debug!("committed {} alerts", ids.len());
        Ok(ids)
    }

    async fn list_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StorageError> {
        let include_simulated = filter.include_simulated(false);
        let rows = alerts::Entity::find()
            .filter(alert_condition(filter, include_simulated, now))
            .order_by_desc(alerts::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_err)?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut decisions = self.load_decisions(&ids, include_simulated, now).await?;
        rows.into_iter()
            .map(|row| {
                let owned = decisions.remove(&row.id).unwrap_or_default();
                alert_from_model(row, owned)
            })
            .collect()
    }

    async fn get_alert(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StorageError> {
        let row = alerts::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(read_err)?;
        match row {
            Some(row) => {
                let mut decisions = self.load_decisions(&[id], true, now).await?;
                let owned = decisions.remove(&id).unwrap_or_default();
                alert_from_model(row, owned).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn delete_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let include_simulated = filter.include_simulated(true);
        let cond = alert_condition(filter, include_simulated, now);

        let _guard = self.write_lock.lock().await;
        let txn = self.db.begin().await.map_err(write_err)?;

        let ids: Vec<i64> = alerts::Entity::find()
            .select_only()
            .column(alerts::Column::Id)
            .filter(cond)
            .into_tuple()
            .all(&txn)
            .await
            .map_err(read_err)?;

        for chunk in ids.chunks(ID_CHUNK) {
            decisions::Entity::delete_many()
                .filter(decisions::Column::AlertId.is_in(chunk.iter().copied()))
                .exec(&txn)
                .await
                .map_err(write_err)?;
            alerts::Entity::delete_many()
                .filter(alerts::Column::Id.is_in(chunk.iter().copied()))
                .exec(&txn)
                .await
                .map_err(write_err)?;
        }

        txn.commit().await.map_err(write_err)?;
        Ok(ids.len() as u64)
    }
}
