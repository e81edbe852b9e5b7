//! SeaORM entity models used by the database storage backend.
//!
//! These structs map to the SQLite tables created by `database_storage`:
//! - `alerts`: one row per alert, source descriptor flattened into `source_*` columns
//! - `decisions`: enforcement directives, each owned by one alert

/// Alerts table entity model.
pub mod alerts {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "alerts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub uuid: String,
        pub created_at: DateTimeUtc,
        pub machine_id: String,
        pub scenario: String,
        pub scenario_hash: String,
        pub scenario_version: String,
        pub message: String,
        pub events_count: i32,
        pub capacity: i32,
        pub leakspeed: String,
        pub start_at: DateTimeUtc,
        pub stop_at: DateTimeUtc,
        pub simulated: bool,
        pub source_scope: String,
        pub source_value: String,
        pub source_ip: Option<String>,
        pub source_range: Option<String>,
        pub source_as_name: Option<String>,
        pub source_as_number: Option<String>,
        pub source_cn: Option<String>,
        pub source_latitude: Option<f64>,
        pub source_longitude: Option<f64>,
        /// JSON-serialized event list
        pub events: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::decisions::Entity")]
        Decisions,
    }

    impl Related<super::decisions::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Decisions.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Decisions table entity model.
pub mod decisions {
    use sea_orm::entity::prelude::*;

    /// Address bounds are stored as `(ip, suffix)` signed pairs, see `network::address_range`.
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "decisions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Foreign key to `alerts.id`
        pub alert_id: i64,
        pub created_at: DateTimeUtc,
        pub until: DateTimeUtc,
        pub scenario: String,
        pub origin: String,
        pub decision_type: String,
        pub scope: String,
        pub value: String,
        /// 4 or 16, null for non-address scopes
        pub ip_size: Option<i32>,
        pub start_ip: Option<i64>,
        pub start_suffix: Option<i64>,
        pub end_ip: Option<i64>,
        pub end_suffix: Option<i64>,
        pub simulated: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        /// Belongs to an alert
        #[sea_orm(
            belongs_to = "super::alerts::Entity",
            from = "Column::AlertId",
            to = "super::alerts::Column::Id"
        )]
        Alert,
    }

    impl Related<super::alerts::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Alert.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}
