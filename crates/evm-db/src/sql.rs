//! SQL text per backend. Table names must already be validated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

const EVENT_COLUMNS: &str = "controller, event_index, event_timestamp, event_type, granted, \
                             door, direction, card_number, reason";

impl Dialect {
    fn placeholders(self, n: usize) -> String {
        (1..=n)
            .map(|i| match self {
                Dialect::Postgres => format!("${i}"),
                Dialect::Sqlite => "?".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn select_indices(self, table: &str) -> String {
        format!(
            "select distinct event_index from {table} where controller = {} order by event_index",
            self.placeholders(1)
        )
    }

    /// Upsert one event; binds follow the column order of the events table.
    pub fn upsert_event(self, table: &str) -> String {
        format!(
            r#"
            insert into {table} ({EVENT_COLUMNS})
            values ({})
            on conflict (controller, event_index) do update set
              event_timestamp = excluded.event_timestamp,
              event_type = excluded.event_type,
              granted = excluded.granted,
              door = excluded.door,
              direction = excluded.direction,
              card_number = excluded.card_number,
              reason = excluded.reason
            "#,
            self.placeholders(9)
        )
    }

    pub fn insert_log(self, table: &str) -> String {
        format!(
            "insert into {table} (logged_at, operation, controller, detail) values ({})",
            self.placeholders(4)
        )
    }

    pub fn create_events_table(self, table: &str) -> String {
        format!(
            r#"
            create table if not exists {table} (
              controller      bigint  not null,
              event_index     bigint  not null,
              event_timestamp timestamp,
              event_type      integer not null default 0,
              granted         boolean not null default false,
              door            integer not null default 0,
              direction       integer not null default 0,
              card_number     bigint  not null default 0,
              reason          integer not null default 0,
              primary key (controller, event_index)
            )
            "#
        )
    }

    pub fn create_log_table(self, table: &str) -> String {
        let (id, logged_at) = match self {
            Dialect::Postgres => ("id bigserial primary key", "logged_at timestamptz not null"),
            Dialect::Sqlite => ("id integer primary key autoincrement", "logged_at text not null"),
        };
        format!(
            r#"
            create table if not exists {table} (
              {id},
              {logged_at},
              operation  text not null,
              controller bigint,
              detail     text not null
            )
            "#
        )
    }

    /// Returns one row, one column: 1 when the table exists, 0 otherwise.
    pub fn table_exists(self) -> &'static str {
        match self {
            Dialect::Postgres => {
                r#"
                select count(*)::bigint
                from information_schema.tables
                where table_schema = current_schema() and table_name = lower($1)
                "#
            }
            Dialect::Sqlite => "select count(*) from sqlite_master where type = 'table' and name = ?",
        }
    }
}
