//! SQL for the `feature_store` table.
//!
//! The table mirrors the wire record. `salesdate` holds ISO `YYYY-MM-DD`
//! text, `freeship` a 0/1 boolean and `update_time` the sortable
//! `YYYY-MM-DD HH:MM:SS` form of the admission stamp.

pub const TABLE: &str = "feature_store";

/// Executed once per connection.
pub const PRAGMAS: &str = "PRAGMA journal_mode = WAL;";

pub const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS feature_store (
    salesdate   DATE      NOT NULL,
    productid   INT       NOT NULL,
    region      TEXT      NOT NULL,
    freeship    BOOLEAN   NOT NULL,
    discount    FLOAT     NOT NULL DEFAULT 0,
    itemssold   INT       NOT NULL,
    update_time TIMESTAMP,
    PRIMARY KEY (salesdate, productid, region)
);
";

pub const DROP_TABLE: &str = "DROP TABLE IF EXISTS feature_store;";

pub const TABLE_EXISTS: &str =
  "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1";

pub const INSERT: &str = "
INSERT INTO feature_store
    (salesdate, productid, region, freeship, discount, itemssold, update_time)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

/// Same as [`INSERT`], but a key already in the table takes the incoming
/// non-key values.
pub const UPSERT: &str = "
INSERT INTO feature_store
    (salesdate, productid, region, freeship, discount, itemssold, update_time)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT (salesdate, productid, region) DO UPDATE SET
    freeship    = excluded.freeship,
    discount    = excluded.discount,
    itemssold   = excluded.itemssold,
    update_time = excluded.update_time
";

pub const SELECT_COLUMNS: &str =
  "SELECT salesdate, productid, region, freeship, discount, itemssold, update_time
   FROM feature_store";
