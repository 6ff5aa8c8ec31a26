// SQLite access for the tasks table
//
// Only the store worker holds a Table; nothing else touches the connection.

use crate::error::{StoreError, StoreResult};
use crate::record::{Priority, TaskDraft, TaskId, TaskRecord};
use mockable::Clock;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

const SELECT_SQL: &str = "SELECT id, description, priority, updated_at FROM tasks";

pub struct Table {
    db: Connection,
    clock: Box<dyn Clock + Send>,
    last_stamp: i64,
}

impl Table {
    /// Wrap an open connection, creating the schema if needed
    pub fn new(db: Connection, clock: Box<dyn Clock + Send>) -> StoreResult<Self> {
        let mut table = Self {
            db,
            clock,
            last_stamp: 0,
        };
        table.create_schema()?;
        table.last_stamp = table
            .db
            .query_row("SELECT COALESCE(MAX(updated_at), 0) FROM tasks", [], |row| row.get(0))?;
        Ok(table)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let found: i64 = self.db.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        debug!(found, "Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL,
                priority INTEGER NOT NULL CHECK (priority IN (1, 2, 3)),
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at);

            PRAGMA user_version = 1;
            "#,
        )?;

        Ok(())
    }

    /// Next write stamp: wall time, but always past the previous stamp
    fn stamp(&mut self) -> i64 {
        let now = self.clock.utc().timestamp_millis().max(self.last_stamp + 1);
        self.last_stamp = now;
        now
    }

    pub fn insert(&mut self, draft: &TaskDraft) -> StoreResult<TaskId> {
        let updated_at = self.stamp();
        self.db.execute(
            "INSERT INTO tasks (description, priority, updated_at) VALUES (?1, ?2, ?3)",
            params![draft.description, draft.priority.value(), updated_at],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// Returns false when no row has `record.id`
    pub fn update(&mut self, record: &TaskRecord) -> StoreResult<bool> {
        let updated_at = self.stamp();
        let changed = self.db.execute(
            "UPDATE tasks SET description = ?1, priority = ?2, updated_at = ?3 WHERE id = ?4",
            params![record.description, record.priority.value(), updated_at, record.id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false when the row was already gone
    pub fn delete(&mut self, id: TaskId) -> StoreResult<bool> {
        let changed = self.db.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        let mut stmt = self.db.prepare(&format!("{SELECT_SQL} WHERE id = ?1"))?;
        let row = stmt.query_row(params![id], read_row).optional()?;
        row.map(RawRow::into_record).transpose()
    }

    /// Every row, most recently written first
    pub fn list(&self) -> StoreResult<Vec<TaskRecord>> {
        let mut stmt = self
            .db
            .prepare(&format!("{SELECT_SQL} ORDER BY updated_at DESC, id DESC"))?;
        let rows = stmt.query_map([], read_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_record()?);
        }
        Ok(results)
    }

    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> StoreResult<()> {
        self.db.execute_batch(sql)?;
        Ok(())
    }
}

struct RawRow {
    id: TaskId,
    description: String,
    priority: i64,
    updated_at: i64,
}

impl RawRow {
    /// A stored row that does not decode is corrupt storage, not bad input
    fn into_record(self) -> StoreResult<TaskRecord> {
        let priority = Priority::try_from(self.priority)
            .map_err(|err| StoreError::StorageUnavailable(format!("corrupt row {}: {}", self.id, err)))?;
        Ok(TaskRecord {
            id: self.id,
            description: self.description,
            priority,
            updated_at: self.updated_at,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        description: row.get(1)?,
        priority: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn table(clock: &ManualClock) -> Table {
        let db = Connection::open_in_memory().unwrap();
        Table::new(db, Box::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);

        let id = table.insert(&TaskDraft::new("Buy milk", Priority::Medium)).unwrap();
        let record = table.get(id).unwrap().unwrap();
        assert_eq!(record.description, "Buy milk");
        assert_eq!(record.priority, Priority::Medium);
        assert_eq!(record.updated_at, 1000);
    }

    #[test]
    fn test_get_nonexistent() {
        let clock = ManualClock::new(1000);
        let table = table(&clock);
        assert!(table.get(999).unwrap().is_none());
    }

    #[test]
    fn test_stamps_strictly_increase_within_same_millisecond() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);

        let id = table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        let mut record = table.get(id).unwrap().unwrap();
        record.description = "A2".to_string();
        assert!(table.update(&record).unwrap());

        let updated = table.get(id).unwrap().unwrap();
        assert_eq!(updated.updated_at, 1001);
        assert_eq!(updated.id, id);
    }

    #[test]
    fn test_update_missing_row_is_noop() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);

        let ghost = TaskRecord {
            id: 42,
            description: "ghost".to_string(),
            priority: Priority::Low,
            updated_at: 0,
        };
        assert!(!table.update(&ghost).unwrap());
        assert!(table.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);

        let id = table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        assert!(table.delete(id).unwrap());
        assert!(!table.delete(id).unwrap());
        assert!(table.get(id).unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_updated_at_desc() {
        let clock = ManualClock::new(1);
        let mut table = table(&clock);

        let a = table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        clock.set(2);
        table.insert(&TaskDraft::new("B", Priority::High)).unwrap();

        let names: Vec<_> = table.list().unwrap().into_iter().map(|r| r.description).collect();
        assert_eq!(names, vec!["B", "A"]);

        // Touching A moves it to the front
        clock.set(3);
        let record = table.get(a).unwrap().unwrap();
        table.update(&record).unwrap();
        let names: Vec<_> = table.list().unwrap().into_iter().map(|r| r.description).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);

        let first = table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        table.delete(first).unwrap();
        let second = table.insert(&TaskDraft::new("B", Priority::High)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("PRAGMA user_version = 9;").unwrap();
        let err = Table::new(db, Box::new(ManualClock::new(0))).err().unwrap();
        assert_eq!(
            err,
            StoreError::UnsupportedSchema {
                found: 9,
                supported: SCHEMA_VERSION
            }
        );
    }

    #[test]
    fn test_last_stamp_restored_from_existing_rows() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("t.db");
        {
            let clock = ManualClock::new(5000);
            let mut table = Table::new(Connection::open(&path).unwrap(), Box::new(clock)).unwrap();
            table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        }

        // Clock went backwards across restarts
        let clock = ManualClock::new(10);
        let mut table = Table::new(Connection::open(&path).unwrap(), Box::new(clock)).unwrap();
        let id = table.insert(&TaskDraft::new("B", Priority::High)).unwrap();
        assert_eq!(table.get(id).unwrap().unwrap().updated_at, 5001);
    }

    #[test]
    fn test_corrupt_priority_reads_as_storage_unavailable() {
        let clock = ManualClock::new(1000);
        let mut table = table(&clock);
        let good = table.insert(&TaskDraft::new("A", Priority::High)).unwrap();
        table
            .execute_raw(
                "PRAGMA ignore_check_constraints = ON;
                 INSERT INTO tasks (description, priority, updated_at) VALUES ('bad', 7, 2000);",
            )
            .unwrap();

        assert!(matches!(table.list(), Err(StoreError::StorageUnavailable(_))));
        assert!(matches!(table.get(good + 1), Err(StoreError::StorageUnavailable(_))));
        assert_eq!(table.get(good).unwrap().unwrap().description, "A");
    }
}
