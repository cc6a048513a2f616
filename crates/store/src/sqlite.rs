//! SQLite-backed [`FleetStore`].
//!
//! Each table keeps the columns the engine filters on next to a JSON
//! `body` holding the full record. Status changes are written with
//! `UPDATE ... WHERE status = ?expected` and a zero row count is reported as
//! [`StoreError::StaleWrite`].
//!
//! Partial unique indexes mirror the engine's exclusivity invariants:
//! - one non-closed shift per driver
//! - one active assignment per vehicle and per shift
//! - one IN_PROGRESS trip per shift

use crate::error::{StoreError, StoreResult};
use crate::FleetStore;
use fleetops_core::{DriverId, ShiftId, TripId, VehicleId};
use fleetops_domain::{
    Shift, ShiftStatus, Trip, TripStatus, VehicleAssignment, VerificationRecord,
    VerificationStatus,
};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS shifts (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL,
    status TEXT NOT NULL,
    verification_status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_shifts_open_driver
    ON shifts(driver_id) WHERE status != 'closed';

CREATE TABLE IF NOT EXISTS assignments (
    id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    shift_id TEXT NOT NULL,
    active INTEGER NOT NULL,
    assigned_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_active_vehicle
    ON assignments(vehicle_id) WHERE active = 1;
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_active_shift
    ON assignments(shift_id) WHERE active = 1;

CREATE TABLE IF NOT EXISTS trips (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL,
    shift_id TEXT,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_trips_in_progress_shift
    ON trips(shift_id) WHERE status = 'IN_PROGRESS';
CREATE INDEX IF NOT EXISTS idx_trips_driver ON trips(driver_id);

CREATE TABLE IF NOT EXISTS verifications (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    shift_id TEXT NOT NULL,
    status TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_verifications_shift ON verifications(shift_id);
"#;

/// Durable store on a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening fleet store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        param: &str,
    ) -> StoreResult<Option<T>> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(sql, params![param], |row| row.get(0))
            .optional()?;
        body.map(|b| decode(&b)).transpose()
    }

    fn query_many<T: DeserializeOwned>(&self, sql: &str, param: Option<&str>) -> StoreResult<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let bodies = match param {
            Some(p) => stmt
                .query_map(params![p], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?,
        };
        bodies.iter().map(|b| decode(b)).collect()
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> StoreResult<T> {
    serde_json::from_str(body).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Turn constraint failures into [`StoreError::UniqueViolation`].
fn write_result(result: rusqlite::Result<usize>, what: impl FnOnce() -> String) -> StoreResult<usize> {
    match result {
        Ok(rows) => Ok(rows),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::UniqueViolation(what()))
        }
        Err(e) => Err(e.into()),
    }
}

fn stale(entity: &'static str, id: &str, expected: impl ToString) -> StoreError {
    StoreError::StaleWrite {
        entity,
        id: id.to_string(),
        expected: expected.to_string(),
    }
}

impl FleetStore for SqliteStore {
    fn insert_shift(&self, shift: &Shift) -> StoreResult<()> {
        let body = serde_json::to_string(shift)?;
        let conn = self.conn()?;
        write_result(
            conn.execute(
                "INSERT INTO shifts (id, driver_id, status, verification_status, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    shift.id.as_str(),
                    shift.driver_id.as_str(),
                    shift.status.as_str(),
                    shift.verification_status.as_str(),
                    shift.created_at as i64,
                    body,
                ],
            ),
            || format!("driver {} already has an open shift", shift.driver_id),
        )?;
        Ok(())
    }

    fn get_shift(&self, id: &ShiftId) -> StoreResult<Option<Shift>> {
        self.query_one("SELECT body FROM shifts WHERE id = ?1", id.as_str())
    }

    fn update_shift(
        &self,
        shift: &Shift,
        expected_status: ShiftStatus,
        expected_verification: VerificationStatus,
    ) -> StoreResult<()> {
        let body = serde_json::to_string(shift)?;
        let conn = self.conn()?;
        let rows = write_result(
            conn.execute(
                "UPDATE shifts SET status = ?1, verification_status = ?2, body = ?3
                 WHERE id = ?4 AND status = ?5 AND verification_status = ?6",
                params![
                    shift.status.as_str(),
                    shift.verification_status.as_str(),
                    body,
                    shift.id.as_str(),
                    expected_status.as_str(),
                    expected_verification.as_str(),
                ],
            ),
            || format!("shift {}", shift.id),
        )?;
        if rows == 0 {
            return Err(stale(
                "shift",
                shift.id.as_str(),
                format!("{}/{}", expected_status, expected_verification),
            ));
        }
        Ok(())
    }

    fn open_shift_for_driver(&self, driver_id: &DriverId) -> StoreResult<Option<Shift>> {
        self.query_one(
            "SELECT body FROM shifts WHERE driver_id = ?1 AND status != 'closed'",
            driver_id.as_str(),
        )
    }

    fn open_shifts(&self) -> StoreResult<Vec<Shift>> {
        self.query_many(
            "SELECT body FROM shifts WHERE status != 'closed' ORDER BY created_at",
            None,
        )
    }

    fn insert_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        let body = serde_json::to_string(assignment)?;
        let conn = self.conn()?;
        write_result(
            conn.execute(
                "INSERT INTO assignments (id, vehicle_id, shift_id, active, assigned_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    assignment.id.as_str(),
                    assignment.vehicle_id.as_str(),
                    assignment.shift_id.as_str(),
                    assignment.active,
                    assignment.assigned_at as i64,
                    body,
                ],
            ),
            || {
                format!(
                    "vehicle {} or shift {} already has an active assignment",
                    assignment.vehicle_id, assignment.shift_id
                )
            },
        )?;
        Ok(())
    }

    fn release_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        let body = serde_json::to_string(assignment)?;
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE assignments SET active = ?1, body = ?2 WHERE id = ?3 AND active = 1",
            params![assignment.active, body, assignment.id.as_str()],
        )?;
        if rows == 0 {
            return Err(stale("assignment", assignment.id.as_str(), "active"));
        }
        Ok(())
    }

    fn active_assignment_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        self.query_one(
            "SELECT body FROM assignments WHERE vehicle_id = ?1 AND active = 1",
            vehicle_id.as_str(),
        )
    }

    fn active_assignment_for_shift(
        &self,
        shift_id: &ShiftId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        self.query_one(
            "SELECT body FROM assignments WHERE shift_id = ?1 AND active = 1",
            shift_id.as_str(),
        )
    }

    fn active_assignments(&self) -> StoreResult<Vec<VehicleAssignment>> {
        self.query_many(
            "SELECT body FROM assignments WHERE active = 1 ORDER BY assigned_at",
            None,
        )
    }

    fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        let body = serde_json::to_string(trip)?;
        let conn = self.conn()?;
        write_result(
            conn.execute(
                "INSERT INTO trips (id, driver_id, shift_id, status, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    trip.id.as_str(),
                    trip.driver_id.as_str(),
                    trip.shift_id.as_ref().map(|s| s.as_str()),
                    trip.status.as_str(),
                    trip.created_at as i64,
                    body,
                ],
            ),
            || format!("trip {}", trip.id),
        )?;
        Ok(())
    }

    fn get_trip(&self, id: &TripId) -> StoreResult<Option<Trip>> {
        self.query_one("SELECT body FROM trips WHERE id = ?1", id.as_str())
    }

    fn update_trip(&self, trip: &Trip, expected_status: TripStatus) -> StoreResult<()> {
        let body = serde_json::to_string(trip)?;
        let conn = self.conn()?;
        let rows = write_result(
            conn.execute(
                "UPDATE trips SET shift_id = ?1, status = ?2, body = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    trip.shift_id.as_ref().map(|s| s.as_str()),
                    trip.status.as_str(),
                    body,
                    trip.id.as_str(),
                    expected_status.as_str(),
                ],
            ),
            || {
                format!(
                    "shift {} already has a trip in progress",
                    trip.shift_id.as_ref().map(|s| s.as_str()).unwrap_or("-")
                )
            },
        )?;
        if rows == 0 {
            return Err(stale("trip", trip.id.as_str(), expected_status));
        }
        Ok(())
    }

    fn trips_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<Trip>> {
        self.query_many(
            "SELECT body FROM trips WHERE shift_id = ?1 ORDER BY created_at, id",
            Some(shift_id.as_str()),
        )
    }

    fn trips_for_driver(&self, driver_id: &DriverId) -> StoreResult<Vec<Trip>> {
        self.query_many(
            "SELECT body FROM trips WHERE driver_id = ?1 ORDER BY created_at, id",
            Some(driver_id.as_str()),
        )
    }

    fn in_progress_trip_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Option<Trip>> {
        self.query_one(
            "SELECT body FROM trips WHERE shift_id = ?1 AND status = 'IN_PROGRESS'",
            shift_id.as_str(),
        )
    }

    fn insert_verification(&self, record: &VerificationRecord) -> StoreResult<()> {
        let body = serde_json::to_string(record)?;
        let conn = self.conn()?;
        write_result(
            conn.execute(
                "INSERT INTO verifications (id, shift_id, status, body) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.as_str(),
                    record.shift_id.as_str(),
                    record.status.as_str(),
                    body,
                ],
            ),
            || format!("verification {}", record.id),
        )?;
        Ok(())
    }

    fn update_verification(
        &self,
        record: &VerificationRecord,
        expected_status: VerificationStatus,
    ) -> StoreResult<()> {
        let body = serde_json::to_string(record)?;
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE verifications SET status = ?1, body = ?2 WHERE id = ?3 AND status = ?4",
            params![
                record.status.as_str(),
                body,
                record.id.as_str(),
                expected_status.as_str(),
            ],
        )?;
        if rows == 0 {
            return Err(stale("verification", record.id.as_str(), expected_status));
        }
        Ok(())
    }

    fn latest_verification(&self, shift_id: &ShiftId) -> StoreResult<Option<VerificationRecord>> {
        self.query_one(
            "SELECT body FROM verifications WHERE shift_id = ?1 ORDER BY seq DESC LIMIT 1",
            shift_id.as_str(),
        )
    }

    fn verifications_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<VerificationRecord>> {
        self.query_many(
            "SELECT body FROM verifications WHERE shift_id = ?1 ORDER BY seq",
            Some(shift_id.as_str()),
        )
    }
}
