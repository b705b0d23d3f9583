use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use uuid::Uuid;

use crate::error::Conflict;
use crate::models::{
    FitnessGoals, Intensity, Macros, Meal, NewMeal, NewUser, NewWeightLog, NewWorkout,
    UpdateMeal, UpdateWorkout, User, WeightLog, Workout,
};
use crate::store::RecordStore;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    identity TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE,
                    full_name TEXT,
                    dob TEXT,
                    target_weight REAL,
                    weekly_workout_minutes INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(identity) ON DELETE CASCADE,
                    activity TEXT NOT NULL,
                    duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
                    intensity TEXT NOT NULL CHECK (intensity IN ('low', 'medium', 'high')),
                    date TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(identity) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    calories INTEGER NOT NULL CHECK (calories > 0),
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    time TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(identity) ON DELETE CASCADE,
                    weight_kg REAL NOT NULL,
                    date TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_user_date ON workouts(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_meals_user_time ON meals(user_id, time);
                CREATE INDEX IF NOT EXISTS idx_weight_logs_user_date ON weight_logs(user_id, date);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let dob: Option<String> = row.get(4)?;
        let dob = dob
            .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(User {
            identity: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            full_name: row.get(3)?,
            dob,
            goals: FitnessGoals {
                target_weight: row.get(5)?,
                weekly_workout_minutes: row.get(6)?,
            },
            created_at: row.get(7)?,
        })
    }

    fn workout_from_row(row: &rusqlite::Row) -> rusqlite::Result<Workout> {
        let intensity: String = row.get(4)?;
        let intensity = intensity
            .parse::<Intensity>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;
        Ok(Workout {
            id: row.get(0)?,
            user_id: row.get(1)?,
            activity: row.get(2)?,
            duration_minutes: row.get(3)?,
            intensity,
            date: date_column(row, 5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        let time: String = row.get(7)?;
        let time = NaiveDateTime::parse_from_str(&time, TIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
        Ok(Meal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            calories: row.get(3)?,
            macros: Macros {
                protein: row.get(4)?,
                carbs: row.get(5)?,
                fat: row.get(6)?,
            },
            time,
            notes: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn weight_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightLog> {
        Ok(WeightLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            weight_kg: row.get(2)?,
            date: date_column(row, 3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Users ---

    /// Insert a validated user under a fresh identity.
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        if self.get_user_by_username(&user.username)?.is_some() {
            return Err(Conflict(format!("Username '{}' is already taken", user.username)).into());
        }
        if self.email_exists(&user.email)? {
            return Err(Conflict(format!("Email '{}' is already registered", user.email)).into());
        }

        let identity = Uuid::new_v4().to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (identity, username, email, full_name, dob, target_weight, weekly_workout_minutes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                identity,
                user.username,
                user.email,
                user.full_name,
                user.dob.map(|d| d.format(DATE_FORMAT).to_string()),
                user.goals.target_weight,
                user.goals.weekly_workout_minutes,
                now,
            ],
        )?;
        self.get_user_by_identity(&identity)?
            .context("User not found after insert")
    }

    fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_user_by_identity(&self, identity: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT identity, username, email, full_name, dob, target_weight, weekly_workout_minutes, created_at
                 FROM users WHERE identity = ?1",
                params![identity],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Usernames are stored lowercase, so lookups are case-insensitive.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT identity, username, email, full_name, dob, target_weight, weekly_workout_minutes, created_at
                 FROM users WHERE username = ?1",
                params![username.trim().to_lowercase()],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn update_goals(&self, identity: &str, goals: &FitnessGoals) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET target_weight = ?1, weekly_workout_minutes = ?2 WHERE identity = ?3",
            params![goals.target_weight, goals.weekly_workout_minutes, identity],
        )?;
        Ok(rows > 0)
    }

    /// Delete a user together with every record they own.
    pub fn delete_user(&self, username: &str) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_username(username)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM users WHERE identity = ?1",
            params![user.identity],
        )?;
        Ok(Some(user))
    }

    // --- Workouts ---

    pub fn insert_workout(&self, user_id: &str, workout: &NewWorkout) -> Result<Workout> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO workouts (user_id, activity, duration_minutes, intensity, date, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                workout.activity.trim(),
                workout.duration_minutes,
                workout.intensity.as_str(),
                workout.date.format(DATE_FORMAT).to_string(),
                workout.notes,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_workout(id)?
            .context("Workout not found after insert")
    }

    pub fn get_workout(&self, id: i64) -> Result<Option<Workout>> {
        let workout = self
            .conn
            .query_row(
                "SELECT id, user_id, activity, duration_minutes, intensity, date, notes, created_at
                 FROM workouts WHERE id = ?1",
                params![id],
                Self::workout_from_row,
            )
            .optional()?;
        Ok(workout)
    }

    /// Workouts in the inclusive window, newest first.
    pub fn list_workouts(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Workout>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, activity, duration_minutes, intensity, date, notes, created_at
             FROM workouts
             WHERE user_id = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date DESC, id DESC
             LIMIT ?4",
        )?;
        let workouts = stmt
            .query_map(
                params![user_id, fmt_date(start), fmt_date(end), sql_limit(limit)],
                Self::workout_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workouts)
    }

    pub fn update_workout(&self, id: i64, update: &UpdateWorkout) -> Result<Workout> {
        if self.get_workout(id)?.is_none() {
            bail!("Workout {id} not found");
        }

        if let Some(ref activity) = update.activity {
            self.conn.execute(
                "UPDATE workouts SET activity = ?1 WHERE id = ?2",
                params![activity.trim(), id],
            )?;
        }
        if let Some(minutes) = update.duration_minutes {
            self.conn.execute(
                "UPDATE workouts SET duration_minutes = ?1 WHERE id = ?2",
                params![minutes, id],
            )?;
        }
        if let Some(intensity) = update.intensity {
            self.conn.execute(
                "UPDATE workouts SET intensity = ?1 WHERE id = ?2",
                params![intensity.as_str(), id],
            )?;
        }
        if let Some(date) = update.date {
            self.conn.execute(
                "UPDATE workouts SET date = ?1 WHERE id = ?2",
                params![date.format(DATE_FORMAT).to_string(), id],
            )?;
        }
        if let Some(ref notes) = update.notes {
            self.conn.execute(
                "UPDATE workouts SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
        }

        self.get_workout(id)?
            .with_context(|| format!("Workout {id} not found"))
    }

    pub fn delete_workout(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM workouts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Meals ---

    pub fn insert_meal(&self, user_id: &str, meal: &NewMeal) -> Result<Meal> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meals (user_id, name, calories, protein, carbs, fat, time, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user_id,
                meal.name.trim(),
                meal.calories,
                meal.macros.protein,
                meal.macros.carbs,
                meal.macros.fat,
                meal.time.format(TIME_FORMAT).to_string(),
                meal.notes,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_meal(id)?.context("Meal not found after insert")
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                "SELECT id, user_id, name, calories, protein, carbs, fat, time, notes, created_at
                 FROM meals WHERE id = ?1",
                params![id],
                Self::meal_from_row,
            )
            .optional()?;
        Ok(meal)
    }

    /// Meals whose calendar date falls in the inclusive window, newest first.
    pub fn list_meals(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, calories, protein, carbs, fat, time, notes, created_at
             FROM meals
             WHERE user_id = ?1
               AND (?2 IS NULL OR date(time) >= ?2)
               AND (?3 IS NULL OR date(time) <= ?3)
             ORDER BY time DESC, id DESC
             LIMIT ?4",
        )?;
        let meals = stmt
            .query_map(
                params![user_id, fmt_date(start), fmt_date(end), sql_limit(limit)],
                Self::meal_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn update_meal(&self, id: i64, update: &UpdateMeal) -> Result<Meal> {
        if self.get_meal(id)?.is_none() {
            bail!("Meal {id} not found");
        }

        if let Some(ref name) = update.name {
            self.conn.execute(
                "UPDATE meals SET name = ?1 WHERE id = ?2",
                params![name.trim(), id],
            )?;
        }
        if let Some(calories) = update.calories {
            self.conn.execute(
                "UPDATE meals SET calories = ?1 WHERE id = ?2",
                params![calories, id],
            )?;
        }
        if let Some(macros) = update.macros {
            self.conn.execute(
                "UPDATE meals SET protein = ?1, carbs = ?2, fat = ?3 WHERE id = ?4",
                params![macros.protein, macros.carbs, macros.fat, id],
            )?;
        }
        if let Some(time) = update.time {
            self.conn.execute(
                "UPDATE meals SET time = ?1 WHERE id = ?2",
                params![time.format(TIME_FORMAT).to_string(), id],
            )?;
        }
        if let Some(ref notes) = update.notes {
            self.conn.execute(
                "UPDATE meals SET notes = ?1 WHERE id = ?2",
                params![notes, id],
            )?;
        }

        self.get_meal(id)?
            .with_context(|| format!("Meal {id} not found"))
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Weight Logs ---

    /// One measurement per user per day; a second log for the same date is rejected.
    pub fn insert_weight_log(&self, user_id: &str, log: &NewWeightLog) -> Result<WeightLog> {
        let now = Local::now().to_rfc3339();
        let date_str = log.date.format(DATE_FORMAT).to_string();
        match self.conn.execute(
            "INSERT INTO weight_logs (user_id, weight_kg, date, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, log.weight_kg, date_str, now],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Conflict(format!("Weight already logged for {date_str}")).into());
            }
            Err(e) => return Err(e.into()),
        }
        let id = self.conn.last_insert_rowid();
        self.get_weight_log(id)?
            .context("Weight log not found after insert")
    }

    pub fn get_weight_log(&self, id: i64) -> Result<Option<WeightLog>> {
        let log = self
            .conn
            .query_row(
                "SELECT id, user_id, weight_kg, date, created_at FROM weight_logs WHERE id = ?1",
                params![id],
                Self::weight_log_from_row,
            )
            .optional()?;
        Ok(log)
    }

    pub fn list_weight_logs(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<WeightLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, weight_kg, date, created_at
             FROM weight_logs
             WHERE user_id = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date DESC
             LIMIT ?4",
        )?;
        let logs = stmt
            .query_map(
                params![user_id, fmt_date(start), fmt_date(end), sql_limit(limit)],
                Self::weight_log_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn update_weight_log(&self, id: i64, weight_kg: f64) -> Result<WeightLog> {
        let rows = self.conn.execute(
            "UPDATE weight_logs SET weight_kg = ?1 WHERE id = ?2",
            params![weight_kg, id],
        )?;
        if rows == 0 {
            bail!("Weight log {id} not found");
        }
        self.get_weight_log(id)?
            .with_context(|| format!("Weight log {id} not found"))
    }

    pub fn delete_weight_log(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM weight_logs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

impl RecordStore for Database {
    fn get_user_by_identity(&self, identity: &str) -> Result<Option<User>> {
        Database::get_user_by_identity(self, identity)
    }

    fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        self.get_user_by_username(handle)
    }

    fn get_workouts(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Workout>> {
        self.list_workouts(user_id, start, end, limit)
    }

    fn get_meals(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Meal>> {
        self.list_meals(user_id, start, end, limit)
    }

    fn get_weight_logs(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<WeightLog>> {
        self.list_weight_logs(user_id, start, end, limit)
    }
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn fmt_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

// SQLite treats a negative LIMIT as unbounded
fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map_or(-1, i64::from)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}
