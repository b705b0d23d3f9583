use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};

use crate::cache::ReportCache;
use crate::db::Database;
use crate::error::ReportError;
use crate::models::{
    FitnessGoals, Meal, NewMeal, NewUser, NewWeightLog, NewWorkout, UpdateMeal, UpdateWorkout,
    User, WeightLog, Workout, validate_date_range, validate_goals, validate_meal_update,
    validate_new_meal, validate_new_user, validate_new_weight_log, validate_new_workout,
    validate_weight_kg, validate_workout_update,
};
use crate::report::{Report, ReportService};

pub type SharedCache = Box<dyn ReportCache + Send + Sync>;

/// Validated writes over the record store, keeping cached reports in step.
///
/// Every mutation that touches a user's records drops that user's cached
/// reports afterwards. A failed invalidation is logged and never fails the
/// mutation.
pub struct FitService {
    db: Database,
    cache: SharedCache,
    cache_ttl: Duration,
}

impl FitService {
    pub fn new(db_path: &str, cache: SharedCache, cache_ttl: Duration) -> Result<Self> {
        Self::open(Path::new(db_path), cache, cache_ttl)
    }

    pub fn open(path: &Path, cache: SharedCache, cache_ttl: Duration) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self {
            db,
            cache,
            cache_ttl,
        })
    }

    pub fn new_in_memory(cache: SharedCache, cache_ttl: Duration) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db,
            cache,
            cache_ttl,
        })
    }

    fn reports(&self) -> ReportService<&Database, &(dyn ReportCache + Send + Sync)> {
        ReportService::new(&self.db, self.cache.as_ref(), self.cache_ttl)
    }

    fn invalidate_quietly(&self, identity: &str) {
        if let Err(e) = self.reports().invalidate(identity) {
            tracing::warn!(identity, error = %e, "Failed to invalidate cached reports");
        }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    // --- Users ---

    pub fn register_user(&self, user: &NewUser) -> Result<User> {
        let user = validate_new_user(user)?;
        let created = self.db.create_user(&user)?;
        tracing::info!(identity = %created.identity, username = %created.username, "Registered user");
        Ok(created)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.db.get_user_by_username(username)
    }

    /// Find a user by identity or username.
    pub fn resolve_user(&self, user: &str) -> Result<User> {
        Ok(self.reports().resolve_user(user)?)
    }

    pub fn set_goals(&self, user: &str, goals: &FitnessGoals) -> Result<User> {
        validate_goals(goals)?;
        let user = self.resolve_user(user)?;
        self.db.update_goals(&user.identity, goals)?;
        self.invalidate_quietly(&user.identity);
        tracing::info!(identity = %user.identity, "Updated goals");
        self.db
            .get_user_by_identity(&user.identity)?
            .context("User disappeared while updating goals")
    }

    /// Delete a user, found by identity or username, and everything they
    /// logged. Returns `None` for unknown users.
    pub fn delete_user(&self, user: &str) -> Result<Option<User>> {
        let user = match self.reports().resolve_user(user) {
            Ok(user) => user,
            Err(ReportError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let deleted = self.db.delete_user(&user.username)?;
        if let Some(ref user) = deleted {
            self.invalidate_quietly(&user.identity);
            tracing::info!(identity = %user.identity, "Deleted user");
        }
        Ok(deleted)
    }

    // --- Workouts ---

    pub fn log_workout(&self, user: &str, workout: &NewWorkout) -> Result<Workout> {
        validate_new_workout(workout, Self::today())?;
        let user = self.resolve_user(user)?;
        let created = self.db.insert_workout(&user.identity, workout)?;
        self.invalidate_quietly(&user.identity);
        tracing::info!(identity = %user.identity, workout_id = created.id, "Logged workout");
        Ok(created)
    }

    pub fn list_workouts(
        &self,
        user: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Workout>> {
        check_window(start, end)?;
        let user = self.resolve_user(user)?;
        self.db.list_workouts(&user.identity, start, end, limit)
    }

    /// Returns `None` when the workout does not exist.
    pub fn update_workout(&self, id: i64, update: &UpdateWorkout) -> Result<Option<Workout>> {
        validate_workout_update(update, Self::today())?;
        let Some(existing) = self.db.get_workout(id)? else {
            return Ok(None);
        };
        let updated = self.db.update_workout(id, update)?;
        self.invalidate_quietly(&existing.user_id);
        Ok(Some(updated))
    }

    pub fn delete_workout(&self, id: i64) -> Result<bool> {
        let Some(existing) = self.db.get_workout(id)? else {
            return Ok(false);
        };
        let deleted = self.db.delete_workout(id)?;
        if deleted {
            self.invalidate_quietly(&existing.user_id);
        }
        Ok(deleted)
    }

    // --- Meals ---

    pub fn log_meal(&self, user: &str, meal: &NewMeal) -> Result<Meal> {
        validate_new_meal(meal, Local::now().naive_local())?;
        let user = self.resolve_user(user)?;
        let created = self.db.insert_meal(&user.identity, meal)?;
        self.invalidate_quietly(&user.identity);
        tracing::info!(identity = %user.identity, meal_id = created.id, "Logged meal");
        Ok(created)
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        self.db.get_meal(id)
    }

    pub fn list_meals(
        &self,
        user: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Meal>> {
        check_window(start, end)?;
        let user = self.resolve_user(user)?;
        self.db.list_meals(&user.identity, start, end, limit)
    }

    pub fn update_meal(&self, id: i64, update: &UpdateMeal) -> Result<Option<Meal>> {
        validate_meal_update(update, Local::now().naive_local())?;
        let Some(existing) = self.db.get_meal(id)? else {
            return Ok(None);
        };
        let updated = self.db.update_meal(id, update)?;
        self.invalidate_quietly(&existing.user_id);
        Ok(Some(updated))
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let Some(existing) = self.db.get_meal(id)? else {
            return Ok(false);
        };
        let deleted = self.db.delete_meal(id)?;
        if deleted {
            self.invalidate_quietly(&existing.user_id);
        }
        Ok(deleted)
    }

    // --- Weight ---

    pub fn log_weight(&self, user: &str, log: &NewWeightLog) -> Result<WeightLog> {
        validate_new_weight_log(log, Self::today())?;
        let user = self.resolve_user(user)?;
        let created = self.db.insert_weight_log(&user.identity, log)?;
        self.invalidate_quietly(&user.identity);
        tracing::info!(identity = %user.identity, weight_log_id = created.id, "Logged weight");
        Ok(created)
    }

    pub fn list_weight_logs(
        &self,
        user: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<WeightLog>> {
        check_window(start, end)?;
        let user = self.resolve_user(user)?;
        self.db.list_weight_logs(&user.identity, start, end, limit)
    }

    pub fn update_weight(&self, id: i64, weight_kg: f64) -> Result<Option<WeightLog>> {
        validate_weight_kg(weight_kg)?;
        let Some(existing) = self.db.get_weight_log(id)? else {
            return Ok(None);
        };
        let updated = self.db.update_weight_log(id, weight_kg)?;
        self.invalidate_quietly(&existing.user_id);
        Ok(Some(updated))
    }

    pub fn delete_weight(&self, id: i64) -> Result<bool> {
        let Some(existing) = self.db.get_weight_log(id)? else {
            return Ok(false);
        };
        let deleted = self.db.delete_weight_log(id)?;
        if deleted {
            self.invalidate_quietly(&existing.user_id);
        }
        Ok(deleted)
    }

    // --- Reports ---

    pub fn generate_report(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
        use_cache: bool,
    ) -> Result<Report> {
        validate_date_range(start, end)?;
        Ok(self.reports().generate(user, start, end, use_cache)?)
    }

    /// Drop every cached report for `user`. Unlike mutation-triggered
    /// invalidation, cache failures are returned to the caller.
    pub fn invalidate_reports(&self, user: &str) -> Result<u64> {
        let user = self.resolve_user(user)?;
        self.reports().invalidate(&user.identity)
    }
}

fn check_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        validate_date_range(start, end)?;
    }
    Ok(())
}
