use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{Meal, User, WeightLog, Workout};

/// Read access to the raw records a report is computed from.
///
/// Record lists come back newest first. `start`/`end` are inclusive calendar
/// dates; `None` leaves that side of the window open.
pub trait RecordStore {
    fn get_user_by_identity(&self, identity: &str) -> Result<Option<User>>;
    fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>>;

    fn get_workouts(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Workout>>;

    fn get_meals(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Meal>>;

    fn get_weight_logs(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<WeightLog>>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn get_user_by_identity(&self, identity: &str) -> Result<Option<User>> {
        (**self).get_user_by_identity(identity)
    }

    fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        (**self).get_user_by_handle(handle)
    }

    fn get_workouts(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Workout>> {
        (**self).get_workouts(user_id, start, end, limit)
    }

    fn get_meals(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<Meal>> {
        (**self).get_meals(user_id, start, end, limit)
    }

    fn get_weight_logs(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<u32>,
    ) -> Result<Vec<WeightLog>> {
        (**self).get_weight_logs(user_id, start, end, limit)
    }
}
