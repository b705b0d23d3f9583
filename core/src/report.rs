//! Cache-aside report generation.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::{ReportCache, report_cache_key, report_cache_prefix};
use crate::error::{ReportError, ReportResult};
use crate::models::User;
use crate::stats::{
    NutritionStats, WeightTrend, WorkoutStats, nutrition_stats, weight_trend, window_days,
    workout_stats,
};
use crate::store::RecordStore;
use crate::summary::format_summary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUser {
    pub identity: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl From<&User> for ReportUser {
    fn from(user: &User) -> Self {
        Self {
            identity: user.identity.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

impl Period {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            days: window_days(start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub user: ReportUser,
    pub period: Period,
    pub workouts: WorkoutStats,
    pub nutrition: NutritionStats,
    pub weight: WeightTrend,
    pub summary: String,
    /// Set on the way out; the stored blob always carries `false`.
    #[serde(default)]
    pub from_cache: bool,
}

pub struct ReportService<S, C> {
    store: S,
    cache: C,
    ttl: Duration,
}

impl<S: RecordStore, C: ReportCache> ReportService<S, C> {
    pub const fn new(store: S, cache: C, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Look a user up by identity, then by username.
    pub fn resolve_user(&self, user: &str) -> ReportResult<User> {
        if let Some(found) = self
            .store
            .get_user_by_identity(user)
            .map_err(ReportError::StoreUnavailable)?
        {
            return Ok(found);
        }
        self.store
            .get_user_by_handle(user)
            .map_err(ReportError::StoreUnavailable)?
            .ok_or_else(|| ReportError::NotFound(user.to_string()))
    }

    /// Produce the report for `[start, end]`. Callers guarantee `start <= end`.
    pub fn generate(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
        use_cache: bool,
    ) -> ReportResult<Report> {
        let user = self.resolve_user(user)?;
        let key = report_cache_key(&user.identity, start, end);

        if use_cache {
            if let Some(report) = self.read_cached(&key) {
                return Ok(report);
            }
        }

        let report = self.build_report(&user, start, end)?;

        if use_cache {
            match serde_json::to_string(&report) {
                Ok(blob) => {
                    if let Err(e) = self.cache.set(&key, &blob, self.ttl) {
                        tracing::warn!(key = %key, error = %e, "Failed to cache report");
                    }
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to serialize report"),
            }
        }

        Ok(report)
    }

    fn read_cached(&self, key: &str) -> Option<Report> {
        let blob = match self.cache.get(key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                tracing::debug!(key, "Report cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Report cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<Report>(&blob) {
            Ok(mut report) => {
                tracing::debug!(key, "Report cache hit");
                report.from_cache = true;
                Some(report)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cached report");
                None
            }
        }
    }

    /// Compute a fresh report straight from the record store.
    pub fn build_report(
        &self,
        user: &User,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReportResult<Report> {
        let id = user.identity.as_str();
        let (from, to) = (Some(start), Some(end));
        let workouts = self
            .store
            .get_workouts(id, from, to, None)
            .map_err(ReportError::StoreUnavailable)?;
        let meals = self
            .store
            .get_meals(id, from, to, None)
            .map_err(ReportError::StoreUnavailable)?;
        let weights = self
            .store
            .get_weight_logs(id, from, to, None)
            .map_err(ReportError::StoreUnavailable)?;

        let period = Period::new(start, end);
        let workouts = workout_stats(&workouts);
        let nutrition = nutrition_stats(&meals, start, end);
        let weight = weight_trend(&weights);
        let summary = format_summary(user, &period, &workouts, &nutrition, &weight);

        Ok(Report {
            user: ReportUser::from(user),
            period,
            workouts,
            nutrition,
            weight,
            summary,
            from_cache: false,
        })
    }

    /// Drop every cached report of `identity`. Returns the number of entries removed.
    pub fn invalidate(&self, identity: &str) -> anyhow::Result<u64> {
        let removed = self.cache.delete_by_prefix(&report_cache_prefix(identity))?;
        tracing::debug!(identity, removed, "Invalidated cached reports");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{FitnessGoals, Intensity, Meal, WeightLog, Workout};
    use anyhow::{Result, bail};

    struct FixedStore {
        user: User,
        workouts: Vec<Workout>,
        broken: bool,
    }

    impl RecordStore for FixedStore {
        fn get_user_by_identity(&self, identity: &str) -> Result<Option<User>> {
            if self.broken {
                bail!("database is locked");
            }
            Ok((identity == self.user.identity).then(|| self.user.clone()))
        }

        fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
            Ok(handle
                .eq_ignore_ascii_case(&self.user.username)
                .then(|| self.user.clone()))
        }

        fn get_workouts(
            &self,
            _user_id: &str,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
            _limit: Option<u32>,
        ) -> Result<Vec<Workout>> {
            Ok(self.workouts.clone())
        }

        fn get_meals(
            &self,
            _user_id: &str,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
            _limit: Option<u32>,
        ) -> Result<Vec<Meal>> {
            Ok(Vec::new())
        }

        fn get_weight_logs(
            &self,
            _user_id: &str,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
            _limit: Option<u32>,
        ) -> Result<Vec<WeightLog>> {
            Ok(Vec::new())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn store() -> FixedStore {
        let workout = |minutes, intensity| Workout {
            id: 1,
            user_id: "id-1".to_string(),
            activity: "running".to_string(),
            duration_minutes: minutes,
            intensity,
            date: day(3),
            notes: None,
            created_at: String::new(),
        };
        FixedStore {
            user: User {
                identity: "id-1".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: Some("Alice Liddell".to_string()),
                dob: None,
                goals: FitnessGoals::default(),
                created_at: String::new(),
            },
            workouts: vec![
                workout(30, Intensity::Low),
                workout(45, Intensity::Medium),
                workout(60, Intensity::High),
            ],
            broken: false,
        }
    }

    #[test]
    fn test_generate_then_hit() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        let first = svc.generate("id-1", day(1), day(7), true).unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.workouts.total_minutes, 135);
        assert_eq!(first.period.days, 7);

        let second = svc.generate("id-1", day(1), day(7), true).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.workouts, first.workouts);
        assert_eq!(second.summary, first.summary);
    }

    #[test]
    fn test_generate_without_cache_skips_cache() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        svc.generate("alice", day(1), day(7), false).unwrap();
        assert!(svc.cache.is_empty());
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        let err = svc.generate("bob", day(1), day(7), true).unwrap_err();
        assert!(matches!(err, ReportError::NotFound(ref u) if u == "bob"));
    }

    #[test]
    fn test_store_failure_is_store_unavailable() {
        let mut broken = store();
        broken.broken = true;
        let svc = ReportService::new(broken, MemoryCache::default(), Duration::from_secs(60));
        let err = svc.generate("id-1", day(1), day(7), true).unwrap_err();
        assert!(matches!(err, ReportError::StoreUnavailable(_)));
    }

    #[test]
    fn test_undecodable_blob_is_recomputed() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        let key = report_cache_key("id-1", day(1), day(7));
        svc.cache
            .set(&key, "{not json", Duration::from_secs(60))
            .unwrap();

        let report = svc.generate("id-1", day(1), day(7), true).unwrap();
        assert!(!report.from_cache);
        let stored = svc.cache.get(&key).unwrap().unwrap();
        assert!(serde_json::from_str::<Report>(&stored).is_ok());
    }

    #[test]
    fn test_stored_blob_carries_from_cache_false() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        svc.generate("id-1", day(1), day(7), true).unwrap();
        let blob = svc
            .cache
            .get(&report_cache_key("id-1", day(1), day(7)))
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(json["from_cache"], false);
        assert_eq!(json["user"]["full_name"], "Alice Liddell");
        assert_eq!(json["period"]["start"], "2024-06-01");
    }

    #[test]
    fn test_invalidate_only_touches_one_user() {
        let svc = ReportService::new(store(), MemoryCache::default(), Duration::from_secs(60));
        svc.generate("id-1", day(1), day(7), true).unwrap();
        svc.generate("id-1", day(2), day(7), true).unwrap();
        svc.cache
            .set("report:id-10:2024-06-01:2024-06-07", "{}", Duration::from_secs(60))
            .unwrap();

        assert_eq!(svc.invalidate("id-1").unwrap(), 2);
        assert_eq!(svc.cache.len(), 1);
        assert!(!svc.generate("id-1", day(1), day(7), true).unwrap().from_cache);
    }
}
