use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const MAX_WEIGHT_KG: f64 = 500.0;
pub const MAX_NOTES_LEN: usize = 500;

// --- Users ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessGoals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_workout_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable key that owns every workout, meal and weight log.
    pub identity: String,
    /// Unique, lowercase login handle.
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub goals: FitnessGoals,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub goals: FitnessGoals,
}

// --- Workouts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intensity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => bail!("Invalid intensity '{s}'. Must be one of: low, medium, high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: i64,
    pub user_id: String,
    pub activity: String,
    pub duration_minutes: i64,
    pub intensity: Intensity,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub activity: String,
    pub duration_minutes: i64,
    pub intensity: Intensity,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateWorkout {
    pub activity: Option<String>,
    pub duration_minutes: Option<i64>,
    pub intensity: Option<Intensity>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl UpdateWorkout {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activity.is_none()
            && self.duration_minutes.is_none()
            && self.intensity.is_none()
            && self.date.is_none()
            && self.notes.is_none()
    }
}

// --- Meals ---

/// Macronutrient amounts in grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub calories: i64,
    pub macros: Macros,
    pub time: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub name: String,
    pub calories: i64,
    pub macros: Macros,
    pub time: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMeal {
    pub name: Option<String>,
    pub calories: Option<i64>,
    pub macros: Option<Macros>,
    pub time: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl UpdateMeal {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.calories.is_none()
            && self.macros.is_none()
            && self.time.is_none()
            && self.notes.is_none()
    }
}

// --- Weight ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLog {
    pub id: i64,
    pub user_id: String,
    pub weight_kg: f64,
    pub date: NaiveDate,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWeightLog {
    pub weight_kg: f64,
    pub date: NaiveDate,
}

// --- Validation ---

/// Validate and normalize a username: 3-50 characters, alphanumeric plus `_`/`-`, lowercased.
pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(3..=50).contains(&len) {
        bail!("Username must be between 3 and 50 characters (got {len})");
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        bail!("Username must be alphanumeric (underscores and hyphens allowed)");
    }
    Ok(trimmed.to_lowercase())
}

pub fn validate_email(email: &str) -> Result<String> {
    let trimmed = email.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        bail!("Invalid email address '{email}'");
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        bail!("Invalid email address '{email}'");
    }
    Ok(trimmed.to_lowercase())
}

pub fn validate_goals(goals: &FitnessGoals) -> Result<()> {
    if let Some(target) = goals.target_weight {
        if !target.is_finite() || target <= 0.0 {
            bail!("Target weight must be greater than 0");
        }
    }
    if let Some(minutes) = goals.weekly_workout_minutes {
        if minutes < 0 {
            bail!("Weekly workout minutes must not be negative");
        }
    }
    Ok(())
}

/// Validate a registration request and return a normalized copy.
pub fn validate_new_user(user: &NewUser) -> Result<NewUser> {
    let username = validate_username(&user.username)?;
    let email = validate_email(&user.email)?;
    let full_name = match user.full_name.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(name) => Some(validate_text("Full name", name, 1, 100)?),
    };
    validate_goals(&user.goals)?;
    Ok(NewUser {
        username,
        email,
        full_name,
        dob: user.dob,
        goals: user.goals.clone(),
    })
}

fn validate_text(field: &str, value: &str, min: usize, max: usize) -> Result<String> {
    let len = value.chars().count();
    if len < min {
        bail!("{field} must not be empty");
    }
    if len > max {
        bail!("{field} must be at most {max} characters (got {len})");
    }
    Ok(value.to_string())
}

fn validate_notes(notes: Option<&str>) -> Result<()> {
    if let Some(n) = notes {
        validate_text("Notes", n, 0, MAX_NOTES_LEN)?;
    }
    Ok(())
}

fn validate_not_future(label: &str, date: NaiveDate, today: NaiveDate) -> Result<()> {
    if date > today {
        bail!("{label} date cannot be in the future");
    }
    Ok(())
}

fn validate_duration(minutes: i64) -> Result<()> {
    if minutes <= 0 {
        bail!("Duration must be greater than 0 minutes");
    }
    Ok(())
}

fn validate_calories(calories: i64) -> Result<()> {
    if calories <= 0 {
        bail!("Calories must be greater than 0");
    }
    Ok(())
}

pub fn validate_macros(macros: &Macros) -> Result<()> {
    for (name, value) in [
        ("Protein", macros.protein),
        ("Carbs", macros.carbs),
        ("Fat", macros.fat),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{name} must be a non-negative number of grams");
        }
    }
    Ok(())
}

pub fn validate_weight_kg(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 || weight_kg > MAX_WEIGHT_KG {
        bail!("Weight must be greater than 0 and at most {MAX_WEIGHT_KG} kg");
    }
    Ok(())
}

pub fn validate_new_workout(workout: &NewWorkout, today: NaiveDate) -> Result<()> {
    validate_text("Workout type", workout.activity.trim(), 1, 50)?;
    validate_duration(workout.duration_minutes)?;
    validate_not_future("Workout", workout.date, today)?;
    validate_notes(workout.notes.as_deref())
}

pub fn validate_workout_update(update: &UpdateWorkout, today: NaiveDate) -> Result<()> {
    if update.is_empty() {
        bail!("At least one field must be provided");
    }
    if let Some(ref activity) = update.activity {
        validate_text("Workout type", activity.trim(), 1, 50)?;
    }
    if let Some(minutes) = update.duration_minutes {
        validate_duration(minutes)?;
    }
    if let Some(date) = update.date {
        validate_not_future("Workout", date, today)?;
    }
    validate_notes(update.notes.as_deref())
}

/// Meal times are naive local timestamps, so "now" is the caller's local clock.
pub fn validate_new_meal(meal: &NewMeal, now: NaiveDateTime) -> Result<()> {
    validate_text("Meal name", meal.name.trim(), 1, 100)?;
    validate_calories(meal.calories)?;
    validate_macros(&meal.macros)?;
    if meal.time > now {
        bail!("Meal time cannot be in the future");
    }
    validate_notes(meal.notes.as_deref())
}

pub fn validate_meal_update(update: &UpdateMeal, now: NaiveDateTime) -> Result<()> {
    if update.is_empty() {
        bail!("At least one field must be provided");
    }
    if let Some(ref name) = update.name {
        validate_text("Meal name", name.trim(), 1, 100)?;
    }
    if let Some(calories) = update.calories {
        validate_calories(calories)?;
    }
    if let Some(ref macros) = update.macros {
        validate_macros(macros)?;
    }
    if let Some(time) = update.time {
        if time > now {
            bail!("Meal time cannot be in the future");
        }
    }
    validate_notes(update.notes.as_deref())
}

pub fn validate_new_weight_log(log: &NewWeightLog, today: NaiveDate) -> Result<()> {
    validate_weight_kg(log.weight_kg)?;
    validate_not_future("Weight log", log.date, today)
}

/// Reject report windows whose start falls after their end.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        bail!("Start date {start} must not be after end date {end}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_workout() -> NewWorkout {
        NewWorkout {
            activity: "running".to_string(),
            duration_minutes: 30,
            intensity: Intensity::Medium,
            date: day(2024, 6, 15),
            notes: None,
        }
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("Alice_01").unwrap(), "alice_01");
        assert_eq!(validate_username("bob-smith").unwrap(), "bob-smith");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("Alice@Example.COM").unwrap(),
            "alice@example.com"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@localhost").is_err());
    }

    #[test]
    fn test_validate_goals() {
        assert!(validate_goals(&FitnessGoals::default()).is_ok());
        assert!(
            validate_goals(&FitnessGoals {
                target_weight: Some(75.0),
                weekly_workout_minutes: Some(0),
            })
            .is_ok()
        );
        assert!(
            validate_goals(&FitnessGoals {
                target_weight: Some(0.0),
                weekly_workout_minutes: None,
            })
            .is_err()
        );
        assert!(
            validate_goals(&FitnessGoals {
                target_weight: None,
                weekly_workout_minutes: Some(-1),
            })
            .is_err()
        );
    }

    #[test]
    fn test_validate_new_user_normalizes() {
        let user = validate_new_user(&NewUser {
            username: "TestUser".to_string(),
            email: "Test@Example.com".to_string(),
            full_name: Some("   ".to_string()),
            dob: None,
            goals: FitnessGoals::default(),
        })
        .unwrap();
        assert_eq!(user.username, "testuser");
        assert_eq!(user.email, "test@example.com");
        assert!(user.full_name.is_none());
    }

    #[test]
    fn test_intensity_parse() {
        assert_eq!("low".parse::<Intensity>().unwrap(), Intensity::Low);
        assert_eq!("MEDIUM".parse::<Intensity>().unwrap(), Intensity::Medium);
        assert_eq!(" high ".parse::<Intensity>().unwrap(), Intensity::High);
        assert!("extreme".parse::<Intensity>().is_err());
    }

    #[test]
    fn test_intensity_serde_lowercase() {
        let json = serde_json::to_string(&Intensity::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn test_validate_new_workout() {
        let today = day(2024, 6, 20);
        assert!(validate_new_workout(&sample_workout(), today).is_ok());

        let mut zero = sample_workout();
        zero.duration_minutes = 0;
        assert!(validate_new_workout(&zero, today).is_err());

        let mut future = sample_workout();
        future.date = day(2024, 6, 21);
        assert!(validate_new_workout(&future, today).is_err());

        let mut blank = sample_workout();
        blank.activity = "  ".to_string();
        assert!(validate_new_workout(&blank, today).is_err());

        let mut long_notes = sample_workout();
        long_notes.notes = Some("n".repeat(MAX_NOTES_LEN + 1));
        assert!(validate_new_workout(&long_notes, today).is_err());
    }

    #[test]
    fn test_validate_workout_update_requires_field() {
        let today = day(2024, 6, 20);
        assert!(validate_workout_update(&UpdateWorkout::default(), today).is_err());
        let update = UpdateWorkout {
            duration_minutes: Some(45),
            ..UpdateWorkout::default()
        };
        assert!(validate_workout_update(&update, today).is_ok());
    }

    #[test]
    fn test_validate_new_meal() {
        let now = day(2024, 6, 20).and_hms_opt(12, 0, 0).unwrap();
        let meal = NewMeal {
            name: "Oatmeal".to_string(),
            calories: 350,
            macros: Macros {
                protein: 12.0,
                carbs: 60.0,
                fat: 6.5,
            },
            time: day(2024, 6, 20).and_hms_opt(8, 0, 0).unwrap(),
            notes: None,
        };
        assert!(validate_new_meal(&meal, now).is_ok());

        let mut later = meal.clone();
        later.time = day(2024, 6, 20).and_hms_opt(12, 0, 1).unwrap();
        assert!(validate_new_meal(&later, now).is_err());

        let mut negative = meal.clone();
        negative.macros.fat = -1.0;
        assert!(validate_new_meal(&negative, now).is_err());

        let mut no_cal = meal;
        no_cal.calories = 0;
        assert!(validate_new_meal(&no_cal, now).is_err());
    }

    #[test]
    fn test_validate_weight_kg_bounds() {
        assert!(validate_weight_kg(80.5).is_ok());
        assert!(validate_weight_kg(MAX_WEIGHT_KG).is_ok());
        assert!(validate_weight_kg(0.0).is_err());
        assert!(validate_weight_kg(500.1).is_err());
        assert!(validate_weight_kg(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        assert!(validate_date_range(day(2024, 6, 1), day(2024, 6, 1)).is_ok());
        assert!(validate_date_range(day(2024, 6, 1), day(2024, 6, 7)).is_ok());
        assert!(validate_date_range(day(2024, 6, 8), day(2024, 6, 7)).is_err());
    }
}
