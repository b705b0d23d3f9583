//! Pure aggregation over one window's worth of records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Intensity, Macros, Meal, WeightLog, Workout};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityBreakdown {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl IntensityBreakdown {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.low + self.medium + self.high
    }

    fn record(&mut self, intensity: Intensity) {
        match intensity {
            Intensity::Low => self.low += 1,
            Intensity::Medium => self.medium += 1,
            Intensity::High => self.high += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutStats {
    pub total_workouts: usize,
    pub total_minutes: i64,
    pub average_duration: f64,
    pub intensity_breakdown: IntensityBreakdown,
    /// Occurrences per activity type; only types that appear in the window.
    pub workout_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionStats {
    pub total_meals: usize,
    pub total_calories: i64,
    pub average_daily_calories: f64,
    pub total_macros: Macros,
    pub average_daily_macros: Macros,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "decreasing")]
    Decreasing,
    #[serde(rename = "increasing")]
    Increasing,
    #[serde(rename = "stable")]
    Stable,
    #[serde(rename = "no data")]
    NoData,
}

impl Trend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decreasing => "decreasing",
            Self::Increasing => "increasing",
            Self::Stable => "stable",
            Self::NoData => "no data",
        }
    }

    fn from_change(change: f64) -> Self {
        if change < 0.0 {
            Self::Decreasing
        } else if change > 0.0 {
            Self::Increasing
        } else {
            Self::Stable
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight movement across a window. All `Option`s are `None` exactly when `entries == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTrend {
    pub entries: usize,
    pub start_weight: Option<f64>,
    pub end_weight: Option<f64>,
    pub change: Option<f64>,
    pub trend: Trend,
}

impl WeightTrend {
    #[must_use]
    pub const fn no_data() -> Self {
        Self {
            entries: 0,
            start_weight: None,
            end_weight: None,
            change: None,
            trend: Trend::NoData,
        }
    }
}

impl Default for WeightTrend {
    fn default() -> Self {
        Self::no_data()
    }
}

/// Round the exact stored value half-to-even at `places` decimals; never
/// returns negative zero.
#[must_use]
pub fn round_to(value: f64, places: usize) -> f64 {
    let rounded = format!("{value:.places$}")
        .parse::<f64>()
        .unwrap_or(value);
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Number of calendar days in the inclusive window, never less than one.
#[must_use]
pub fn window_days(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(1)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn workout_stats(workouts: &[Workout]) -> WorkoutStats {
    if workouts.is_empty() {
        return WorkoutStats::default();
    }

    let mut stats = WorkoutStats {
        total_workouts: workouts.len(),
        ..WorkoutStats::default()
    };
    for w in workouts {
        stats.total_minutes += w.duration_minutes;
        stats.intensity_breakdown.record(w.intensity);
        *stats.workout_types.entry(w.activity.clone()).or_insert(0) += 1;
    }
    stats.average_duration = round_to(stats.total_minutes as f64 / workouts.len() as f64, 1);
    stats
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn nutrition_stats(meals: &[Meal], start: NaiveDate, end: NaiveDate) -> NutritionStats {
    if meals.is_empty() {
        return NutritionStats::default();
    }

    let days = window_days(start, end) as f64;
    let total_calories: i64 = meals.iter().map(|m| m.calories).sum();
    let totals = meals.iter().fold(Macros::default(), |acc, m| Macros {
        protein: acc.protein + m.macros.protein,
        carbs: acc.carbs + m.macros.carbs,
        fat: acc.fat + m.macros.fat,
    });

    NutritionStats {
        total_meals: meals.len(),
        total_calories,
        average_daily_calories: round_to(total_calories as f64 / days, 1),
        total_macros: Macros {
            protein: round_to(totals.protein, 1),
            carbs: round_to(totals.carbs, 1),
            fat: round_to(totals.fat, 1),
        },
        average_daily_macros: Macros {
            protein: round_to(totals.protein / days, 1),
            carbs: round_to(totals.carbs / days, 1),
            fat: round_to(totals.fat / days, 1),
        },
    }
}

#[must_use]
pub fn weight_trend(logs: &[WeightLog]) -> WeightTrend {
    let Some(first) = logs.iter().min_by_key(|l| l.date) else {
        return WeightTrend::no_data();
    };
    // max_by_key keeps the last maximum, so ties resolve to the later entry
    let last = logs.iter().max_by_key(|l| l.date).unwrap_or(first);

    let change = round_to(last.weight_kg - first.weight_kg, 2);
    WeightTrend {
        entries: logs.len(),
        start_weight: Some(round_to(first.weight_kg, 2)),
        end_weight: Some(round_to(last.weight_kg, 2)),
        change: Some(change),
        trend: Trend::from_change(change),
    }
}
