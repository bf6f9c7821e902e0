use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WorkoutType {
    #[serde(rename = "Strength Training")]
    StrengthTraining,
    Cardio,
    #[serde(rename = "HIIT")]
    Hiit,
    Yoga,
    Pilates,
    Swimming,
    CrossFit,
    Other,
}

impl WorkoutType {
    pub const ALL: [WorkoutType; 8] = [
        WorkoutType::StrengthTraining,
        WorkoutType::Cardio,
        WorkoutType::Hiit,
        WorkoutType::Yoga,
        WorkoutType::Pilates,
        WorkoutType::Swimming,
        WorkoutType::CrossFit,
        WorkoutType::Other,
    ];

    /// Stored values, in the same order as [`WorkoutType::ALL`].
    pub const NAMES: &'static [&'static str] = &[
        "Strength Training",
        "Cardio",
        "HIIT",
        "Yoga",
        "Pilates",
        "Swimming",
        "CrossFit",
        "Other",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutType::StrengthTraining => "Strength Training",
            WorkoutType::Cardio => "Cardio",
            WorkoutType::Hiit => "HIIT",
            WorkoutType::Yoga => "Yoga",
            WorkoutType::Pilates => "Pilates",
            WorkoutType::Swimming => "Swimming",
            WorkoutType::CrossFit => "CrossFit",
            WorkoutType::Other => "Other",
        }
    }

    /// Icon hint for clients.
    pub fn icon(&self) -> &'static str {
        match self {
            WorkoutType::StrengthTraining => "dumbbell",
            WorkoutType::Cardio => "heart",
            WorkoutType::Hiit => "fire",
            WorkoutType::Yoga => "spa",
            WorkoutType::Pilates => "accessibility",
            WorkoutType::Swimming => "pool",
            WorkoutType::CrossFit => "fitness",
            WorkoutType::Other => "more",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Medium,
    High,
}

impl Intensity {
    pub const NAMES: &'static [&'static str] = &["low", "medium", "high"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Low => "low",
            Intensity::Medium => "medium",
            Intensity::High => "high",
        }
    }
}

/// One movement inside a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Exercise {
    #[schema(example = "Back squat")]
    pub name: String,
    #[schema(example = 5)]
    pub sets: Option<u32>,
    #[schema(example = 5)]
    pub reps: Option<u32>,
    /// Kilograms
    #[schema(example = 100.0)]
    pub weight: Option<f64>,
}

impl Exercise {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("exercise name must not be empty".into());
        }
        if self.sets == Some(0) || self.reps == Some(0) {
            return Err(format!("{}: sets and reps must be at least 1", self.name.trim()));
        }
        if self.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
            return Err(format!("{}: weight cannot be negative", self.name.trim()));
        }

        Ok(())
    }
}

/// Checks an exercise list the way it will be stored.
pub fn validate_exercises(exercises: &[Exercise]) -> Result<(), String> {
    exercises.iter().try_for_each(Exercise::validate)
}

/// A logged training session, owned by the user account that recorded it.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 12,
        "user_id": 7,
        "member_id": 42,
        "workout_type": "Strength Training",
        "name": "Lower body",
        "duration_minutes": 55,
        "calories": 420,
        "intensity": "high",
        "exercises": [{ "name": "Back squat", "sets": 5, "reps": 5, "weight": 100.0 }],
        "notes": null,
        "performed_at": "2026-10-19T07:30:00Z",
        "created_at": "2026-10-19T08:30:00Z"
    })
)]
pub struct Workout {
    pub id: u64,
    pub user_id: u64,
    #[schema(nullable = true)]
    pub member_id: Option<u64>,
    #[schema(example = "Strength Training")]
    pub workout_type: String,
    #[schema(nullable = true)]
    pub name: Option<String>,
    pub duration_minutes: i32,
    #[schema(nullable = true)]
    pub calories: Option<i32>,
    #[schema(example = "medium")]
    pub intensity: String,
    #[schema(value_type = Vec<Exercise>)]
    pub exercises: Json<Vec<Exercise>>,
    #[schema(nullable = true)]
    pub notes: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub performed_at: DateTime<Utc>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}
