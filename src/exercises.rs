//! Exercise classification - muscle credit for finished workouts

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::progress::WorkoutUpdate;

/// Calories credited per completed exercise
pub const CALORIES_PER_EXERCISE: f64 = 6.3;

/// Credit for a muscle that only assists the movement
const SECONDARY_CREDIT: f64 = 0.5;

/// Muscle groups tracked on the progress record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MuscleGroup {
    Chest,
    Arms,
    Abs,
    Legs,
    Back,
}

impl MuscleGroup {
    /// Field name on the stored document
    pub fn field(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "chest",
            MuscleGroup::Arms => "arms",
            MuscleGroup::Abs => "abs",
            MuscleGroup::Legs => "legs",
            MuscleGroup::Back => "back",
        }
    }

    /// All muscle groups for iteration
    pub fn all() -> &'static [MuscleGroup] {
        &[
            MuscleGroup::Chest,
            MuscleGroup::Arms,
            MuscleGroup::Abs,
            MuscleGroup::Legs,
            MuscleGroup::Back,
        ]
    }
}

/// Per-muscle increments from one workout. Fractional credit is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MuscleGains {
    pub chest: f64,
    pub arms: f64,
    pub abs: f64,
    pub legs: f64,
    pub back: f64,
}

impl MuscleGains {
    pub fn get(&self, group: MuscleGroup) -> f64 {
        match group {
            MuscleGroup::Chest => self.chest,
            MuscleGroup::Arms => self.arms,
            MuscleGroup::Abs => self.abs,
            MuscleGroup::Legs => self.legs,
            MuscleGroup::Back => self.back,
        }
    }

    pub fn get_mut(&mut self, group: MuscleGroup) -> &mut f64 {
        match group {
            MuscleGroup::Chest => &mut self.chest,
            MuscleGroup::Arms => &mut self.arms,
            MuscleGroup::Abs => &mut self.abs,
            MuscleGroup::Legs => &mut self.legs,
            MuscleGroup::Back => &mut self.back,
        }
    }

    pub fn add(&mut self, group: MuscleGroup, amount: f64) {
        *self.get_mut(group) += amount;
    }

    /// Non-zero gains in `MuscleGroup::all()` order
    pub fn iter(&self) -> impl Iterator<Item = (MuscleGroup, f64)> + '_ {
        MuscleGroup::all()
            .iter()
            .map(|g| (*g, self.get(*g)))
            .filter(|(_, v)| *v != 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Workout program picked on the home screen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkoutCategory {
    Chest,
    Abs,
    Arms,
    Legs,
    Back,
    FullBody,
}

impl WorkoutCategory {
    /// Muscle the program itself trains; full body is credited per exercise only
    pub fn primary_muscle(&self) -> Option<MuscleGroup> {
        match self {
            WorkoutCategory::Chest => Some(MuscleGroup::Chest),
            WorkoutCategory::Abs => Some(MuscleGroup::Abs),
            WorkoutCategory::Arms => Some(MuscleGroup::Arms),
            WorkoutCategory::Legs => Some(MuscleGroup::Legs),
            WorkoutCategory::Back => Some(MuscleGroup::Back),
            WorkoutCategory::FullBody => None,
        }
    }
}

impl FromStr for WorkoutCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['_', '-'], " ").as_str() {
            "CHEST" => Ok(WorkoutCategory::Chest),
            "ABS" => Ok(WorkoutCategory::Abs),
            "ARMS" => Ok(WorkoutCategory::Arms),
            "LEGS" => Ok(WorkoutCategory::Legs),
            "BACK" => Ok(WorkoutCategory::Back),
            "FULL BODY" | "FULLBODY" => Ok(WorkoutCategory::FullBody),
            other => Err(format!("unknown workout category: {other}")),
        }
    }
}

/// Name keyword -> (primary muscle, optional secondary muscle)
struct KeywordRule {
    keywords: &'static [&'static str],
    primary: MuscleGroup,
    secondary: Option<MuscleGroup>,
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["PUSH", "BENCH", "CHEST"],
        primary: MuscleGroup::Chest,
        secondary: Some(MuscleGroup::Arms),
    },
    KeywordRule {
        keywords: &["CRUNCH", "PLANK", "MOUNTAIN", "LEG RAISE", "SIT", "HEEL TOUCH"],
        primary: MuscleGroup::Abs,
        secondary: None,
    },
    KeywordRule {
        keywords: &["CURL", "TRICEP", "ARM RAISES", "DIAMOND", "DIPS"],
        primary: MuscleGroup::Arms,
        secondary: None,
    },
    KeywordRule {
        keywords: &["SQUAT", "LUNGE", "JUMP", "LEG"],
        primary: MuscleGroup::Legs,
        secondary: None,
    },
    KeywordRule {
        keywords: &["PULL", "ROW", "BACK"],
        primary: MuscleGroup::Back,
        secondary: None,
    },
];

/// Muscle credit for a single exercise, by name keywords.
/// One name can hit several rules ("LEG RAISES" trains abs and legs).
pub fn classify_exercise(name: &str) -> MuscleGains {
    let name = name.to_uppercase();
    let mut gains = MuscleGains::default();

    for rule in KEYWORD_RULES {
        if rule.keywords.iter().any(|k| name.contains(k)) {
            gains.add(rule.primary, 1.0);
            if let Some(secondary) = rule.secondary {
                gains.add(secondary, SECONDARY_CREDIT);
            }
        }
    }

    gains
}

/// A finished workout, turned into a progression event
#[derive(Debug, Clone)]
pub struct WorkoutSession {
    pub category: Option<WorkoutCategory>,
    pub exercises: Vec<String>,
    pub calories_per_exercise: f64,
    pub stamina_cost: f64,
}

impl WorkoutSession {
    pub fn new(category: Option<WorkoutCategory>, exercises: Vec<String>) -> Self {
        Self {
            category,
            exercises,
            calories_per_exercise: CALORIES_PER_EXERCISE,
            stamina_cost: 0.0,
        }
    }

    pub fn with_stamina_cost(mut self, cost: f64) -> Self {
        self.stamina_cost = cost;
        self
    }

    pub fn with_calories_per_exercise(mut self, calories: f64) -> Self {
        self.calories_per_exercise = calories;
        self
    }

    /// Muscle credit: the program's muscle once, plus every exercise's keywords.
    ///
    /// Every exercise in the session is credited, not only the last one the
    /// workout screen was showing when the session ended.
    pub fn muscle_gains(&self) -> MuscleGains {
        let mut gains = MuscleGains::default();

        if let Some(primary) = self.category.and_then(|c| c.primary_muscle()) {
            gains.add(primary, 1.0);
        }

        for exercise in &self.exercises {
            for (group, amount) in classify_exercise(exercise).iter() {
                gains.add(group, amount);
            }
        }

        gains
    }

    /// Build the workout event submitted to the engine
    pub fn to_update(&self) -> WorkoutUpdate {
        let count = self.exercises.len() as u64;
        WorkoutUpdate {
            exercises: count,
            calories: count as f64 * self.calories_per_exercise,
            stamina_delta: -self.stamina_cost,
            muscles: self.muscle_gains(),
        }
    }
}
