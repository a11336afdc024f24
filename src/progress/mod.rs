//! Player progress record and the transition applied by each update

pub mod leveling;
pub mod update;

pub use leveling::LevelState;
pub use update::{Overrides, ProgressUpdate, UpdateKind, WorkoutUpdate};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::Document;
use crate::exercises::MuscleGroup;
use leveling::{BASE_XP_MAX, XP_PER_EXERCISE};

/// Item name -> count
pub type Inventory = BTreeMap<String, u64>;

pub const BASE_STAMINA: f64 = 100.0;
pub const STARTING_COINS: u64 = 100;
/// Coins paid per completed exercise
pub const COINS_PER_EXERCISE: u64 = 10;

/// Document field names owned by the record itself
const RECORD_FIELDS: &[&str] = &[
    "level",
    "xp",
    "xpMax",
    "stamina",
    "staminaMax",
    "chest",
    "arms",
    "abs",
    "legs",
    "back",
    "totalCalories",
    "totalExercises",
    "lastWorkout",
    "streak",
    "coins",
    "inventory",
];

/// Items every new player starts with
pub fn starter_inventory() -> Inventory {
    [("energyDrink", 5), ("apple", 3), ("friedEgg", 2), ("chickenLeg", 4)]
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
}

/// Cumulative per-user progress, stored as one document.
/// Missing fields read back as the starting values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerProgress {
    pub level: u32,
    pub xp: u64,
    pub xp_max: u64,
    pub stamina: f64,
    pub stamina_max: f64,
    pub chest: f64,
    pub arms: f64,
    pub abs: f64,
    pub legs: f64,
    pub back: f64,
    pub total_calories: f64,
    pub total_exercises: u64,
    pub last_workout: Option<DateTime<Utc>>,
    pub streak: u64,
    pub coins: u64,
    pub inventory: Inventory,
    /// Fields written by earlier updates that the engine does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            xp_max: BASE_XP_MAX,
            stamina: BASE_STAMINA,
            stamina_max: BASE_STAMINA,
            chest: 0.0,
            arms: 0.0,
            abs: 0.0,
            legs: 0.0,
            back: 0.0,
            total_calories: 0.0,
            total_exercises: 0,
            last_workout: None,
            streak: 0,
            coins: STARTING_COINS,
            inventory: starter_inventory(),
            extra: Map::new(),
        }
    }
}

/// Outcome of applying one update in memory
#[derive(Debug, Clone)]
pub struct Transition {
    pub next: PlayerProgress,
    pub levels_gained: u32,
}

impl PlayerProgress {
    pub fn muscle(&self, group: MuscleGroup) -> f64 {
        match group {
            MuscleGroup::Chest => self.chest,
            MuscleGroup::Arms => self.arms,
            MuscleGroup::Abs => self.abs,
            MuscleGroup::Legs => self.legs,
            MuscleGroup::Back => self.back,
        }
    }

    fn muscle_mut(&mut self, group: MuscleGroup) -> &mut f64 {
        match group {
            MuscleGroup::Chest => &mut self.chest,
            MuscleGroup::Arms => &mut self.arms,
            MuscleGroup::Abs => &mut self.abs,
            MuscleGroup::Legs => &mut self.legs,
            MuscleGroup::Back => &mut self.back,
        }
    }

    /// Compute the record that follows `update`.
    ///
    /// Order: passthrough fields, workout accrual, inventory merge, then the
    /// explicit coin/stamina overrides, so an override always wins over accrual.
    pub fn apply(&self, update: &ProgressUpdate, now: DateTime<Utc>) -> Transition {
        let mut next = self.clone();
        next.extra.extend(
            update
                .passthrough
                .iter()
                .filter(|(k, _)| !RECORD_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut level_state = LevelState {
            level: next.level.max(1),
            xp: next.xp,
            xp_max: next.xp_max,
        };

        let xp_gained = match &update.kind {
            UpdateKind::Workout(workout) => {
                for (group, amount) in workout.muscles.iter() {
                    *next.muscle_mut(group) += amount;
                }
                next.total_calories += workout.calories;
                next.total_exercises = next.total_exercises.saturating_add(workout.exercises);
                next.streak = next.streak.saturating_add(1);
                next.last_workout = Some(now);
                next.coins = next
                    .coins
                    .saturating_add(workout.exercises.saturating_mul(COINS_PER_EXERCISE));
                next.stamina += workout.stamina_delta;
                workout.exercises.saturating_mul(XP_PER_EXERCISE)
            }
            UpdateKind::Generic => 0,
        };

        // Also repairs an out-of-range stored xp on generic updates
        let levels_gained = level_state.gain(xp_gained);
        next.level = level_state.level;
        next.xp = level_state.xp;
        next.xp_max = level_state.xp_max;

        let overrides = &update.overrides;
        if let Some(items) = &overrides.inventory {
            next.inventory
                .extend(items.iter().map(|(k, v)| (k.clone(), *v)));
        }
        if let Some(coins) = overrides.coins {
            next.coins = coins;
        }
        if let Some(max) = overrides.stamina_max {
            next.stamina_max = max;
        }
        if let Some(stamina) = overrides.stamina {
            next.stamina = stamina;
        }
        next.stamina = next.stamina.clamp(0.0, next.stamina_max.max(0.0));

        Transition { next, levels_gained }
    }

    /// Decode a stored document
    pub fn from_document(doc: Document) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(doc))
    }

    /// Encode as a full document
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(doc)) => doc,
            // derived Serialize on a struct always yields an object
            _ => Document::new(),
        }
    }

    /// Top-level fields of `next` that differ from `self`.
    /// Nested values (inventory) are emitted whole.
    pub fn changed_fields(&self, next: &PlayerProgress) -> Document {
        let before = self.to_document();
        next.to_document()
            .into_iter()
            .filter(|(k, v)| before.get(k) != Some(v))
            .collect()
    }
}
