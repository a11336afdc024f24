//! Update payloads accepted by the progression engine
//!
//! The wire form is a loose JSON object with a `type` discriminator.
//! It is parsed into a tagged union plus a set of explicit overrides, so the
//! merge order (workout accrual first, overrides last) is fixed in one place.

use serde_json::{Map, Value};

use crate::error::{ProgressError, Result};
use crate::exercises::{MuscleGains, MuscleGroup};

use super::Inventory;

/// Discriminator value selecting the workout rules
pub const WORKOUT_TYPE: &str = "WORKOUT";

const TYPE_FIELD: &str = "type";
const EXERCISES_FIELD: &str = "exercises";
const CALORIES_FIELD: &str = "calories";
const STAMINA_DELTA_FIELD: &str = "staminaDelta";
const COINS_FIELD: &str = "coins";
const STAMINA_FIELD: &str = "stamina";
const STAMINA_MAX_FIELD: &str = "staminaMax";
const INVENTORY_FIELD: &str = "inventory";

/// Fields only the engine may write
const MANAGED_FIELDS: &[&str] = &[
    "level",
    "xp",
    "xpMax",
    "totalCalories",
    "totalExercises",
    "lastWorkout",
    "streak",
];

/// Metrics of one completed workout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutUpdate {
    /// Exercises completed this session
    pub exercises: u64,
    /// Calories burned this session
    pub calories: f64,
    /// Signed change applied to current stamina
    pub stamina_delta: f64,
    pub muscles: MuscleGains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Workout(WorkoutUpdate),
    Generic,
}

/// Values that replace stored ones outright. Applied after workout accrual.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub coins: Option<u64>,
    pub stamina: Option<f64>,
    pub stamina_max: Option<f64>,
    /// Shallow-merged into the stored inventory
    pub inventory: Option<Inventory>,
}

/// A parsed progression update
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub kind: UpdateKind,
    pub overrides: Overrides,
    /// Unrecognized fields, written onto the record verbatim
    pub passthrough: Map<String, Value>,
}

impl ProgressUpdate {
    pub fn workout(workout: WorkoutUpdate) -> Self {
        Self {
            kind: UpdateKind::Workout(workout),
            overrides: Overrides::default(),
            passthrough: Map::new(),
        }
    }

    pub fn generic() -> Self {
        Self {
            kind: UpdateKind::Generic,
            overrides: Overrides::default(),
            passthrough: Map::new(),
        }
    }

    pub fn with_coins(mut self, coins: u64) -> Self {
        self.overrides.coins = Some(coins);
        self
    }

    pub fn with_stamina(mut self, stamina: f64) -> Self {
        self.overrides.stamina = Some(stamina);
        self
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.overrides.inventory = Some(inventory);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.passthrough.insert(name.into(), value);
        self
    }

    pub fn is_workout(&self) -> bool {
        matches!(self.kind, UpdateKind::Workout(_))
    }

    /// Parse the untyped JSON payload
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(ProgressError::invalid_update("<payload>", "expected a JSON object"));
        };

        let is_workout = match fields.remove(TYPE_FIELD) {
            None | Some(Value::Null) => false,
            Some(Value::String(t)) => t == WORKOUT_TYPE,
            Some(_) => return Err(ProgressError::invalid_update(TYPE_FIELD, "expected a string")),
        };

        let kind = if is_workout {
            let mut muscles = MuscleGains::default();
            for group in MuscleGroup::all() {
                if let Some(v) = take_non_negative(&mut fields, group.field())? {
                    *muscles.get_mut(*group) = v;
                }
            }
            UpdateKind::Workout(WorkoutUpdate {
                exercises: take_count(&mut fields, EXERCISES_FIELD)?.unwrap_or(0),
                calories: take_non_negative(&mut fields, CALORIES_FIELD)?.unwrap_or(0.0),
                stamina_delta: take_number(&mut fields, STAMINA_DELTA_FIELD)?.unwrap_or(0.0),
                muscles,
            })
        } else {
            let workout_only = MuscleGroup::all()
                .iter()
                .map(|g| g.field())
                .chain([EXERCISES_FIELD, CALORIES_FIELD, STAMINA_DELTA_FIELD]);
            for field in workout_only {
                if fields.contains_key(field) {
                    return Err(ProgressError::invalid_update(
                        field,
                        format!("only allowed with type {WORKOUT_TYPE}"),
                    ));
                }
            }
            UpdateKind::Generic
        };

        let stamina_max = take_number(&mut fields, STAMINA_MAX_FIELD)?;
        if let Some(max) = stamina_max
            && max <= 0.0
        {
            return Err(ProgressError::invalid_update(STAMINA_MAX_FIELD, "must be positive"));
        }

        let overrides = Overrides {
            coins: take_count(&mut fields, COINS_FIELD)?,
            stamina: take_number(&mut fields, STAMINA_FIELD)?,
            stamina_max,
            inventory: take_inventory(&mut fields)?,
        };

        if let Some(field) = MANAGED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
            return Err(ProgressError::invalid_update(field, "managed by the progression engine"));
        }

        Ok(Self {
            kind,
            overrides,
            passthrough: fields,
        })
    }
}

fn take_number(fields: &mut Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ProgressError::invalid_update(name, "number out of range")),
        },
        Some(other) => Err(ProgressError::invalid_update(
            name,
            format!("expected a number, got {other}"),
        )),
    }
}

fn take_non_negative(fields: &mut Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match take_number(fields, name)? {
        Some(v) if v < 0.0 => Err(ProgressError::invalid_update(name, "must not be negative")),
        v => Ok(v),
    }
}

fn take_count(fields: &mut Map<String, Value>, name: &str) -> Result<Option<u64>> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_count(&value)
            .map(Some)
            .ok_or_else(|| ProgressError::invalid_update(name, format!("expected a non-negative integer, got {value}"))),
    }
}

/// Non-negative integer; whole floats such as `5.0` are accepted
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Some(f as u64),
        _ => None,
    }
}

fn take_inventory(fields: &mut Map<String, Value>) -> Result<Option<Inventory>> {
    match fields.remove(INVENTORY_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(items)) => {
            let mut inventory = Inventory::new();
            for (item, count) in items {
                let count = as_count(&count).ok_or_else(|| {
                    ProgressError::invalid_update(
                        INVENTORY_FIELD,
                        format!("item `{item}` needs a non-negative integer count"),
                    )
                })?;
                inventory.insert(item, count);
            }
            Ok(Some(inventory))
        }
        Some(_) => Err(ProgressError::invalid_update(INVENTORY_FIELD, "expected an object")),
    }
}
