//! Typed payloads and record builders for the synced entities.
//!
//! Each user action of the app maps onto exactly one queue record:
//!
//! | action                   | record                                  |
//! |--------------------------|-----------------------------------------|
//! | add medication           | `CREATE medication/{id}` full document  |
//! | edit medication          | `UPDATE medication/{id}` changed fields |
//! | delete medication        | `DELETE medication/{id}`                |
//! | mark dose taken/skipped  | `CREATE adherence/{new id}`             |
//! | favorite a pharmacy      | `CREATE favorite/{pharmacyId}`          |
//! | unfavorite a pharmacy    | `DELETE favorite/{pharmacyId}`          |

use crate::error::{Error, Result};
use crate::record::{Action, EntityType, QueueRecord};
use crate::EntityId;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const MAX_MEDICATION_NAME_LENGTH: usize = 100;
pub const MAX_DOSAGE_LENGTH: usize = 50;
pub const MAX_REMINDERS_PER_MEDICATION: usize = 3;

/// How often a medication is taken per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Twice,
    Thrice,
    Custom,
}

/// Meal constraint for a dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MealRequirement {
    Fasting,
    WithFood,
    Any,
}

/// A medication schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: EntityId,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: Frequency,
    /// Dose times as `HH:MM`
    pub times: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_requirement: Option<MealRequirement>,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    /// A new schedule with a fresh id, starting now.
    pub fn new(
        medication_name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: Frequency,
        times: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            medication_name: medication_name.into(),
            dosage: dosage.into(),
            frequency,
            times,
            meal_requirement: None,
            start_date: now,
            end_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check field limits.
    pub fn validate(&self) -> Result<()> {
        let name = self.medication_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidPayload("medication name is required".into()));
        }
        if name.chars().count() > MAX_MEDICATION_NAME_LENGTH {
            return Err(Error::InvalidPayload(format!(
                "medication name exceeds {MAX_MEDICATION_NAME_LENGTH} characters"
            )));
        }
        if self.dosage.chars().count() > MAX_DOSAGE_LENGTH {
            return Err(Error::InvalidPayload(format!(
                "dosage exceeds {MAX_DOSAGE_LENGTH} characters"
            )));
        }
        if self.times.is_empty() {
            return Err(Error::InvalidPayload("at least one dose time is required".into()));
        }
        if self.times.len() > MAX_REMINDERS_PER_MEDICATION {
            return Err(Error::InvalidPayload(format!(
                "at most {MAX_REMINDERS_PER_MEDICATION} dose times are allowed"
            )));
        }
        if let Some(time) = self.times.iter().find(|t| !is_dose_time(t)) {
            return Err(Error::InvalidPayload(format!(
                "dose time {time:?} is not HH:MM"
            )));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::InvalidPayload("end date precedes start date".into()));
            }
        }
        Ok(())
    }

    /// Whether the schedule covers `at`.
    pub fn is_active_on(&self, at: DateTime<Utc>) -> bool {
        self.start_date <= at && self.end_date.map_or(true, |end| end >= at)
    }
}

/// `HH:MM` on a 24-hour clock, zero padded.
fn is_dose_time(time: &str) -> bool {
    time.len() == 5 && NaiveTime::parse_from_str(time, "%H:%M").is_ok()
}

/// One taken or skipped dose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceEntry {
    pub date: DateTime<Utc>,
    pub taken: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

impl AdherenceEntry {
    pub fn taken(at: DateTime<Utc>) -> Self {
        Self {
            date: at,
            taken: true,
            taken_at: Some(at),
            skipped_reason: None,
        }
    }

    pub fn skipped(at: DateTime<Utc>, reason: Option<String>) -> Self {
        Self {
            date: at,
            taken: false,
            taken_at: None,
            skipped_reason: reason,
        }
    }
}

fn to_object(value: &impl Serialize) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn create_medication(medication: &Medication) -> Result<QueueRecord> {
    medication.validate()?;
    Ok(QueueRecord::new(
        Action::Create,
        EntityType::Medication,
        medication.id.clone(),
        to_object(medication)?,
    ))
}

/// Partial update; `updatedAt` is stamped into the patch.
pub fn update_medication(
    medication_id: impl Into<EntityId>,
    patch: serde_json::Value,
) -> Result<QueueRecord> {
    let serde_json::Value::Object(mut fields) = patch else {
        return Err(Error::InvalidPayload(
            "medication update must be a JSON object".into(),
        ));
    };
    if fields.contains_key("id") {
        return Err(Error::InvalidPayload("medication id cannot be changed".into()));
    }
    fields.insert("updatedAt".to_string(), json!(Utc::now()));

    Ok(QueueRecord::new(
        Action::Update,
        EntityType::Medication,
        medication_id,
        serde_json::Value::Object(fields),
    ))
}

pub fn delete_medication(medication_id: impl Into<EntityId>) -> QueueRecord {
    QueueRecord::new(
        Action::Delete,
        EntityType::Medication,
        medication_id,
        json!({}),
    )
}

/// Adherence entries are their own documents, linked by `medicationId`.
pub fn record_adherence(
    medication_id: impl Into<EntityId>,
    entry: &AdherenceEntry,
) -> Result<QueueRecord> {
    let mut payload = to_object(entry)?;
    if let Some(fields) = payload.as_object_mut() {
        fields.insert("medicationId".to_string(), json!(medication_id.into()));
    }

    Ok(QueueRecord::new(
        Action::Create,
        EntityType::Adherence,
        uuid::Uuid::new_v4().to_string(),
        payload,
    ))
}

pub fn add_favorite(pharmacy_id: impl Into<EntityId>) -> QueueRecord {
    let pharmacy_id = pharmacy_id.into();
    let payload = json!({
        "pharmacyId": pharmacy_id,
        "addedAt": Utc::now(),
    });
    QueueRecord::new(Action::Create, EntityType::Favorite, pharmacy_id, payload)
}

pub fn remove_favorite(pharmacy_id: impl Into<EntityId>) -> QueueRecord {
    QueueRecord::new(Action::Delete, EntityType::Favorite, pharmacy_id, json!({}))
}
