use ulid::Ulid;

use crate::limits::*;
use crate::model::{Entity, Lab};
use crate::observability;

use super::error::{ConflictCause, ScheduleError};
use super::SchedulingService;

#[derive(Debug, Clone, Default)]
pub struct NewLab {
    pub name: String,
    pub description: String,
    pub location: String,
    /// Defaults to [`DEFAULT_LAB_CAPACITY`] when unset.
    pub capacity: Option<u32>,
    pub equipment: Vec<String>,
}

/// Partial lab update; unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct LabPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub equipment: Option<Vec<String>>,
}

fn validate_lab_fields(
    name: &str,
    description: &str,
    location: &str,
    capacity: u32,
    equipment: &[String],
) -> Result<(), ScheduleError> {
    if name.trim().is_empty() {
        return Err(ScheduleError::Validation("lab name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ScheduleError::Validation("lab name too long".into()));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(ScheduleError::Validation("lab description too long".into()));
    }
    if location.len() > MAX_LOCATION_LEN {
        return Err(ScheduleError::Validation("lab location too long".into()));
    }
    if capacity == 0 {
        return Err(ScheduleError::Validation("lab capacity must be at least 1".into()));
    }
    if equipment.len() > MAX_EQUIPMENT_ITEMS {
        return Err(ScheduleError::Validation("too many equipment items".into()));
    }
    if equipment.iter().any(|item| item.len() > MAX_EQUIPMENT_ITEM_LEN) {
        return Err(ScheduleError::Validation("equipment item too long".into()));
    }
    Ok(())
}

impl SchedulingService {
    pub async fn create_lab(&self, new: NewLab) -> Result<Lab, ScheduleError> {
        let capacity = new.capacity.unwrap_or(DEFAULT_LAB_CAPACITY);
        let name = new.name.trim().to_string();
        validate_lab_fields(&name, &new.description, &new.location, capacity, &new.equipment)?;

        if let Some(existing) = self.storage().find_active_lab_by_name(&name, None).await? {
            return Err(ScheduleError::Conflict(ConflictCause::LabNameTaken {
                name,
                existing: existing.id,
            }));
        }

        let now = self.now();
        let lab = Lab {
            id: Ulid::new(),
            name,
            description: new.description,
            location: new.location,
            capacity,
            equipment: new.equipment,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage().insert_lab(lab.clone()).await?;
        observability::record_op("create_lab");
        Ok(lab)
    }

    pub async fn update_lab(&self, id: Ulid, patch: LabPatch) -> Result<Lab, ScheduleError> {
        let mut lab = self
            .storage()
            .lab(id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Lab, id))?;

        if let Some(name) = &patch.name {
            let name = name.trim();
            if let Some(existing) =
                self.storage().find_active_lab_by_name(name, Some(id)).await?
            {
                return Err(ScheduleError::Conflict(ConflictCause::LabNameTaken {
                    name: name.to_string(),
                    existing: existing.id,
                }));
            }
            lab.name = name.to_string();
        }
        if let Some(description) = patch.description {
            lab.description = description;
        }
        if let Some(location) = patch.location {
            lab.location = location;
        }
        if let Some(capacity) = patch.capacity {
            lab.capacity = capacity;
        }
        if let Some(equipment) = patch.equipment {
            lab.equipment = equipment;
        }
        validate_lab_fields(&lab.name, &lab.description, &lab.location, lab.capacity, &lab.equipment)?;

        lab.updated_at = self.now();
        self.storage().update_lab(lab.clone()).await?;
        observability::record_op("update_lab");
        Ok(lab)
    }

    /// Soft delete. Blocked while the lab still has active slots; the
    /// name becomes reusable by a new active lab afterwards.
    pub async fn delete_lab(&self, id: Ulid) -> Result<(), ScheduleError> {
        let mut lab = self
            .storage()
            .lab(id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Lab, id))?;
        if !lab.active {
            return Ok(());
        }

        let active_slots = self.storage().count_active_slots_for_lab(id).await?;
        if active_slots > 0 {
            return Err(ScheduleError::Conflict(ConflictCause::LabHasActiveSlots {
                lab: id,
                count: active_slots,
            }));
        }

        lab.active = false;
        lab.updated_at = self.now();
        self.storage().update_lab(lab).await?;
        observability::record_op("delete_lab");
        Ok(())
    }

    pub async fn get_lab(&self, id: Ulid) -> Result<Lab, ScheduleError> {
        self.storage()
            .lab(id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Lab, id))
    }

    /// Active labs, name order.
    pub async fn list_labs(&self) -> Result<Vec<Lab>, ScheduleError> {
        let mut labs: Vec<Lab> = self
            .storage()
            .labs()
            .await?
            .into_iter()
            .filter(|l| l.active)
            .collect();
        labs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(labs)
    }
}
