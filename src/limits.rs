//! Input-size ceilings applied at the service boundary.

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_LOCATION_LEN: usize = 200;
pub const MAX_EQUIPMENT_ITEMS: usize = 64;
pub const MAX_EQUIPMENT_ITEM_LEN: usize = 120;
pub const MAX_NOTES_LEN: usize = 1000;

/// Lab capacity when the admin does not specify one.
pub const DEFAULT_LAB_CAPACITY: u32 = 30;
