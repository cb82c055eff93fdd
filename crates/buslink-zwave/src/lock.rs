/*!
 * Lock platform.
 *
 * Locks carry their state in the door lock command class and report why the
 * state changed through alarm values. The alarm-type tables below translate
 * those codes into the status strings users see.
 */
use std::sync::Arc;

use buslink_core::state::EntityState;
use buslink_core::types::{Metadata, Value};

use crate::platform::{EntityBase, FactoryContext, PlatformKind, ZwaveDeviceEntity};

/// Status string per alarm type; types listed in [`ALARM_TYPE_STD`] get the
/// user number appended
const LOCK_ALARM_TYPE: &[(u8, &str)] = &[
    (9, "Deadbolt Jammed"),
    (16, "Unlocked by Bluetooth "),
    (18, "Locked with Keypad by user "),
    (19, "Unlocked with Keypad by user "),
    (21, "Manually Locked "),
    (22, "Manually Unlocked "),
    (24, "Locked by RF"),
    (25, "Unlocked by RF"),
    (27, "Auto Locked"),
    (33, "User deleted: "),
    (112, "Master Code Changed or User Added: "),
    (113, "Duplicate Pin-code: "),
    (130, "RF module, power restored"),
    (161, "Tamper Alarm: "),
    (167, "Low Battery"),
    (168, "Critical Battery Level"),
    (169, "Battery too low to operate"),
];

/// Alarm types whose status string carries the user number from alarm_level
const ALARM_TYPE_STD: &[u8] = &[18, 19, 33, 112, 113];

const MANUAL_LOCK_ALARM_LEVEL: &[(u8, &str)] = &[
    (1, "by Key Cylinder or Inside thumb turn"),
    (2, "by Touch function (lock and leave)"),
];

const TAMPER_ALARM_LEVEL: &[(u8, &str)] = &[(1, "Too many keypresses"), (2, "Cover removed")];

/// Notification string per access control event code
const LOCK_NOTIFICATION: &[(u8, &str)] = &[
    (1, "Manual Lock"),
    (2, "Manual Unlock"),
    (3, "RF Lock"),
    (4, "RF Unlock"),
    (5, "Keypad Lock"),
    (6, "Keypad Unlock"),
    (11, "Lock Jammed"),
    (254, "Unknown Event"),
];

fn table_get(table: &[(u8, &'static str)], key: u8) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn as_code(value: &Value) -> Option<u8> {
    match value {
        Value::Integer(i) if (0..=255).contains(i) => Some(*i as u8),
        _ => None,
    }
}

/// Translate alarm type and level into the user-visible lock status
pub fn lock_status(alarm_type: u8, alarm_level: Option<u8>) -> Option<String> {
    if alarm_type == 0 {
        return None;
    }
    let base = table_get(LOCK_ALARM_TYPE, alarm_type)?;
    if alarm_type == 21 {
        let detail = alarm_level.and_then(|level| table_get(MANUAL_LOCK_ALARM_LEVEL, level))?;
        return Some(format!("{}{}", base, detail));
    }
    if ALARM_TYPE_STD.contains(&alarm_type) {
        let level = alarm_level?;
        return Some(format!("{}{}", base, level));
    }
    if alarm_type == 161 {
        let detail = alarm_level.and_then(|level| table_get(TAMPER_ALARM_LEVEL, level))?;
        return Some(format!("{}{}", base, detail));
    }
    Some(base.to_string())
}

struct LockEntity {
    base: EntityBase,
}

impl ZwaveDeviceEntity for LockEntity {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Lock
    }

    fn name(&self) -> String {
        self.base.name()
    }

    fn unique_id(&self) -> Option<String> {
        self.base.unique_id()
    }

    fn state(&self) -> EntityState {
        let locked = self.base.primary.data() == Value::Bool(true);
        let mut attributes = Metadata::new();

        if let Some(access_control) = self.base.values.get("access_control") {
            if let Some(code) = as_code(&access_control.data()) {
                if let Some(notification) = table_get(LOCK_NOTIFICATION, code) {
                    attributes.insert(
                        "notification".to_string(),
                        Value::String(notification.to_string()),
                    );
                }
            }
        }

        let alarm_type = self
            .base
            .values
            .get("alarm_type")
            .and_then(|value| as_code(&value.data()));
        let alarm_level = self
            .base
            .values
            .get("alarm_level")
            .and_then(|value| as_code(&value.data()));
        if let Some(alarm_type) = alarm_type {
            if let Some(status) = lock_status(alarm_type, alarm_level) {
                attributes.insert("lock_status".to_string(), Value::String(status));
            }
        }

        let state = if locked { "locked" } else { "unlocked" };
        EntityState::with_attributes(state, attributes)
    }
}

/// Factory wired into the platform registry for [`PlatformKind::Lock`]
pub(crate) fn lock_factory(ctx: &FactoryContext) -> Option<Arc<dyn ZwaveDeviceEntity>> {
    let base = EntityBase::from_context(PlatformKind::Lock, ctx)?;
    Some(Arc::new(LockEntity { base }))
}
