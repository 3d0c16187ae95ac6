//! Process-wide repository for profiles, mappings, telemetry configurations,
//! and conversion history.
//!
//! One reader-preferring lock guards the whole interior: translations take
//! short read guards to snapshot the state they need, admin CRUD takes
//! short exclusive writes. The `is_default` / `is_active` flips happen
//! inside a single write guard so no observer ever sees two defaults.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use sigmaspl_convert::{ConversionProfile, ProfileMapping, cim};

use crate::configs::{AuditConfig, NewAuditConfig, NewSysmonConfig, SysmonConfig};
use crate::error::{EngineError, Result};
use crate::profile::{NewProfile, Profile, ProfileUpdate};
use crate::response::ConversionRecord;

#[derive(Default)]
struct Inner {
    profiles: Vec<Profile>,
    mappings: HashMap<i64, Vec<ProfileMapping>>,
    sysmon_configs: Vec<SysmonConfig>,
    audit_configs: Vec<AuditConfig>,
    history: Vec<ConversionRecord>,
    next_profile_id: i64,
    next_sysmon_id: i64,
    next_audit_id: i64,
    next_history_id: i64,
}

/// The shared repository. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct Store {
    inner: RwLock<Inner>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    pub fn list_profiles(&self) -> Vec<Profile> {
        self.inner.read().profiles.clone()
    }

    pub fn get_profile(&self, id: i64) -> Result<Profile> {
        self.inner
            .read()
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("profile {id}")))
    }

    pub fn default_profile(&self) -> Option<Profile> {
        self.inner
            .read()
            .profiles
            .iter()
            .find(|p| p.is_default)
            .cloned()
    }

    pub fn create_profile(&self, new: NewProfile) -> Result<Profile> {
        if new.name.trim().is_empty() {
            return Err(EngineError::Conflict("profile name must not be empty".into()));
        }
        let mut inner = self.inner.write();
        if inner.profiles.iter().any(|p| p.name == new.name) {
            return Err(EngineError::Conflict(format!(
                "profile name '{}' already exists",
                new.name
            )));
        }
        inner.next_profile_id += 1;
        let id = inner.next_profile_id;
        if new.is_default {
            for p in &mut inner.profiles {
                p.is_default = false;
            }
        }
        let now = Utc::now();
        let profile = Profile {
            id,
            name: new.name,
            description: new.description,
            default_index: new.default_index,
            default_sourcetype: new.default_sourcetype,
            cim_enabled: new.cim_enabled,
            is_default: new.is_default,
            macros: new.macros,
            created_at: now,
            updated_at: now,
        };
        inner.profiles.push(profile.clone());
        inner.mappings.insert(id, Vec::new());
        info!(profile = %profile.name, id, "profile created");
        Ok(profile)
    }

    pub fn update_profile(&self, id: i64, update: ProfileUpdate) -> Result<Profile> {
        let mut inner = self.inner.write();

        if let Some(name) = &update.name
            && inner.profiles.iter().any(|p| p.name == *name && p.id != id)
        {
            return Err(EngineError::Conflict(format!(
                "profile name '{name}' already exists"
            )));
        }

        // Activating a new default clears the old one in the same guard.
        if update.is_default == Some(true) {
            for p in &mut inner.profiles {
                p.is_default = false;
            }
        }

        let profile = inner
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {id}")))?;

        if let Some(name) = update.name {
            profile.name = name;
        }
        if let Some(description) = update.description {
            profile.description = description;
        }
        if let Some(default_index) = update.default_index {
            profile.default_index = default_index;
        }
        if let Some(default_sourcetype) = update.default_sourcetype {
            profile.default_sourcetype = default_sourcetype;
        }
        if let Some(cim_enabled) = update.cim_enabled {
            profile.cim_enabled = cim_enabled;
        }
        if let Some(is_default) = update.is_default {
            profile.is_default = is_default;
        }
        if let Some(macros) = update.macros {
            profile.macros = macros;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    pub fn delete_profile(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write();
        let before = inner.profiles.len();
        inner.profiles.retain(|p| p.id != id);
        if inner.profiles.len() == before {
            return Err(EngineError::NotFound(format!("profile {id}")));
        }
        inner.mappings.remove(&id);
        // History keeps its snapshots; deleting a referenced profile is fine.
        Ok(())
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    pub fn list_mappings(&self, profile_id: i64) -> Result<Vec<ProfileMapping>> {
        self.inner
            .read()
            .mappings
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))
    }

    pub fn add_mapping(&self, profile_id: i64, mapping: ProfileMapping) -> Result<()> {
        let mut inner = self.inner.write();
        let mappings = inner
            .mappings
            .get_mut(&profile_id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))?;
        if mappings.iter().any(|m| m.sigma_field == mapping.sigma_field) {
            return Err(EngineError::Conflict(format!(
                "mapping for '{}' already exists",
                mapping.sigma_field
            )));
        }
        mappings.push(mapping);
        Ok(())
    }

    pub fn update_mapping(&self, profile_id: i64, mapping: ProfileMapping) -> Result<()> {
        let mut inner = self.inner.write();
        let mappings = inner
            .mappings
            .get_mut(&profile_id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))?;
        let slot = mappings
            .iter_mut()
            .find(|m| m.sigma_field == mapping.sigma_field)
            .ok_or_else(|| {
                EngineError::NotFound(format!("mapping for '{}'", mapping.sigma_field))
            })?;
        *slot = mapping;
        Ok(())
    }

    pub fn delete_mapping(&self, profile_id: i64, sigma_field: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let mappings = inner
            .mappings
            .get_mut(&profile_id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))?;
        let before = mappings.len();
        mappings.retain(|m| m.sigma_field != sigma_field);
        if mappings.len() == before {
            return Err(EngineError::NotFound(format!("mapping for '{sigma_field}'")));
        }
        Ok(())
    }

    /// Replace the profile's whole mapping list, preserving the given order.
    pub fn replace_mappings(
        &self,
        profile_id: i64,
        mappings: Vec<ProfileMapping>,
    ) -> Result<usize> {
        dedupe_check(&mappings)?;
        let mut inner = self.inner.write();
        let slot = inner
            .mappings
            .get_mut(&profile_id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))?;
        let count = mappings.len();
        *slot = mappings;
        Ok(count)
    }

    /// Bulk import: upsert by `sigma_field`, appending new entries in order.
    pub fn import_mappings(&self, profile_id: i64, mappings: Vec<ProfileMapping>) -> Result<usize> {
        dedupe_check(&mappings)?;
        let mut inner = self.inner.write();
        let slot = inner
            .mappings
            .get_mut(&profile_id)
            .ok_or_else(|| EngineError::NotFound(format!("profile {profile_id}")))?;
        let count = mappings.len();
        for mapping in mappings {
            match slot.iter_mut().find(|m| m.sigma_field == mapping.sigma_field) {
                Some(existing) => *existing = mapping,
                None => slot.push(mapping),
            }
        }
        Ok(count)
    }

    /// Heuristic CIM suggestions for unmapped fields. Empty unless the
    /// profile opts into CIM.
    pub fn suggest(
        &self,
        profile_id: i64,
        sigma_fields: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let profile = self.get_profile(profile_id)?;
        let mut out = BTreeMap::new();
        if !profile.cim_enabled {
            return Ok(out);
        }
        for field in sigma_fields {
            if let Some(target) = cim::cim_suggest(field) {
                out.insert(field.clone(), target.to_string());
            }
        }
        Ok(out)
    }

    /// Snapshot a profile (by id, or the default, or empty) for translation.
    pub fn conversion_profile(&self, profile_id: Option<i64>) -> Result<ConversionProfile> {
        match profile_id {
            Some(id) => {
                let profile = self.get_profile(id)?;
                let mappings = self.list_mappings(id)?;
                Ok(profile.conversion_view(&mappings))
            }
            None => match self.default_profile() {
                Some(profile) => {
                    let mappings = self.list_mappings(profile.id)?;
                    Ok(profile.conversion_view(&mappings))
                }
                None => Ok(ConversionProfile::default()),
            },
        }
    }

    // =========================================================================
    // Sysmon configs
    // =========================================================================

    pub fn list_sysmon_configs(&self) -> Vec<SysmonConfig> {
        self.inner.read().sysmon_configs.clone()
    }

    pub fn active_sysmon(&self) -> Option<SysmonConfig> {
        self.inner
            .read()
            .sysmon_configs
            .iter()
            .find(|c| c.is_active)
            .cloned()
    }

    pub fn add_sysmon_config(&self, new: NewSysmonConfig) -> Result<SysmonConfig> {
        let mut inner = self.inner.write();
        inner.next_sysmon_id += 1;
        let config = SysmonConfig {
            id: inner.next_sysmon_id,
            name: new.name,
            version: new.version,
            schema_version: new.schema_version,
            enabled_event_ids: new.enabled_event_ids,
            disabled_event_ids: new.disabled_event_ids,
            rules: new.rules,
            is_active: false,
            created_at: Utc::now(),
        };
        inner.sysmon_configs.push(config.clone());
        Ok(config)
    }

    pub fn activate_sysmon(&self, id: i64) -> Result<SysmonConfig> {
        let mut inner = self.inner.write();
        if !inner.sysmon_configs.iter().any(|c| c.id == id) {
            return Err(EngineError::NotFound(format!("sysmon config {id}")));
        }
        let mut activated = None;
        for c in &mut inner.sysmon_configs {
            c.is_active = c.id == id;
            if c.is_active {
                activated = Some(c.clone());
            }
        }
        Ok(activated.expect("existence checked"))
    }

    pub fn delete_sysmon_config(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write();
        let before = inner.sysmon_configs.len();
        inner.sysmon_configs.retain(|c| c.id != id);
        if inner.sysmon_configs.len() == before {
            return Err(EngineError::NotFound(format!("sysmon config {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Audit configs
    // =========================================================================

    pub fn list_audit_configs(&self) -> Vec<AuditConfig> {
        self.inner.read().audit_configs.clone()
    }

    pub fn active_audit(&self) -> Option<AuditConfig> {
        self.inner
            .read()
            .audit_configs
            .iter()
            .find(|c| c.is_active)
            .cloned()
    }

    pub fn add_audit_config(&self, new: NewAuditConfig) -> Result<AuditConfig> {
        let mut inner = self.inner.write();
        inner.next_audit_id += 1;
        let config = AuditConfig {
            id: inner.next_audit_id,
            name: new.name,
            categories: new.categories,
            is_active: false,
            created_at: Utc::now(),
        };
        inner.audit_configs.push(config.clone());
        Ok(config)
    }

    pub fn activate_audit(&self, id: i64) -> Result<AuditConfig> {
        let mut inner = self.inner.write();
        if !inner.audit_configs.iter().any(|c| c.id == id) {
            return Err(EngineError::NotFound(format!("audit config {id}")));
        }
        let mut activated = None;
        for c in &mut inner.audit_configs {
            c.is_active = c.id == id;
            if c.is_active {
                activated = Some(c.clone());
            }
        }
        Ok(activated.expect("existence checked"))
    }

    pub fn delete_audit_config(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.write();
        let before = inner.audit_configs.len();
        inner.audit_configs.retain(|c| c.id != id);
        if inner.audit_configs.len() == before {
            return Err(EngineError::NotFound(format!("audit config {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Conversion history
    // =========================================================================

    /// Append a record, assigning its monotone id.
    pub fn record_conversion(&self, mut record: ConversionRecord) -> ConversionRecord {
        let mut inner = self.inner.write();
        inner.next_history_id += 1;
        record.id = inner.next_history_id;
        inner.history.push(record.clone());
        record
    }

    pub fn list_history(&self) -> Vec<ConversionRecord> {
        self.inner.read().history.clone()
    }

    pub fn get_history(&self, id: i64) -> Result<ConversionRecord> {
        self.inner
            .read()
            .history
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("conversion {id}")))
    }
}

fn dedupe_check(mappings: &[ProfileMapping]) -> Result<()> {
    for (i, m) in mappings.iter().enumerate() {
        if mappings[..i].iter().any(|o| o.sigma_field == m.sigma_field) {
            return Err(EngineError::Conflict(format!(
                "duplicate sigma_field '{}' in mapping set",
                m.sigma_field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> NewProfile {
        NewProfile {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_profile_name_conflicts() {
        let store = Store::new();
        store.create_profile(named("prod")).unwrap();
        let err = store.create_profile(named("prod")).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn at_most_one_default_profile() {
        let store = Store::new();
        let a = store
            .create_profile(NewProfile {
                is_default: true,
                ..named("a")
            })
            .unwrap();
        let b = store
            .create_profile(NewProfile {
                is_default: true,
                ..named("b")
            })
            .unwrap();

        let defaults: Vec<i64> = store
            .list_profiles()
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect();
        assert_eq!(defaults, vec![b.id]);

        store
            .update_profile(
                a.id,
                ProfileUpdate {
                    is_default: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let defaults: Vec<i64> = store
            .list_profiles()
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect();
        assert_eq!(defaults, vec![a.id]);
    }

    #[test]
    fn mapping_crud_and_uniqueness() {
        let store = Store::new();
        let p = store.create_profile(named("prod")).unwrap();
        let mapping = ProfileMapping {
            sigma_field: "Image".into(),
            target_field: "NewProcessName".into(),
            transform: None,
            category: None,
            notes: None,
        };
        store.add_mapping(p.id, mapping.clone()).unwrap();
        let err = store.add_mapping(p.id, mapping).unwrap_err();
        assert_eq!(err.kind(), "conflict");

        store.delete_mapping(p.id, "Image").unwrap();
        assert!(store.list_mappings(p.id).unwrap().is_empty());
        assert_eq!(
            store.delete_mapping(p.id, "Image").unwrap_err().kind(),
            "not_found"
        );
    }

    #[test]
    fn import_upserts_and_replace_replaces() {
        let store = Store::new();
        let p = store.create_profile(named("prod")).unwrap();
        let m = |sf: &str, tf: &str| ProfileMapping {
            sigma_field: sf.into(),
            target_field: tf.into(),
            transform: None,
            category: None,
            notes: None,
        };
        store
            .import_mappings(p.id, vec![m("Image", "a"), m("User", "b")])
            .unwrap();
        store
            .import_mappings(p.id, vec![m("Image", "c"), m("CommandLine", "d")])
            .unwrap();
        let mappings = store.list_mappings(p.id).unwrap();
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].target_field, "c");

        store.replace_mappings(p.id, vec![m("Only", "x")]).unwrap();
        assert_eq!(store.list_mappings(p.id).unwrap().len(), 1);
    }

    #[test]
    fn suggest_requires_cim() {
        let store = Store::new();
        let plain = store.create_profile(named("plain")).unwrap();
        let cim = store
            .create_profile(NewProfile {
                cim_enabled: true,
                ..named("cim")
            })
            .unwrap();

        let fields = vec!["Image".to_string(), "Zzz".to_string()];
        assert!(store.suggest(plain.id, &fields).unwrap().is_empty());
        let suggestions = store.suggest(cim.id, &fields).unwrap();
        assert_eq!(suggestions.get("Image").map(|s| s.as_str()), Some("process"));
        assert!(!suggestions.contains_key("Zzz"));
    }

    #[test]
    fn at_most_one_active_sysmon() {
        let store = Store::new();
        let a = store
            .add_sysmon_config(NewSysmonConfig {
                name: "a".into(),
                ..Default::default()
            })
            .unwrap();
        let b = store
            .add_sysmon_config(NewSysmonConfig {
                name: "b".into(),
                ..Default::default()
            })
            .unwrap();
        store.activate_sysmon(a.id).unwrap();
        store.activate_sysmon(b.id).unwrap();
        let active: Vec<i64> = store
            .list_sysmon_configs()
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect();
        assert_eq!(active, vec![b.id]);
    }

    #[test]
    fn deleting_profile_keeps_history() {
        let store = Store::new();
        let p = store.create_profile(named("prod")).unwrap();
        let record = ConversionRecord::forward_stub("test", Some(p.id));
        let stored = store.record_conversion(record);
        store.delete_profile(p.id).unwrap();
        assert!(store.get_history(stored.id).is_ok());
    }

    #[test]
    fn history_ids_are_monotone() {
        let store = Store::new();
        let a = store.record_conversion(ConversionRecord::forward_stub("a", None));
        let b = store.record_conversion(ConversionRecord::forward_stub("b", None));
        assert!(b.id > a.id);
    }
}
