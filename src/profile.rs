//! Binding profiles
//!
//! A [`Profile`] is a complete binding table: one [`BindingSlot`] per keypad
//! key, in canonical key order. Forking a profile copies the slots and shares
//! their actions, so a fork starts out identical to its source and only
//! diverges when one of them is rebound.

use crate::action::Action;
use crate::keys::{KeyIndex, KeyTables};
use regex::Regex;
use std::fmt::Write;
use std::sync::Arc;

/// Binding for a single keypad key.
#[derive(Debug, Clone)]
pub struct BindingSlot {
    key: KeyIndex,
    name: &'static str,
    parse: bool,
    action: Option<Arc<Action>>,
}

impl BindingSlot {
    fn new(name: &'static str, index: usize, parse: bool) -> Self {
        Self {
            key: KeyIndex::new(index),
            name,
            parse,
            action: None,
        }
    }

    pub fn key(&self) -> KeyIndex {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the report bit of this slot is decoded at all.
    pub fn is_parsed(&self) -> bool {
        self.parse
    }

    pub fn action(&self) -> Option<&Arc<Action>> {
        self.action.as_ref()
    }

    /// Replace the bound action; `None` unbinds.
    pub fn set_action(&mut self, action: Option<Arc<Action>>) {
        self.action = action;
    }
}

/// A named binding table.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    slots: Vec<BindingSlot>,
}

impl Profile {
    /// Create a profile with every key unbound.
    pub fn new(name: impl Into<String>, tables: &KeyTables) -> Self {
        let slots = tables
            .keypad_names()
            .iter()
            .enumerate()
            .map(|(i, &name)| BindingSlot::new(name, i, tables.is_parsed(name)))
            .collect();
        Self {
            name: name.into(),
            slots,
        }
    }

    /// Copy of this profile under a new name, sharing all actions.
    pub fn fork(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: self.slots.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    pub fn find_key(&self, tables: &KeyTables, name: &str) -> Option<&BindingSlot> {
        self.slots.get(tables.keypad_index(name)?)
    }

    pub fn find_key_mut(&mut self, tables: &KeyTables, name: &str) -> Option<&mut BindingSlot> {
        self.slots.get_mut(tables.keypad_index(name)?)
    }

    /// Names of the slots matching `pattern`, bound ones only unless
    /// `include_unbound` is set.
    pub fn filtered_key_names(&self, pattern: &Regex, include_unbound: bool) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| include_unbound || slot.action.is_some())
            .filter(|slot| pattern.is_match(slot.name))
            .map(|slot| slot.name)
            .collect()
    }

    /// Append the bound slots of this profile to `out`.
    pub fn dump(&self, tables: &KeyTables, out: &mut String) {
        let _ = writeln!(out, "Profile {:?}", self.name);
        for slot in &self.slots {
            if let Some(action) = &slot.action {
                let _ = writeln!(
                    out,
                    "   {}({}) : {}",
                    slot.name,
                    slot.key.index,
                    action.describe(tables)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEYPAD_KEY_COUNT;

    fn bind(profile: &mut Profile, tables: &KeyTables, key: &str, spec: &str) -> Arc<Action> {
        let action = Arc::new(Action::parse(tables, spec).unwrap());
        profile
            .find_key_mut(tables, key)
            .unwrap()
            .set_action(Some(action.clone()));
        action
    }

    #[test]
    fn test_slots_follow_canonical_order() {
        let tables = KeyTables::new();
        let profile = Profile::new("default", &tables);
        assert_eq!(profile.slots().len(), KEYPAD_KEY_COUNT);
        for (i, slot) in profile.slots().iter().enumerate() {
            assert_eq!(slot.key().index, i);
            assert_eq!(slot.name(), tables.keypad_name(i));
        }
        assert!(!profile.find_key(&tables, "LIGHT").unwrap().is_parsed());
        assert!(profile.find_key(&tables, "M3").unwrap().is_parsed());
    }

    #[test]
    fn test_find_key_unknown() {
        let tables = KeyTables::new();
        let profile = Profile::new("default", &tables);
        assert!(profile.find_key(&tables, "G99").is_none());
        assert!(profile.find_key(&tables, "").is_none());
    }

    #[test]
    fn test_fork_shares_actions() {
        let tables = KeyTables::new();
        let mut default = Profile::new("default", &tables);
        let original = bind(&mut default, &tables, "G1", "A");

        let mut fork = default.fork("work");
        assert_eq!(fork.name(), "work");
        let forked = fork.find_key(&tables, "G1").unwrap().action().unwrap();
        assert!(Arc::ptr_eq(forked, &original));

        bind(&mut fork, &tables, "G1", "B");
        let kept = default.find_key(&tables, "G1").unwrap().action().unwrap();
        assert!(Arc::ptr_eq(kept, &original));
    }

    #[test]
    fn test_filtered_key_names() {
        let tables = KeyTables::new();
        let mut profile = Profile::new("default", &tables);
        bind(&mut profile, &tables, "G1", "A");
        bind(&mut profile, &tables, "G10", "B");
        bind(&mut profile, &tables, "M1", "C");

        let pattern = Regex::new("^G1.*$").unwrap();
        assert_eq!(profile.filtered_key_names(&pattern, false), vec!["G1", "G10"]);
        let all = profile.filtered_key_names(&pattern, true);
        assert_eq!(all.len(), 11); // G1, G10..G19
    }

    #[test]
    fn test_dump_lists_bound_keys() {
        let tables = KeyTables::new();
        let mut profile = Profile::new("default", &tables);
        bind(&mut profile, &tables, "G2", "KEY_B");
        let mut out = String::new();
        profile.dump(&tables, &mut out);
        assert_eq!(out, "Profile \"default\"\n   G2(1) : SEND KEYS: B\n");
    }
}
