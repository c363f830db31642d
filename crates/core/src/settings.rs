use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::reference::{Identifier, Reference};

/// A parameter value. Leaf types only — no nesting beyond two list levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    FloatList(Vec<f64>),
    FloatListList(Vec<Vec<f64>>),
}

/// The type tag used by `SettingsStore::get` to validate a looked-up value,
/// matching the wire tags `str`/`int`/`float`/`bool`/`[float]`/`[[float]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    FloatList,
    FloatListList,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Str => "str",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::FloatList => "[float]",
            ValueKind::FloatListList => "[[float]]",
        };
        f.write_str(s)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::FloatList(_) => ValueKind::FloatList,
            Value::FloatListList(_) => ValueKind::FloatListList,
        }
    }
}

/// An ordered mapping of Reference to Value. Used as both the `base` and
/// `overlay` layer of a [`SettingsStore`], and as the decoded form of the
/// settings-overlay carried on every message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings(Vec<(Reference, Value)>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Reference, value: Value) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &Reference) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Reference, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

/// Two-layer settings: an immutable `base` loaded once at startup and a
/// mutable `overlay` that is rewritten on every parallel-universe-checked
/// F_INIT receive.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    base: Settings,
    overlay: Settings,
}

impl SettingsStore {
    pub fn new(base: Settings) -> Self {
        Self {
            base,
            overlay: Settings::new(),
        }
    }

    pub fn overlay(&self) -> &Settings {
        &self.overlay
    }

    pub fn set_overlay(&mut self, overlay: Settings) {
        self.overlay = overlay;
    }

    /// Searches `instance + "." + name` from most specific to least
    /// specific, overlay before base at each level. First hit wins.
    pub fn get(&self, instance: &Reference, name: &Identifier) -> Result<&Value, CoreError> {
        for candidates in self.candidate_keys(instance, name) {
            if let Some(v) = self.overlay.get(&candidates) {
                return Ok(v);
            }
            if let Some(v) = self.base.get(&candidates) {
                return Ok(v);
            }
        }
        Err(CoreError::ParameterNotFound(format!(
            "{instance}.{name}"
        )))
    }

    pub fn get_typed(
        &self,
        instance: &Reference,
        name: &Identifier,
        expected: ValueKind,
    ) -> Result<&Value, CoreError> {
        let value = self.get(instance, name)?;
        if value.kind() == expected {
            Ok(value)
        } else {
            Err(CoreError::TypeMismatch {
                name: format!("{instance}.{name}"),
                expected: expected.to_string(),
                found: value.kind().to_string(),
            })
        }
    }

    /// `instance.len()`, `instance.len()-1`, ..., `0` specific-to-general keys.
    fn candidate_keys(&self, instance: &Reference, name: &Identifier) -> Vec<Reference> {
        (0..=instance.len())
            .rev()
            .map(|n| instance.prefix(n) + name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Reference {
        s.parse().unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn lookup_is_most_specific_first() {
        let mut base = Settings::new();
        base.set(r("model.dt"), Value::Float(0.1));
        base.set(r("dt"), Value::Float(1.0));
        let mut overlay = Settings::new();
        overlay.set(r("model.sub.dt"), Value::Float(0.05));

        let mut store = SettingsStore::new(base);
        store.set_overlay(overlay);

        assert_eq!(
            store.get(&r("model.sub"), &id("dt")).unwrap(),
            &Value::Float(0.05)
        );
        assert_eq!(
            store.get(&r("model.other"), &id("dt")).unwrap(),
            &Value::Float(0.1)
        );
        assert_eq!(
            store.get(&r(""), &id("dt")).unwrap(),
            &Value::Float(1.0)
        );
    }

    #[test]
    fn missing_parameter_fails() {
        let store = SettingsStore::new(Settings::new());
        assert!(matches!(
            store.get(&r("a.b"), &id("missing")),
            Err(CoreError::ParameterNotFound(_))
        ));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut base = Settings::new();
        base.set(r("p"), Value::Int(3));
        let store = SettingsStore::new(base);
        assert!(matches!(
            store.get_typed(&r(""), &id("p"), ValueKind::Float),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn overlay_write_is_unconditional() {
        let mut store = SettingsStore::new(Settings::new());
        let mut o1 = Settings::new();
        o1.set(r("x"), Value::Int(1));
        store.set_overlay(o1);
        let mut o2 = Settings::new();
        o2.set(r("x"), Value::Int(2));
        store.set_overlay(o2);
        assert_eq!(store.get(&r(""), &id("x")).unwrap(), &Value::Int(2));
    }
}
