use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reference::Identifier;

/// Submodel phase an operation belongs to; fixes the port's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Pre-compute input.
    FInit,
    /// Intermediate output.
    OI,
    /// State update input.
    S,
    /// Final output.
    OF,
    /// Pseudo-port carrying the next overlay for the instance.
    MuscleSettingsIn,
    /// Pseudo-port carrying manager-supplied parameters.
    MuscleParametersIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Operator {
    pub fn direction(self) -> Direction {
        match self {
            Operator::FInit | Operator::S => Direction::In,
            Operator::OI | Operator::OF => Direction::Out,
            Operator::MuscleSettingsIn | Operator::MuscleParametersIn => Direction::In,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::FInit => "F_INIT",
            Operator::OI => "O_I",
            Operator::S => "S",
            Operator::OF => "O_F",
            Operator::MuscleSettingsIn => "muscle_settings_in",
            Operator::MuscleParametersIn => "muscle_parameters_in",
        };
        f.write_str(s)
    }
}

/// Connection state of a declared port, set once by `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Declared,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: Identifier,
    pub operator: Operator,
    pub state: PortState,
}

impl Port {
    pub fn new(name: Identifier, operator: Operator) -> Self {
        Self {
            name,
            operator,
            state: PortState::Declared,
        }
    }

    pub fn direction(&self) -> Direction {
        self.operator.direction()
    }

    pub fn is_connected(&self) -> bool {
        self.state == PortState::Connected
    }
}

/// The set of ports an instance declares before `connect()` runs.
#[derive(Debug, Clone, Default)]
pub struct PortSet {
    ports: HashMap<String, Port>,
}

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: Identifier, operator: Operator) {
        let key = name.as_str().to_string();
        self.ports.insert(key, Port::new(name, operator));
    }

    pub fn get(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.get_mut(name)
    }

    /// One-way transition: Declared -> Connected or Disconnected. Ports not
    /// mentioned in `connected` become Disconnected.
    pub fn connect(&mut self, connected: &[&str]) {
        for (name, port) in self.ports.iter_mut() {
            port.state = if connected.contains(&name.as_str()) {
                PortState::Connected
            } else {
                PortState::Disconnected
            };
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_direction_is_fixed_by_class() {
        assert_eq!(Operator::FInit.direction(), Direction::In);
        assert_eq!(Operator::OI.direction(), Direction::Out);
        assert_eq!(Operator::S.direction(), Direction::In);
        assert_eq!(Operator::OF.direction(), Direction::Out);
    }

    #[test]
    fn connect_transition_is_one_way() {
        let mut ports = PortSet::new();
        ports.declare(Identifier::new("in").unwrap(), Operator::FInit);
        ports.declare(Identifier::new("optional_in").unwrap(), Operator::FInit);
        ports.connect(&["in"]);
        assert!(ports.get("in").unwrap().is_connected());
        assert!(!ports.get("optional_in").unwrap().is_connected());
        assert_eq!(
            ports.get("optional_in").unwrap().state,
            PortState::Disconnected
        );
    }
}
