use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime identity of party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub String);

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity(s.to_string())
    }
}

impl From<&String> for Identity {
    fn from(s: &String) -> Self {
        Identity(s.clone())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a party in the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    First,
    Second,
    Third,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::First, Role::Second, Role::Third];

    pub fn index(&self) -> usize {
        match self {
            Role::First => 0,
            Role::Second => 1,
            Role::Third => 2,
        }
    }

    pub fn next(&self) -> Role {
        Role::ALL[(self.index() + 1) % 3]
    }

    pub fn prev(&self) -> Role {
        Role::ALL[(self.index() + 2) % 3]
    }

    /// Identity used on the wire for the party playing this role.
    pub fn identity(&self) -> Identity {
        Identity(format!("party{}", self.index()))
    }
}

impl TryFrom<usize> for Role {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Role::ALL.get(index).copied().ok_or(Error::Id(index))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party {}", self.index())
    }
}
