/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a registered document.
/// Stored as a single letter (`E`, `U`, `I`) in every table and in the protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolType {
    /// Entrata - incoming
    #[serde(rename = "E")]
    Incoming,
    /// Uscita - outgoing
    #[serde(rename = "U")]
    Outgoing,
    /// Interno - internal
    #[serde(rename = "I")]
    Internal,
}

impl ProtocolType {
    pub const ALL: [ProtocolType; 3] = [
        ProtocolType::Incoming,
        ProtocolType::Outgoing,
        ProtocolType::Internal,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ProtocolType::Incoming => "E",
            ProtocolType::Outgoing => "U",
            ProtocolType::Internal => "I",
        }
    }

    /// Folder name used on remote storage (`{root}/{year}/{folder}`)
    pub fn folder_name(&self) -> &'static str {
        match self {
            ProtocolType::Incoming => "Entrata",
            ProtocolType::Outgoing => "Uscita",
            ProtocolType::Internal => "Interno",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol type '{0}' (expected E, U or I)")]
pub struct UnknownProtocolType(pub String);

impl FromStr for ProtocolType {
    type Err = UnknownProtocolType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" | "ENTRATA" => Ok(ProtocolType::Incoming),
            "U" | "USCITA" => Ok(ProtocolType::Outgoing),
            "I" | "INTERNO" => Ok(ProtocolType::Internal),
            _ => Err(UnknownProtocolType(s.to_string())),
        }
    }
}

/// User roles known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operator" | "user" => Ok(Role::Operator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("E".parse::<ProtocolType>().unwrap(), ProtocolType::Incoming);
        assert_eq!("u".parse::<ProtocolType>().unwrap(), ProtocolType::Outgoing);
        assert_eq!("Interno".parse::<ProtocolType>().unwrap(), ProtocolType::Internal);
        assert!("X".parse::<ProtocolType>().is_err());
        assert!("".parse::<ProtocolType>().is_err());
    }

    #[test]
    fn serializes_as_single_letter() {
        let v = serde_json::to_value(ProtocolType::Outgoing).unwrap();
        assert_eq!(v, serde_json::json!("U"));
        let t: ProtocolType = serde_json::from_value(serde_json::json!("I")).unwrap();
        assert_eq!(t, ProtocolType::Internal);
    }

    #[test]
    fn folder_names() {
        assert_eq!(ProtocolType::Incoming.folder_name(), "Entrata");
        assert_eq!(ProtocolType::Outgoing.folder_name(), "Uscita");
        assert_eq!(ProtocolType::Internal.folder_name(), "Interno");
    }

    #[test]
    fn roles() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Operator);
        assert!("root".parse::<Role>().is_err());
    }
}
