use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::ProtocolType;

/// Externally visible protocol identifier: `YYYY/NNNN/ORG/T`.
///
/// Existing registers reference numbers in this exact shape, so `Display`
/// must stay byte-for-byte stable: four-digit zero padding on the sequence,
/// slashes as separators, the single-letter type code last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolNumber {
    pub year: i32,
    pub sequence: i32,
    pub org_code: String,
    pub protocol_type: ProtocolType,
}

impl ProtocolNumber {
    pub fn new(year: i32, sequence: i32, org_code: impl Into<String>, protocol_type: ProtocolType) -> Self {
        Self {
            year,
            sequence,
            org_code: org_code.into(),
            protocol_type,
        }
    }

    /// Zero-padded sequence as used in stored file names (`0042`)
    pub fn padded_sequence(&self) -> String {
        format!("{:04}", self.sequence)
    }
}

impl fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:04}/{}/{}",
            self.year, self.sequence, self.org_code, self.protocol_type
        )
    }
}

impl Serialize for ProtocolNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed protocol number '{0}'")]
pub struct MalformedProtocolNumber(pub String);

impl FromStr for ProtocolNumber {
    type Err = MalformedProtocolNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedProtocolNumber(s.to_string());
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(malformed());
        }

        let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !digits(parts[0]) || !digits(parts[1]) || parts[1].len() < 4 {
            return Err(malformed());
        }
        if parts[2].is_empty() || parts[2].chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        if parts[3].len() != 1 {
            return Err(malformed());
        }

        let year = parts[0].parse::<i32>().map_err(|_| malformed())?;
        let sequence = parts[1].parse::<i32>().map_err(|_| malformed())?;
        let protocol_type = parts[3].parse::<ProtocolType>().map_err(|_| malformed())?;
        if sequence < 1 {
            return Err(malformed());
        }

        Ok(Self::new(year, sequence, parts[2], protocol_type))
    }
}
