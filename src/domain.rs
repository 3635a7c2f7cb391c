use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Hybrid3Error;

/// Primary key of a material system in the HybriD3 database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(u64);

impl MaterialId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MaterialId {
    type Err = Hybrid3Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(Hybrid3Error::InvalidMaterialId(value.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| Hybrid3Error::InvalidMaterialId(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(u64);

impl PropertyId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag carried by each raw data point, deciding which measurement series it
/// belongs to. Anything the API sends beyond the two known tags maps to
/// `Other` and is dropped by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Primary,
    Secondary,
    Other,
}

impl Qualifier {
    pub fn parse(value: &str) -> Self {
        match value {
            "primary" => Qualifier::Primary,
            "secondary" => Qualifier::Secondary,
            _ => Qualifier::Other,
        }
    }
}

/// One entry of a fetch selection: a single material or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSelection {
    Single(MaterialId),
    Range(MaterialId, MaterialId),
}

impl MaterialSelection {
    pub fn ids(&self) -> Vec<MaterialId> {
        match self {
            MaterialSelection::Single(id) => vec![*id],
            MaterialSelection::Range(start, end) => {
                (start.value()..=end.value()).map(MaterialId::new).collect()
            }
        }
    }
}

impl fmt::Display for MaterialSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialSelection::Single(id) => write!(f, "{id}"),
            MaterialSelection::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

impl FromStr for MaterialSelection {
    type Err = Hybrid3Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.split_once('-') {
            Some((start, end)) => {
                let start: MaterialId = start.parse()?;
                let end: MaterialId = end.parse()?;
                if end.value() < start.value() {
                    return Err(Hybrid3Error::InvalidMaterialId(value.to_string()));
                }
                Ok(MaterialSelection::Range(start, end))
            }
            None => Ok(MaterialSelection::Single(trimmed.parse()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_material_id_valid() {
        let id: MaterialId = " 42 ".parse().unwrap();
        assert_eq!(id.value(), 42);
    }

    #[test]
    fn parse_material_id_invalid() {
        let err = "12a".parse::<MaterialId>().unwrap_err();
        assert_matches!(err, Hybrid3Error::InvalidMaterialId(_));
    }

    #[test]
    fn parse_selection_single_and_range() {
        let single: MaterialSelection = "7".parse().unwrap();
        assert_eq!(single.ids(), vec![MaterialId::new(7)]);

        let range: MaterialSelection = "3-5".parse().unwrap();
        assert_eq!(
            range.ids(),
            vec![MaterialId::new(3), MaterialId::new(4), MaterialId::new(5)]
        );
    }

    #[test]
    fn parse_selection_reversed_range() {
        let err = "9-3".parse::<MaterialSelection>().unwrap_err();
        assert_matches!(err, Hybrid3Error::InvalidMaterialId(_));
    }

    #[test]
    fn qualifier_tags() {
        assert_eq!(Qualifier::parse("primary"), Qualifier::Primary);
        assert_eq!(Qualifier::parse("secondary"), Qualifier::Secondary);
        assert_eq!(Qualifier::parse("tertiary"), Qualifier::Other);
    }
}
