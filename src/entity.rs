//! Entities: the vertices of an [`EntityGraph`](crate::graph::EntityGraph).
//!
//! An entity's identity is its `(name, type)` pair. Official (query) entities
//! additionally carry an external knowledge-base id and a query id, but these
//! never participate in equality or hashing: an official entity and an
//! anonymous mention with the same name and type are the same vertex.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity types
// ---------------------------------------------------------------------------

/// Named-entity type of an entity or of a slot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Gpe,
    Location,
    City,
    StateOrProvince,
    Country,
    Nationality,
    Religion,
    Title,
    Date,
    Number,
    Url,
    CauseOfDeath,
    CriminalCharge,
    Ideology,
    Misc,
}

impl EntityType {
    /// The canonical upper-case tag (`PERSON`, `ORGANIZATION`, ...).
    ///
    /// Unary rule predicates match against this name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Gpe => "GPE",
            Self::Location => "LOCATION",
            Self::City => "CITY",
            Self::StateOrProvince => "STATE_OR_PROVINCE",
            Self::Country => "COUNTRY",
            Self::Nationality => "NATIONALITY",
            Self::Religion => "RELIGION",
            Self::Title => "TITLE",
            Self::Date => "DATE",
            Self::Number => "NUMBER",
            Self::Url => "URL",
            Self::CauseOfDeath => "CAUSE_OF_DEATH",
            Self::CriminalCharge => "CRIMINAL_CHARGE",
            Self::Ideology => "IDEOLOGY",
            Self::Misc => "MISC",
        }
    }

    /// How specific the type is. When merging an equivalence class the more
    /// specific type wins (a `CITY` says more than a `GPE`, which says more
    /// than a `LOCATION`).
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Misc => 0,
            Self::Location => 1,
            Self::Gpe => 2,
            Self::City | Self::StateOrProvince | Self::Country => 3,
            _ => 2,
        }
    }

    /// Whether entities of this type can have `*:alternate_names` slots.
    pub fn supports_alternate_names(&self) -> bool {
        matches!(self, Self::Person | Self::Organization)
    }

    /// Whether this is one of the geopolitical/location types.
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            Self::Gpe | Self::Location | Self::City | Self::StateOrProvince | Self::Country
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORGANIZATION" | "ORG" => Self::Organization,
            "GPE" => Self::Gpe,
            "LOCATION" | "LOC" => Self::Location,
            "CITY" => Self::City,
            "STATE_OR_PROVINCE" | "STATEORPROVINCE" => Self::StateOrProvince,
            "COUNTRY" => Self::Country,
            "NATIONALITY" => Self::Nationality,
            "RELIGION" => Self::Religion,
            "TITLE" => Self::Title,
            "DATE" => Self::Date,
            "NUMBER" => Self::Number,
            "URL" => Self::Url,
            "CAUSE_OF_DEATH" => Self::CauseOfDeath,
            "CRIMINAL_CHARGE" => Self::CriminalCharge,
            "IDEOLOGY" => Self::Ideology,
            "MISC" => Self::Misc,
            other => return Err(format!("unknown entity type: {other}")),
        };
        Ok(ty)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Whether an entity was discovered during extraction or named by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    /// An entity mention found in text.
    Anonymous,
    /// A query entity or a knowledge-base entity with an external identity.
    Official {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query_id: Option<String>,
    },
}

/// A named, typed real-world referent.
///
/// Equality and hashing consider only `(name, entity_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default = "anonymous_kind")]
    pub kind: EntityKind,
}

fn anonymous_kind() -> EntityKind {
    EntityKind::Anonymous
}

impl Entity {
    /// An anonymous entity discovered during extraction.
    pub fn anonymous(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            kind: EntityKind::Anonymous,
        }
    }

    /// An official entity with optional external and query identifiers.
    pub fn official(
        name: impl Into<String>,
        entity_type: EntityType,
        external_id: Option<String>,
        query_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type,
            kind: EntityKind::Official {
                external_id,
                query_id,
            },
        }
    }

    pub fn is_official(&self) -> bool {
        matches!(self.kind, EntityKind::Official { .. })
    }

    pub fn external_id(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Official { external_id, .. } => external_id.as_deref(),
            EntityKind::Anonymous => None,
        }
    }

    pub fn query_id(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Official { query_id, .. } => query_id.as_deref(),
            EntityKind::Anonymous => None,
        }
    }

    /// Copy of this entity with a different type. Used when an equivalence
    /// class adopts the most specific type among its members.
    pub fn with_type(&self, entity_type: EntityType) -> Self {
        Self {
            entity_type,
            ..self.clone()
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.entity_type == other.entity_type
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.entity_type.hash(state);
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.entity_type.cmp(&other.entity_type))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_ignores_official_metadata() {
        let anon = Entity::anonymous("Acme Corp", EntityType::Organization);
        let official = Entity::official(
            "Acme Corp",
            EntityType::Organization,
            Some("E0001".into()),
            Some("SF_001".into()),
        );
        assert_eq!(anon, official);

        let mut set = HashSet::new();
        set.insert(anon);
        assert!(set.contains(&official));
    }

    #[test]
    fn type_is_part_of_identity() {
        let a = Entity::anonymous("Jordan", EntityType::Person);
        let b = Entity::anonymous("Jordan", EntityType::Country);
        assert_ne!(a, b);
    }

    #[test]
    fn official_accessors() {
        let e = Entity::official("Jane Doe", EntityType::Person, Some("E7".into()), None);
        assert!(e.is_official());
        assert_eq!(e.external_id(), Some("E7"));
        assert_eq!(e.query_id(), None);
        assert!(!Entity::anonymous("x", EntityType::Misc).is_official());
    }

    #[test]
    fn entity_type_parse() {
        assert_eq!("ORG".parse::<EntityType>().unwrap(), EntityType::Organization);
        assert_eq!("person".parse::<EntityType>().unwrap(), EntityType::Person);
        assert!("SPACESHIP".parse::<EntityType>().is_err());
    }

    #[test]
    fn specificity_prefers_city_over_location() {
        assert!(EntityType::City.specificity() > EntityType::Gpe.specificity());
        assert!(EntityType::Gpe.specificity() > EntityType::Location.specificity());
    }

    #[test]
    fn serde_defaults_to_anonymous() {
        let e: Entity = serde_json::from_str(r#"{"name":"Acme","type":"ORGANIZATION"}"#).unwrap();
        assert!(!e.is_official());
        assert_eq!(e.entity_type, EntityType::Organization);
    }
}
