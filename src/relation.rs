//! The slot inventory: which relations exist, who can own them, what values
//! they take, and how they relate to each other.
//!
//! [`RelationTable::kbp`] builds the TAC-KBP person/organization slot list.
//! Relations that appear in the table are *official*; everything else (for
//! example intermediate predicates produced by rules) is carried through the
//! graph but never reaches the final accepted set.

use std::collections::{HashMap, HashSet};

use crate::entity::EntityType;

/// `per:alternate_names`
pub const PER_ALTERNATE_NAMES: &str = "per:alternate_names";
/// `org:alternate_names`
pub const ORG_ALTERNATE_NAMES: &str = "org:alternate_names";

/// Whether a slot holds one value or a list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    List,
}

/// Static description of one relation.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub name: String,
    /// Type the owning entity must have.
    pub subject_type: EntityType,
    pub cardinality: Cardinality,
    /// Allowed value types. Empty means unconstrained.
    pub value_types: Vec<EntityType>,
}

impl RelationInfo {
    pub fn is_single_valued(&self) -> bool {
        self.cardinality == Cardinality::Single
    }

    pub fn accepts_value_type(&self, ty: EntityType) -> bool {
        self.value_types.is_empty() || self.value_types.contains(&ty)
    }
}

/// Relation inventory with inverse and transitive declarations.
#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    relations: HashMap<String, RelationInfo>,
    inverses: HashMap<String, String>,
    transitive: HashSet<String>,
}

impl RelationTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relation.
    pub fn insert(
        &mut self,
        name: &str,
        subject_type: EntityType,
        cardinality: Cardinality,
        value_types: &[EntityType],
    ) -> &mut Self {
        self.relations.insert(
            name.to_string(),
            RelationInfo {
                name: name.to_string(),
                subject_type,
                cardinality,
                value_types: value_types.to_vec(),
            },
        );
        self
    }

    /// Declare `a` and `b` as inverses of each other. `a == b` declares a
    /// self-inverse (symmetric) relation.
    pub fn declare_inverse(&mut self, a: &str, b: &str) -> &mut Self {
        self.inverses.insert(a.to_string(), b.to_string());
        self.inverses.insert(b.to_string(), a.to_string());
        self
    }

    /// Declare a relation as transitive.
    pub fn declare_transitive(&mut self, name: &str) -> &mut Self {
        self.transitive.insert(name.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.get(name)
    }

    pub fn is_official(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn is_single_valued(&self, name: &str) -> bool {
        self.get(name).is_some_and(RelationInfo::is_single_valued)
    }

    pub fn inverse_of(&self, name: &str) -> Option<&str> {
        self.inverses.get(name).map(String::as_str)
    }

    pub fn is_transitive(&self, name: &str) -> bool {
        self.transitive.contains(name)
    }

    /// Iterate over all declared relation names (unordered).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// All relations sorted by name.
    pub fn sorted(&self) -> Vec<&RelationInfo> {
        let mut all: Vec<&RelationInfo> = self.relations.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// The alternate-names relation for entities of the given type, if any.
    pub fn alternate_names_for(ty: EntityType) -> Option<&'static str> {
        match ty {
            EntityType::Person => Some(PER_ALTERNATE_NAMES),
            EntityType::Organization => Some(ORG_ALTERNATE_NAMES),
            _ => None,
        }
    }

    /// Whether the relation is one of the alternate-names relations.
    pub fn is_alternate_names(name: &str) -> bool {
        name == PER_ALTERNATE_NAMES || name == ORG_ALTERNATE_NAMES
    }

    /// The TAC-KBP slot inventory.
    pub fn kbp() -> Self {
        use Cardinality::{List, Single};
        use EntityType::*;

        const PLACES: &[EntityType] = &[Gpe, Location, City, StateOrProvince, Country];

        let mut t = Self::new();
        t.insert(PER_ALTERNATE_NAMES, Person, List, &[Person, Misc])
            .insert("per:date_of_birth", Person, Single, &[Date])
            .insert("per:age", Person, Single, &[Number])
            .insert("per:country_of_birth", Person, Single, &[Country, Gpe])
            .insert("per:stateorprovince_of_birth", Person, Single, &[StateOrProvince, Gpe])
            .insert("per:city_of_birth", Person, Single, &[City, Gpe])
            .insert("per:origin", Person, List, &[Nationality, Country, Gpe])
            .insert("per:date_of_death", Person, Single, &[Date])
            .insert("per:country_of_death", Person, Single, &[Country, Gpe])
            .insert("per:stateorprovince_of_death", Person, Single, &[StateOrProvince, Gpe])
            .insert("per:city_of_death", Person, Single, &[City, Gpe])
            .insert("per:cause_of_death", Person, Single, &[CauseOfDeath, Misc])
            .insert("per:countries_of_residence", Person, List, &[Country, Gpe])
            .insert("per:statesorprovinces_of_residence", Person, List, &[StateOrProvince, Gpe])
            .insert("per:cities_of_residence", Person, List, &[City, Gpe])
            .insert("per:schools_attended", Person, List, &[Organization])
            .insert("per:title", Person, List, &[Title])
            .insert("per:employee_or_member_of", Person, List, &[Organization, Gpe])
            .insert("per:religion", Person, Single, &[Religion])
            .insert("per:spouse", Person, List, &[Person])
            .insert("per:children", Person, List, &[Person])
            .insert("per:parents", Person, List, &[Person])
            .insert("per:siblings", Person, List, &[Person])
            .insert("per:other_family", Person, List, &[Person])
            .insert("per:charges", Person, List, &[CriminalCharge, Misc]);

        t.insert(ORG_ALTERNATE_NAMES, Organization, List, &[Organization, Misc])
            .insert(
                "org:political_religious_affiliation",
                Organization,
                List,
                &[Ideology, Religion, Organization],
            )
            .insert("org:top_members_employees", Organization, List, &[Person])
            .insert("org:number_of_employees_members", Organization, Single, &[Number])
            .insert("org:members", Organization, List, &[Organization, Gpe])
            .insert("org:member_of", Organization, List, &[Organization])
            .insert("org:subsidiaries", Organization, List, &[Organization])
            .insert("org:parents", Organization, List, &[Organization, Gpe])
            .insert("org:founded_by", Organization, List, &[Person, Organization])
            .insert("org:date_founded", Organization, Single, &[Date])
            .insert("org:date_dissolved", Organization, Single, &[Date])
            .insert("org:country_of_headquarters", Organization, Single, &[Country, Gpe])
            .insert(
                "org:stateorprovince_of_headquarters",
                Organization,
                Single,
                &[StateOrProvince, Gpe],
            )
            .insert("org:city_of_headquarters", Organization, Single, &[City, Gpe])
            .insert("org:shareholders", Organization, List, &[Person, Organization])
            .insert("org:website", Organization, Single, &[Url]);

        // Unconstrained place slots accept any place type.
        for info in t.relations.values_mut() {
            if info.value_types.iter().all(|ty| ty.is_place()) && !info.value_types.is_empty() {
                for ty in PLACES {
                    if !info.value_types.contains(ty) {
                        info.value_types.push(*ty);
                    }
                }
            }
        }

        t.declare_inverse("per:parents", "per:children")
            .declare_inverse("per:siblings", "per:siblings")
            .declare_inverse("per:spouse", "per:spouse")
            .declare_inverse("per:other_family", "per:other_family")
            .declare_inverse("org:subsidiaries", "org:parents")
            .declare_inverse("org:members", "org:member_of");

        t.declare_transitive(PER_ALTERNATE_NAMES)
            .declare_transitive(ORG_ALTERNATE_NAMES);

        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kbp_inventory_size() {
        let t = RelationTable::kbp();
        assert_eq!(t.len(), 41);
        assert!(t.is_official("per:date_of_birth"));
        assert!(!t.is_official("per:favourite_colour"));
    }

    #[test]
    fn inverses_are_bidirectional() {
        let t = RelationTable::kbp();
        assert_eq!(t.inverse_of("per:parents"), Some("per:children"));
        assert_eq!(t.inverse_of("per:children"), Some("per:parents"));
        assert_eq!(t.inverse_of("per:spouse"), Some("per:spouse"));
        assert_eq!(t.inverse_of("org:member_of"), Some("org:members"));
        assert_eq!(t.inverse_of("per:title"), None);
    }

    #[test]
    fn single_valued_slots() {
        let t = RelationTable::kbp();
        assert!(t.is_single_valued("per:date_of_birth"));
        assert!(t.is_single_valued("org:city_of_headquarters"));
        assert!(!t.is_single_valued("per:children"));
        assert!(!t.is_single_valued("not:a_relation"));
    }

    #[test]
    fn place_slots_accept_any_place_type() {
        let t = RelationTable::kbp();
        let hq = t.get("org:city_of_headquarters").unwrap();
        assert!(hq.accepts_value_type(EntityType::City));
        assert!(hq.accepts_value_type(EntityType::Location));
        assert!(!hq.accepts_value_type(EntityType::Person));
    }

    #[test]
    fn alternate_names_only_transitive_relations() {
        let t = RelationTable::kbp();
        assert!(t.is_transitive(PER_ALTERNATE_NAMES));
        assert!(t.is_transitive(ORG_ALTERNATE_NAMES));
        assert!(!t.is_transitive("per:parents"));
        assert_eq!(
            RelationTable::alternate_names_for(EntityType::Organization),
            Some(ORG_ALTERNATE_NAMES)
        );
        assert_eq!(RelationTable::alternate_names_for(EntityType::City), None);
    }
}
