//! Direct-entailment strategies.

use std::collections::HashMap;

use crate::entity::{Entity, EntityType};
use crate::fact::Fact;
use crate::oracle::normalize_name;

use super::strategy::{Entailment, EntailmentStrategy};

/// Where a place sits in the administrative hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Lookup table from city and state names to their enclosing regions.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    cities: HashMap<String, Placement>,
    states: HashMap<String, String>,
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(mut self, city: &str, state: Option<&str>, country: &str) -> Self {
        self.cities.insert(
            normalize_name(city),
            Placement {
                state: state.map(str::to_string),
                country: Some(country.to_string()),
            },
        );
        if let Some(state) = state {
            self.states
                .entry(normalize_name(state))
                .or_insert_with(|| country.to_string());
        }
        self
    }

    pub fn with_state(mut self, state: &str, country: &str) -> Self {
        self.states.insert(normalize_name(state), country.to_string());
        self
    }

    pub fn city(&self, name: &str) -> Option<&Placement> {
        self.cities.get(&normalize_name(name))
    }

    pub fn country_of_state(&self, name: &str) -> Option<&str> {
        self.states.get(&normalize_name(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cities.len() + self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty() && self.states.is_empty()
    }
}

/// The city/state/country slot triple for one kind of location.
struct GeoSlots {
    city: &'static str,
    state: &'static str,
    country: &'static str,
}

const GEO_SLOTS: &[GeoSlots] = &[
    GeoSlots {
        city: "per:city_of_birth",
        state: "per:stateorprovince_of_birth",
        country: "per:country_of_birth",
    },
    GeoSlots {
        city: "per:city_of_death",
        state: "per:stateorprovince_of_death",
        country: "per:country_of_death",
    },
    GeoSlots {
        city: "per:cities_of_residence",
        state: "per:statesorprovinces_of_residence",
        country: "per:countries_of_residence",
    },
    GeoSlots {
        city: "org:city_of_headquarters",
        state: "org:stateorprovince_of_headquarters",
        country: "org:country_of_headquarters",
    },
];

/// A city implies its state and country; a state implies its country.
#[derive(Debug, Clone)]
pub struct GeoEntailment {
    gazetteer: Gazetteer,
    weight: f64,
}

impl GeoEntailment {
    pub fn new(gazetteer: Gazetteer) -> Self {
        Self {
            gazetteer,
            weight: 1.0,
        }
    }

    /// Confidence multiplier for the entailed facts.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl EntailmentStrategy for GeoEntailment {
    fn entailments(&self, _pivot: &Entity, antecedent: &Fact) -> Vec<Entailment> {
        let mut out = Vec::new();
        for slots in GEO_SLOTS {
            if antecedent.relation == slots.city {
                if let Some(place) = self.gazetteer.city(&antecedent.value) {
                    if let Some(state) = &place.state {
                        out.push(
                            Entailment::new(slots.state, state.clone(), self.weight)
                                .with_value_type(EntityType::StateOrProvince),
                        );
                    }
                    if let Some(country) = &place.country {
                        out.push(
                            Entailment::new(slots.country, country.clone(), self.weight)
                                .with_value_type(EntityType::Country),
                        );
                    }
                }
            } else if antecedent.relation == slots.state {
                if let Some(country) = self.gazetteer.country_of_state(&antecedent.value) {
                    out.push(
                        Entailment::new(slots.country, country, self.weight)
                            .with_value_type(EntityType::Country),
                    );
                }
            }
        }
        out
    }
}

/// Table-driven implication between relations on the same value.
#[derive(Debug, Clone, Default)]
pub struct ImpliedRelation {
    implications: Vec<(String, String, f64)>,
}

impl ImpliedRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// `from(pivot, v)` implies `to(pivot, v)` with confidence `weight`.
    pub fn with_implication(mut self, from: &str, to: &str, weight: f64) -> Self {
        self.implications
            .push((from.to_string(), to.to_string(), weight));
        self
    }

    /// Birth and death places are also (weaker) evidence of residence.
    pub fn kbp() -> Self {
        Self::new()
            .with_implication("per:city_of_death", "per:cities_of_residence", 0.5)
            .with_implication(
                "per:stateorprovince_of_death",
                "per:statesorprovinces_of_residence",
                0.5,
            )
            .with_implication("per:country_of_death", "per:countries_of_residence", 0.5)
            .with_implication("per:country_of_birth", "per:origin", 0.5)
    }
}

impl EntailmentStrategy for ImpliedRelation {
    fn entailments(&self, _pivot: &Entity, antecedent: &Fact) -> Vec<Entailment> {
        self.implications
            .iter()
            .filter(|(from, _, _)| *from == antecedent.relation)
            .map(|(_, to, weight)| {
                let e = Entailment::new(to.clone(), antecedent.value.clone(), *weight);
                match antecedent.value_type {
                    Some(ty) => e.with_value_type(ty),
                    None => e,
                }
            })
            .collect()
    }
}
