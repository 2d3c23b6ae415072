// =============================================================================
// GARAGE — Mechanic → Car → Owner
// =============================================================================
//
// La petite sœur à trois niveaux. Un Mechanic atteint ses Owner à travers
// ses Car (has-many-through), un Owner remonte à son Mechanic à travers sa
// Car (has-one-through).
//
// =============================================================================

use super::{checked, Hierarchy};
use crate::config::TraversalConfig;
use crate::core::instance::Row;
use crate::core::relations::RelationshipTable;
use crate::core::resolve::Resolver;
use crate::core::schema::Schema;
use crate::core::scope::Filter;
use crate::core::storage::Storage;
use crate::core::typeside::BaseType;
use crate::error::{ConfigError, Result};

pub const MECHANIC: &str = "Mechanic";
pub const CAR: &str = "Car";
pub const OWNER: &str = "Owner";

pub fn garage_schema() -> Schema {
    let mut s = Schema::new("Garage");
    s.add_node(MECHANIC, "mechanics")
        .add_node(CAR, "cars")
        .add_node(OWNER, "owners")
        .add_attribute("name", MECHANIC, BaseType::String)
        .add_attribute("model", CAR, BaseType::String)
        .add_fk("mechanic_id", CAR, MECHANIC, "id")
        .add_attribute("name", OWNER, BaseType::String)
        .add_fk("car_id", OWNER, CAR, "id");
    s
}

pub fn garage_relations(s: &Schema) -> Result<RelationshipTable, ConfigError> {
    let mut t = RelationshipTable::new();
    t.has_many(s, "cars", MECHANIC, &[CAR])?
        .has_many(s, "owners", MECHANIC, &[CAR, OWNER])?
        .belongs_to(s, "mechanic", CAR, &[MECHANIC])?
        .has_many(s, "owners", CAR, &[OWNER])?
        .belongs_to(s, "car", OWNER, &[CAR])?
        .belongs_to(s, "mechanic", OWNER, &[CAR, MECHANIC])?;
    Ok(t)
}

#[derive(Debug, Clone)]
pub struct GarageCatalog {
    schema: Schema,
    relations: RelationshipTable,
    config: TraversalConfig,
}

impl Hierarchy for GarageCatalog {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn relations(&self) -> &RelationshipTable {
        &self.relations
    }

    fn config(&self) -> &TraversalConfig {
        &self.config
    }
}

impl GarageCatalog {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(TraversalConfig::default())
    }

    pub fn with_config(config: TraversalConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let schema = checked(garage_schema())?;
        let relations = garage_relations(&schema)?;
        Ok(GarageCatalog { schema, relations, config })
    }

    /// Tous les propriétaires des voitures d'un mécanicien.
    pub fn owners_of<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, mechanic: &Row) -> Result<Vec<Row>> {
        resolver.resolve_descendants(mechanic, self.path(MECHANIC, OWNER)?)
    }

    /// Le mécanicien d'un propriétaire, à travers sa voiture.
    pub fn mechanic_of<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, owner: &Row) -> Result<Option<Row>> {
        resolver.resolve_ancestor(owner, self.path(OWNER, MECHANIC)?)
    }

    pub fn owner_count<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, mechanic: &Row) -> Result<u64> {
        resolver.descendant_count(mechanic, self.path(MECHANIC, OWNER)?)
    }

    /// Mécaniciens ayant au moins un propriétaire dont le nom contient `name`.
    pub fn mechanic_with_owner_named(&self, name: &str) -> Result<Filter, ConfigError> {
        let path = self.path(MECHANIC, OWNER)?.clone();
        Ok(Filter::has(path, Filter::contains("name", name)))
    }
}
