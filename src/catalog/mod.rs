// =============================================================================
// CATALOG — Les hiérarchies concrètes
// =============================================================================
//
// Deux hiérarchies isomorphes, décrites avec les briques de core/ :
//
//   company  → Company → Department → Team → Employee   (quatre niveaux)
//   garage   → Mechanic → Car → Owner                   (trois niveaux)
//
// Chacune fournit son Schema, sa table de relations (construite et validée
// une fois pour toutes), ses scopes nommés et ses attributs dérivés.
//
// =============================================================================

pub mod company;
pub mod garage;

pub use company::CompanyCatalog;
pub use garage::GarageCatalog;

use crate::config::TraversalConfig;
use crate::core::query::Query;
use crate::core::relations::RelationshipTable;
use crate::core::resolve::Resolver;
use crate::core::schema::{RelationPath, Schema};
use crate::core::scope::Filter;
use crate::core::storage::Storage;
use crate::core::validate::validate_schema;
use crate::error::ConfigError;

/// Ce que toute hiérarchie expose : son schéma, ses relations et sa configuration.
pub trait Hierarchy {
    fn schema(&self) -> &Schema;

    fn relations(&self) -> &RelationshipTable;

    fn config(&self) -> &TraversalConfig;

    /// Un resolver qui partage la configuration de la hiérarchie.
    fn resolver<'s, S: Storage + ?Sized>(&self, storage: &'s S) -> Resolver<'s, S>
    where
        Self: Sized,
    {
        Resolver::new(storage, self.config().clone())
    }

    /// Le chemin de la relation (source → cible), orienté ancêtre → descendant.
    fn path(&self, source: &str, target: &str) -> Result<&RelationPath, ConfigError> {
        self.relations().path(source, target)
    }

    /// `SELECT * FROM <table de entity> t0`
    fn query(&self, entity: &str) -> Result<Query, ConfigError> {
        self.schema().require_node(entity)?;
        Ok(Query::from(entity, "t0"))
    }

    /// Applique un filtre (ou un scope nommé) à une requête.
    fn scoped(&self, query: Query, filter: &Filter) -> Result<Query, ConfigError> {
        filter.apply(self.schema(), self.config(), query)
    }
}

/// Valide un schéma fraîchement construit ; la première faute suffit.
fn checked(schema: Schema) -> Result<Schema, ConfigError> {
    match validate_schema(&schema) {
        Ok(()) => Ok(schema),
        Err(errors) => Err(errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::InvalidSetting(format!("schéma '{}' invalide", schema.name)))),
    }
}
