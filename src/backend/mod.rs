// =============================================================================
// BACKEND — Rendu des requêtes pour une vraie base de données
// =============================================================================
//
// Le résolveur et les scopes produisent des Query. Le MemoryStore les
// exécute directement ; pour une base réelle, un Backend les traduit en
// commandes textuelles que le pilote de la base exécutera :
//   - PostgreSQL
//   - Snowflake
//   - Trino
//
// Le cœur (module core) ne connaît JAMAIS les backends.
//
// =============================================================================

pub mod sql;

use crate::core::query::{ColumnRef, Query};
use crate::core::schema::Schema;
use crate::core::storage::Aggregate;
use crate::error::ConfigError;

/// Un statement généré par un backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Commande SQL (PostgreSQL, Snowflake, Trino)
    Sql(String),
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Sql(s) => write!(f, "{}", s),
        }
    }
}

/// Trait abstrait pour tous les backends de base de données.
///
/// Les trois rendus correspondent aux trois méthodes de `Storage` :
/// lignes, agrégat global, agrégat groupé.
pub trait Backend {
    /// `SELECT` des lignes (ou de la colonne projetée) de la requête.
    fn render_query(&self, schema: &Schema, query: &Query) -> Result<Statement, ConfigError>;

    /// `SELECT COUNT(*) | AVG(..) | SUM(..)` sur toute la requête.
    fn render_aggregate(&self, schema: &Schema, query: &Query, aggregate: &Aggregate) -> Result<Statement, ConfigError>;

    /// Agrégat par valeur de `group` (`GROUP BY`).
    fn render_grouped(
        &self,
        schema: &Schema,
        query: &Query,
        group: &ColumnRef,
        aggregate: &Aggregate,
    ) -> Result<Statement, ConfigError>;

    /// Retourne le nom du backend
    fn name(&self) -> String;
}
