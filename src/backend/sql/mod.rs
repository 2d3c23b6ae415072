// =============================================================================
// BACKEND SQL — Rendu des Query en SQL
// =============================================================================
//
// Ce module traduit une Query composée par le résolveur ou par les scopes
// en texte SQL, pour qu'une vraie base l'exécute :
//
//   Query     → SELECT ... FROM ... JOIN ... WHERE ... ORDER BY ... LIMIT
//   Aggregate → SELECT COUNT(*) / AVG(...) / SUM(...) [GROUP BY ...]
//
// Le trait SqlDialect porte les différences entre moteurs : citation des
// identifiants, nom complet des tables, littéraux, et surtout le filtrage
// par motif insensible à la casse :
//
//   PostgreSQL  t0."skills" ILIKE '%rust%' ESCAPE '\'
//   Snowflake   t0."skills" ILIKE '%rust%' ESCAPE '\\'
//   Trino       lower(t0."skills") LIKE lower('%rust%') ESCAPE '\'
//
// =============================================================================

pub mod planner;

use crate::backend::{Backend, Statement};
use crate::core::query::{ColumnRef, Query};
use crate::core::schema::Schema;
use crate::core::storage::Aggregate;
use crate::core::typeside::Value;
use crate::error::ConfigError;
use planner::SqlPlanner;

/// Dialecte SQL : ce qui change d'un moteur à l'autre.
pub trait SqlDialect {
    /// Nom du dialecte
    fn dialect_name(&self) -> String;

    /// Quote un identifiant (table, colonne)
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Nom complet d'une table dans le FROM
    fn table_name(&self, table: &str) -> String {
        self.quote_identifier(table)
    }

    /// Littéral chaîne ; l'apostrophe est doublée
    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Clause ESCAPE désignant `\` comme caractère d'échappement des motifs
    fn escape_clause(&self) -> String {
        format!(" ESCAPE {}", self.string_literal("\\"))
    }

    /// `column LIKE pattern`, sensible ou non à la casse
    fn like(&self, column: &str, pattern: &str, case_sensitive: bool) -> String {
        let op = if case_sensitive { "LIKE" } else { "ILIKE" };
        format!("{} {} {}{}", column, op, pattern, self.escape_clause())
    }

    /// Littéral SQL d'une Value
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::String(s) => self.string_literal(s),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => format!("{:?}", f),
            Value::Float(_) => "NULL".into(),
            Value::Boolean(true) => "TRUE".into(),
            Value::Boolean(false) => "FALSE".into(),
            Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Value::Null => "NULL".into(),
        }
    }
}

// ─── PostgreSQL ──────────────────────────────────────────────────────────────

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn dialect_name(&self) -> String {
        "PostgreSQL".to_string()
    }
}

// ─── Snowflake ───────────────────────────────────────────────────────────────
//
// Dans un littéral Snowflake, `\` est lui-même un caractère d'échappement :
// il faut le doubler.

pub struct SnowflakeDialect;

impl SqlDialect for SnowflakeDialect {
    fn dialect_name(&self) -> String {
        "Snowflake".to_string()
    }

    fn string_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
    }
}

// ─── Trino (ex-Presto) ──────────────────────────────────────────────────────
//
// Trino est un moteur de requêtes fédérées : il ne stocke pas de données
// lui-même mais requête des catalogues (Hive, Iceberg, PostgreSQL...).
//
// Particularités :
//   - Pas d'ILIKE : on compare lower(col) à lower(motif)
//   - Les tables sont qualifiées : catalog.schema.table
//

pub struct TrinoDialect {
    /// Catalogue Trino (ex: "hive", "iceberg", "postgresql")
    pub catalog: String,
    /// Schéma Trino dans le catalogue (ex: "default", "public")
    pub schema_name: String,
}

impl TrinoDialect {
    pub fn new(catalog: &str, schema_name: &str) -> Self {
        TrinoDialect {
            catalog: catalog.to_string(),
            schema_name: schema_name.to_string(),
        }
    }
}

impl SqlDialect for TrinoDialect {
    fn dialect_name(&self) -> String {
        "Trino".to_string()
    }

    fn table_name(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog, self.schema_name, self.quote_identifier(table))
    }

    fn like(&self, column: &str, pattern: &str, case_sensitive: bool) -> String {
        if case_sensitive {
            format!("{} LIKE {}{}", column, pattern, self.escape_clause())
        } else {
            format!("lower({}) LIKE lower({}){}", column, pattern, self.escape_clause())
        }
    }
}

// ─── Backend SQL générique ───────────────────────────────────────────────────

/// Backend SQL générique, paramétré par un dialecte.
///
/// La sensibilité à la casse des motifs est portée par chaque `Predicate::Like`,
/// fixée par `TraversalConfig` quand le filtre est compilé.
pub struct SqlBackend<D: SqlDialect> {
    pub dialect: D,
}

impl<D: SqlDialect> SqlBackend<D> {
    pub fn new(dialect: D) -> Self {
        SqlBackend { dialect }
    }

    pub fn planner<'a>(&'a self, schema: &'a Schema) -> SqlPlanner<'a, D> {
        SqlPlanner::new(&self.dialect, schema)
    }
}

impl<D: SqlDialect> Backend for SqlBackend<D> {
    fn render_query(&self, schema: &Schema, query: &Query) -> Result<Statement, ConfigError> {
        Ok(Statement::Sql(self.planner(schema).plan(query)?.sql))
    }

    fn render_aggregate(&self, schema: &Schema, query: &Query, aggregate: &Aggregate) -> Result<Statement, ConfigError> {
        Ok(Statement::Sql(self.planner(schema).plan_aggregate(query, aggregate)?.sql))
    }

    fn render_grouped(
        &self,
        schema: &Schema,
        query: &Query,
        group: &ColumnRef,
        aggregate: &Aggregate,
    ) -> Result<Statement, ConfigError> {
        Ok(Statement::Sql(
            self.planner(schema).plan_grouped(query, group, aggregate)?.sql,
        ))
    }

    fn name(&self) -> String {
        format!("SQL ({})", self.dialect.dialect_name())
    }
}

/// Les trois dialectes, indexés par nom (pour la démo et les outils).
pub fn dialect_by_name(name: &str) -> Option<Box<dyn SqlDialect>> {
    match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Some(Box::new(PostgresDialect)),
        "snowflake" => Some(Box::new(SnowflakeDialect)),
        "trino" => Some(Box::new(TrinoDialect::new("hive", "default"))),
        _ => None,
    }
}

impl<T: SqlDialect + ?Sized> SqlDialect for Box<T> {
    fn dialect_name(&self) -> String {
        (**self).dialect_name()
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }

    fn table_name(&self, table: &str) -> String {
        (**self).table_name(table)
    }

    fn string_literal(&self, text: &str) -> String {
        (**self).string_literal(text)
    }

    fn escape_clause(&self) -> String {
        (**self).escape_clause()
    }

    fn like(&self, column: &str, pattern: &str, case_sensitive: bool) -> String {
        (**self).like(column, pattern, case_sensitive)
    }

    fn literal(&self, value: &Value) -> String {
        (**self).literal(value)
    }
}
