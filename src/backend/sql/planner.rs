// =============================================================================
// SQL PLANNER — Traduction des Query en SQL
// =============================================================================
//
// Une Query se traduit presque mot pour mot. Chaque alias de l'arbre devient
// un alias SQL, chaque sous-requête reste une sous-requête corrélée :
//
// ┌──────────────────────────────────────────────────────────────────┐
// │ Query (forme Exists, Company → Employee) :                       │
// │   from Employee t0                                               │
// │   where Exists(Team t1 where t1.id = t0.team_id                  │
// │           and Exists(Department t2 where t2.id = t1.department_id│
// │                        and t2.company_id = 1))                   │
// │                                                                  │
// │ SQL :                                                            │
// │   SELECT t0.* FROM "employees" t0                                │
// │   WHERE EXISTS (SELECT 1 FROM "teams" t1                         │
// │     WHERE t1."id" = t0."team_id"                                 │
// │     AND EXISTS (SELECT 1 FROM "departments" t2                   │
// │       WHERE t2."id" = t1."department_id"                         │
// │       AND t2."company_id" = 1))                                  │
// └──────────────────────────────────────────────────────────────────┘
//
// Les entités sont traduites en tables via le Schema ; une entité inconnue
// est une ConfigError.
//
// =============================================================================

use crate::backend::sql::SqlDialect;
use crate::core::query::{ColumnRef, CompOp, OrderKey, Predicate, Projection, Query};
use crate::core::schema::Schema;
use crate::core::storage::Aggregate;
use crate::error::ConfigError;

/// Résultat de la planification SQL
#[derive(Debug, Clone)]
pub struct SqlPlan {
    /// La requête SQL générée
    pub sql: String,
    /// Nombre de JOINs, sous-requêtes comprises
    pub join_count: usize,
    /// Nombre de sous-requêtes (IN, EXISTS, COUNT)
    pub subquery_count: usize,
}

impl std::fmt::Display for SqlPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.sql)?;
        write!(
            f,
            "-- {} JOINs, {} sous-requêtes",
            self.join_count, self.subquery_count
        )
    }
}

/// Planificateur SQL : traduit une Query en SQL pour un dialecte.
pub struct SqlPlanner<'a, D: SqlDialect> {
    dialect: &'a D,
    schema: &'a Schema,
}

impl<'a, D: SqlDialect> SqlPlanner<'a, D> {
    pub fn new(dialect: &'a D, schema: &'a Schema) -> Self {
        SqlPlanner { dialect, schema }
    }

    /// `SELECT ... FROM ...` rendant les lignes (ou la colonne) de la requête.
    pub fn plan(&self, query: &Query) -> Result<SqlPlan, ConfigError> {
        let select = self.projection(query);
        let sql = self.render_select(query, &select, None)?;
        Ok(self.wrap(sql, query))
    }

    /// Agrégat sur toute la requête.
    pub fn plan_aggregate(&self, query: &Query, aggregate: &Aggregate) -> Result<SqlPlan, ConfigError> {
        let sql = if query.distinct || query.limit.is_some() {
            // DISTINCT et LIMIT s'appliquent AVANT l'agrégat
            let inner = self.render_select(query, &self.projection(query), None)?;
            format!("SELECT {} FROM ({}) q", self.aggregate_expr("q", aggregate), inner)
        } else {
            let mut unordered = query.clone();
            unordered.order_by.clear();
            let select = self.aggregate_expr(&query.alias, aggregate);
            self.render_select(&unordered, &select, None)?
        };
        Ok(self.wrap(sql, query))
    }

    /// Agrégat par valeur de `group` : deux colonnes, `group_key` et l'agrégat.
    pub fn plan_grouped(&self, query: &Query, group: &ColumnRef, aggregate: &Aggregate) -> Result<SqlPlan, ConfigError> {
        let group_sql = self.column(group);
        let sql = if query.distinct || query.limit.is_some() {
            // DISTINCT et LIMIT s'appliquent AVANT le regroupement
            let select = format!("{} AS group_key, {}", group_sql, self.projection(query));
            let inner = self.render_select(query, &select, None)?;
            format!(
                "SELECT q.group_key, {} FROM ({}) q GROUP BY q.group_key",
                self.aggregate_expr("q", aggregate),
                inner
            )
        } else {
            let mut unordered = query.clone();
            unordered.order_by.clear();
            let select = format!(
                "{} AS group_key, {}",
                group_sql,
                self.aggregate_expr(&query.alias, aggregate)
            );
            self.render_select(&unordered, &select, Some(&group_sql))?
        };
        Ok(self.wrap(sql, query))
    }

    fn wrap(&self, sql: String, query: &Query) -> SqlPlan {
        SqlPlan {
            sql,
            join_count: count_joins(query),
            subquery_count: query.subquery_count(),
        }
    }

    fn projection(&self, query: &Query) -> String {
        match &query.projection {
            Projection::All => format!("{}.*", query.alias),
            Projection::Column(column) => self.column(column),
        }
    }

    fn aggregate_expr(&self, alias: &str, aggregate: &Aggregate) -> String {
        match aggregate {
            Aggregate::Count => "COUNT(*)".to_string(),
            Aggregate::Avg(field) => format!("AVG({}.{})", alias, self.dialect.quote_identifier(field)),
            Aggregate::Sum(field) => format!("SUM({}.{})", alias, self.dialect.quote_identifier(field)),
        }
    }

    fn table(&self, entity: &str) -> Result<String, ConfigError> {
        let table = self
            .schema
            .table_of(entity)
            .ok_or_else(|| ConfigError::UnknownEntity(entity.to_string()))?;
        Ok(self.dialect.table_name(table))
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", column.alias, self.dialect.quote_identifier(&column.field))
    }

    fn render_select(&self, query: &Query, select: &str, group_by: Option<&str>) -> Result<String, ConfigError> {
        let mut sql = format!(
            "SELECT {}{} FROM {} {}",
            if query.distinct { "DISTINCT " } else { "" },
            select,
            self.table(&query.entity)?,
            query.alias
        );

        for join in &query.joins {
            sql.push_str(&format!(
                " JOIN {} {} ON {} = {}",
                self.table(&join.entity)?,
                join.alias,
                self.column(&join.left),
                self.column(&join.right)
            ));
        }

        if query.predicate != Predicate::Always {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(&query.predicate)?);
        }

        if let Some(group) = group_by {
            sql.push_str(&format!(" GROUP BY {}", group));
        }

        if !query.order_by.is_empty() {
            let keys = query
                .order_by
                .iter()
                .map(|o| -> Result<String, ConfigError> {
                    let key = match &o.key {
                        OrderKey::Column(column) => self.column(column),
                        OrderKey::Count(sub) => format!("({})", self.render_select(sub, "COUNT(*)", None)?),
                    };
                    Ok(format!("{} {}", key, o.direction))
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    fn predicate(&self, predicate: &Predicate) -> Result<String, ConfigError> {
        Ok(match predicate {
            Predicate::Always => "TRUE".to_string(),
            Predicate::Compare { column, op, value } => format!(
                "{} {} {}",
                self.column(column),
                op_to_sql(*op),
                self.dialect.literal(value)
            ),
            Predicate::ColumnsEqual { left, right } => {
                format!("{} = {}", self.column(left), self.column(right))
            }
            Predicate::Between { column, low, high } => format!(
                "{} BETWEEN {} AND {}",
                self.column(column),
                self.dialect.literal(low),
                self.dialect.literal(high)
            ),
            Predicate::Like {
                column,
                pattern,
                case_sensitive,
            } => self.dialect.like(
                &self.column(column),
                &self.dialect.string_literal(pattern),
                *case_sensitive,
            ),
            Predicate::IsNull(column) => format!("{} IS NULL", self.column(column)),
            Predicate::InSubquery { column, subquery } => format!(
                "{} IN ({})",
                self.column(column),
                self.render_select(subquery, &self.projection(subquery), None)?
            ),
            Predicate::Exists(sub) => format!("EXISTS ({})", self.render_select(sub, "1", None)?),
            Predicate::CountCompare { subquery, op, threshold } => format!(
                "({}) {} {}",
                self.render_select(subquery, "COUNT(*)", None)?,
                op_to_sql(*op),
                threshold
            ),
            Predicate::And(parts) if parts.is_empty() => "TRUE".to_string(),
            Predicate::Or(parts) if parts.is_empty() => "FALSE".to_string(),
            Predicate::And(parts) => self.join_parts(parts, " AND ")?,
            Predicate::Or(parts) => format!("({})", self.join_parts(parts, " OR ")?),
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner)?),
        })
    }

    fn join_parts(&self, parts: &[Predicate], separator: &str) -> Result<String, ConfigError> {
        let rendered = parts
            .iter()
            .map(|p| -> Result<String, ConfigError> {
                let sql = self.predicate(p)?;
                Ok(match p {
                    Predicate::And(_) => format!("({})", sql),
                    _ => sql,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(rendered.join(separator))
    }
}

fn op_to_sql(op: CompOp) -> &'static str {
    match op {
        CompOp::Eq => "=",
        CompOp::Neq => "<>",
        CompOp::Lt => "<",
        CompOp::Gt => ">",
        CompOp::Lte => "<=",
        CompOp::Gte => ">=",
    }
}

/// JOINs de la requête et de toutes ses sous-requêtes
fn count_joins(query: &Query) -> usize {
    let in_order: usize = query
        .order_by
        .iter()
        .map(|o| match &o.key {
            OrderKey::Count(sub) => count_joins(sub),
            OrderKey::Column(_) => 0,
        })
        .sum();
    query.joins.len() + joins_in_predicate(&query.predicate) + in_order
}

fn joins_in_predicate(predicate: &Predicate) -> usize {
    match predicate {
        Predicate::InSubquery { subquery, .. }
        | Predicate::Exists(subquery)
        | Predicate::CountCompare { subquery, .. } => count_joins(subquery),
        Predicate::And(ps) | Predicate::Or(ps) => ps.iter().map(joins_in_predicate).sum(),
        Predicate::Not(p) => joins_in_predicate(p),
        _ => 0,
    }
}
