// =============================================================================
// EVAL — Exécution des Query en mémoire (MemoryStore)
// =============================================================================
//
// Le MemoryStore implémente le trait Storage directement sur une Instance,
// sans base de données. C'est le stockage de référence des tests, et la
// sémantique qu'il applique est celle du SQL que rend backend::sql :
//
//   1. Pour l'entité de base, itérer sur toutes les lignes
//   2. Pour chaque JOIN, étendre chaque tuple avec les lignes qui vérifient
//      la condition de jointure (INNER JOIN)
//   3. Évaluer le WHERE en logique à trois valeurs (Null → inconnu)
//   4. Trier, dédupliquer (DISTINCT), limiter, projeter
//
// Les sous-requêtes (IN, EXISTS, COUNT) sont évaluées dans l'environnement
// du tuple courant : leurs colonnes peuvent référencer les alias de la
// requête englobante, exactement comme une sous-requête corrélée SQL.
//
// Une requête qui cite un alias, une entité ou une colonne inconnus est
// rejetée AVANT toute exécution avec StorageError::MalformedQuery.
//
// =============================================================================

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::instance::{Instance, Row, RowId};
use super::query::{ColumnRef, Join, OrderKey, Predicate, Projection, Query, SortDirection};
use super::schema::{Schema, PRIMARY_KEY};
use super::storage::{Aggregate, Storage};
use super::typeside::Value;
use crate::error::StorageError;

/// Une liaison alias → (entité, ligne)
#[derive(Debug, Clone, Copy)]
struct Binding<'q> {
    alias: &'q str,
    entity: &'q str,
    row: RowId,
}

/// Environnement d'évaluation : les liaisons visibles, la plus interne en dernier.
type Env<'q> = Vec<Binding<'q>>;

/// Stockage en mémoire : un Schema et une Instance.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: Schema,
    instance: Instance,
}

impl MemoryStore {
    pub fn new(schema: Schema, instance: Instance) -> Self {
        MemoryStore { schema, instance }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }

    // ─── Vérification statique ─────────────────────────────────────────────

    fn check_query<'q>(&self, query: &'q Query, outer: &[(&'q str, &'q str)]) -> Result<(), StorageError> {
        if self.schema.node(&query.entity).is_none() {
            return Err(malformed(format!("entité inconnue '{}'", query.entity)));
        }
        let mut scope: Vec<(&str, &str)> = outer.to_vec();
        scope.push((query.alias.as_str(), query.entity.as_str()));
        for join in &query.joins {
            if self.schema.node(&join.entity).is_none() {
                return Err(malformed(format!("entité jointe inconnue '{}'", join.entity)));
            }
            scope.push((join.alias.as_str(), join.entity.as_str()));
        }

        for join in &query.joins {
            self.check_column(&join.left, &scope)?;
            self.check_column(&join.right, &scope)?;
        }
        self.check_predicate(&query.predicate, &scope)?;
        if let Projection::Column(column) = &query.projection {
            self.check_column(column, &scope)?;
        }
        for order in &query.order_by {
            match &order.key {
                OrderKey::Column(column) => self.check_column(column, &scope)?,
                OrderKey::Count(sub) => self.check_query(sub, &scope)?,
            }
        }
        Ok(())
    }

    fn check_predicate<'q>(&self, predicate: &'q Predicate, scope: &[(&'q str, &'q str)]) -> Result<(), StorageError> {
        match predicate {
            Predicate::Always => Ok(()),
            Predicate::Compare { column, .. }
            | Predicate::Between { column, .. }
            | Predicate::Like { column, .. }
            | Predicate::IsNull(column) => self.check_column(column, scope),
            Predicate::ColumnsEqual { left, right } => {
                self.check_column(left, scope)?;
                self.check_column(right, scope)
            }
            Predicate::InSubquery { column, subquery } => {
                self.check_column(column, scope)?;
                if !matches!(subquery.projection, Projection::Column(_)) {
                    return Err(malformed("IN attend une sous-requête à une colonne".into()));
                }
                self.check_query(subquery, scope)
            }
            Predicate::Exists(sub) | Predicate::CountCompare { subquery: sub, .. } => {
                self.check_query(sub, scope)
            }
            Predicate::And(parts) | Predicate::Or(parts) => parts
                .iter()
                .try_for_each(|p| self.check_predicate(p, scope)),
            Predicate::Not(inner) => self.check_predicate(inner, scope),
        }
    }

    fn check_column(&self, column: &ColumnRef, scope: &[(&str, &str)]) -> Result<(), StorageError> {
        let entity = scope
            .iter()
            .rev()
            .find(|(alias, _)| *alias == column.alias)
            .map(|(_, entity)| *entity)
            .ok_or_else(|| malformed(format!("alias inconnu '{}'", column.alias)))?;
        if self.schema.has_field(entity, &column.field) {
            Ok(())
        } else {
            Err(malformed(format!(
                "colonne inconnue {} (entité {})",
                column, entity
            )))
        }
    }

    // ─── Évaluation ────────────────────────────────────────────────────────

    /// Lit une colonne dans l'environnement (Null si la ligne a disparu).
    fn value_of(&self, column: &ColumnRef, env: &Env<'_>) -> Value {
        env.iter()
            .rev()
            .find(|b| b.alias == column.alias)
            .and_then(|b| {
                self.instance
                    .entity(b.entity)
                    .and_then(|data| data.get_value(b.row, &column.field))
            })
            .unwrap_or(Value::Null)
    }

    /// Tous les tuples de la requête qui vérifient le WHERE, triés et limités.
    /// Chaque tuple est l'environnement externe prolongé des liaisons locales.
    fn select<'q>(&self, query: &'q Query, outer: &Env<'q>) -> Vec<Env<'q>> {
        let base_rows = self
            .instance
            .entity(&query.entity)
            .map(|d| d.row_ids())
            .unwrap_or_default();
        let scanned = base_rows.len();

        let mut tuples: Vec<Env<'q>> = base_rows
            .into_iter()
            .map(|row| {
                let mut env = outer.clone();
                env.push(Binding {
                    alias: &query.alias,
                    entity: &query.entity,
                    row,
                });
                env
            })
            .collect();

        for join in &query.joins {
            tuples = tuples
                .into_iter()
                .flat_map(|env| self.expand_join(join, env))
                .collect();
        }

        let mut matched: Vec<Env<'q>> = tuples
            .into_iter()
            .filter(|env| self.eval_predicate(&query.predicate, env) == Some(true))
            .collect();

        if query.distinct {
            let mut seen = HashSet::new();
            let depth = outer.len();
            matched.retain(|env| match &query.projection {
                Projection::All => seen.insert(ValueKey::Row(env[depth].row)),
                Projection::Column(column) => seen.insert(ValueKey::of(&self.value_of(column, env))),
            });
        }

        if !query.order_by.is_empty() {
            let mut keyed: Vec<(Vec<Value>, Env<'q>)> = matched
                .into_iter()
                .map(|env| (self.sort_keys(query, &env), env))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| compare_keys(query, a, b));
            matched = keyed.into_iter().map(|(_, env)| env).collect();
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        trace!(
            entity = %query.entity,
            alias = %query.alias,
            scanned,
            returned = matched.len(),
            "requête évaluée en mémoire"
        );
        matched
    }

    /// INNER JOIN : prolonge un tuple par chaque ligne qui vérifie `left = right`.
    fn expand_join<'q>(&self, join: &'q Join, env: Env<'q>) -> Vec<Env<'q>> {
        let Some(data) = self.instance.entity(&join.entity) else {
            return Vec::new();
        };

        // Cas courant : `xxx.fk = alias.id` → accès direct par clé primaire
        let (own, other) = if join.right.alias == join.alias {
            (&join.right, &join.left)
        } else {
            (&join.left, &join.right)
        };
        let candidates: Vec<RowId> = if own.field == PRIMARY_KEY && own.alias == join.alias {
            self.value_of(other, &env)
                .as_row_id()
                .filter(|id| data.contains(*id))
                .into_iter()
                .collect()
        } else {
            data.row_ids()
        };

        candidates
            .into_iter()
            .filter_map(|row| {
                let mut extended = env.clone();
                extended.push(Binding {
                    alias: &join.alias,
                    entity: &join.entity,
                    row,
                });
                let l = self.value_of(&join.left, &extended);
                let r = self.value_of(&join.right, &extended);
                (l.sql_cmp(&r) == Some(Ordering::Equal)).then_some(extended)
            })
            .collect()
    }

    /// WHERE en logique à trois valeurs : Some(true), Some(false), None (inconnu).
    fn eval_predicate(&self, predicate: &Predicate, env: &Env<'_>) -> Option<bool> {
        match predicate {
            Predicate::Always => Some(true),
            Predicate::Compare { column, op, value } => self
                .value_of(column, env)
                .sql_cmp(value)
                .map(|ord| op.holds(ord)),
            Predicate::ColumnsEqual { left, right } => self
                .value_of(left, env)
                .sql_cmp(&self.value_of(right, env))
                .map(|ord| ord == Ordering::Equal),
            Predicate::Between { column, low, high } => {
                let v = self.value_of(column, env);
                let above = v.sql_cmp(low).map(|o| o != Ordering::Less);
                let below = v.sql_cmp(high).map(|o| o != Ordering::Greater);
                and3(above, below)
            }
            Predicate::Like {
                column,
                pattern,
                case_sensitive,
            } => match self.value_of(column, env) {
                Value::Null => None,
                Value::String(text) => Some(like_match(&text, pattern, *case_sensitive)),
                other => Some(like_match(&other.to_string(), pattern, *case_sensitive)),
            },
            Predicate::IsNull(column) => Some(self.value_of(column, env).is_null()),
            Predicate::InSubquery { column, subquery } => {
                let needle = self.value_of(column, env);
                if needle.is_null() {
                    return None;
                }
                let Projection::Column(projected) = &subquery.projection else {
                    return Some(false);
                };
                let mut saw_null = false;
                for inner in self.select(subquery, env) {
                    let candidate = self.value_of(projected, &inner);
                    match needle.sql_cmp(&candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        None if candidate.is_null() => saw_null = true,
                        _ => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(false)
                }
            }
            Predicate::Exists(sub) => Some(!self.select(sub, env).is_empty()),
            Predicate::CountCompare { subquery, op, threshold } => {
                let n = self.select(subquery, env).len() as u64;
                Some(op.holds(n.cmp(threshold)))
            }
            Predicate::And(parts) => parts
                .iter()
                .fold(Some(true), |acc, p| match acc {
                    Some(false) => Some(false),
                    _ => and3(acc, self.eval_predicate(p, env)),
                }),
            Predicate::Or(parts) => parts
                .iter()
                .fold(Some(false), |acc, p| match acc {
                    Some(true) => Some(true),
                    _ => or3(acc, self.eval_predicate(p, env)),
                }),
            Predicate::Not(inner) => self.eval_predicate(inner, env).map(|b| !b),
        }
    }

    fn sort_keys(&self, query: &Query, env: &Env<'_>) -> Vec<Value> {
        query
            .order_by
            .iter()
            .map(|o| match &o.key {
                OrderKey::Column(column) => self.value_of(column, env),
                OrderKey::Count(sub) => Value::Integer(self.select(sub, env).len() as i64),
            })
            .collect()
    }

    fn base_rows(&self, query: &Query, tuples: &[Env<'_>]) -> Vec<Row> {
        tuples
            .iter()
            .filter_map(|env| {
                env.iter()
                    .find(|b| b.alias == query.alias)
                    .and_then(|b| self.instance.get(b.entity, b.row))
            })
            .collect()
    }
}

impl Storage for MemoryStore {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, StorageError> {
        self.check_query(query, &[])?;
        let tuples = self.select(query, &Vec::new());
        Ok(self.base_rows(query, &tuples))
    }

    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> Result<Option<f64>, StorageError> {
        self.check_query(query, &[])?;
        self.check_aggregate(query, aggregate)?;
        let tuples = self.select(query, &Vec::new());
        Ok(fold_aggregate(aggregate, tuples.iter().map(|env| {
            self.aggregate_input(query, aggregate, env)
        })))
    }

    fn aggregate_by(
        &self,
        query: &Query,
        group: &ColumnRef,
        aggregate: &Aggregate,
    ) -> Result<HashMap<RowId, f64>, StorageError> {
        self.check_query(query, &[])?;
        self.check_aggregate(query, aggregate)?;
        let scope: Vec<(&str, &str)> = query
            .local_aliases()
            .into_iter()
            .filter_map(|a| query.entity_of(a).map(|e| (a, e)))
            .collect();
        self.check_column(group, &scope)?;

        let mut groups: HashMap<RowId, Vec<Option<f64>>> = HashMap::new();
        for env in self.select(query, &Vec::new()) {
            if let Some(key) = self.value_of(group, &env).as_row_id() {
                groups
                    .entry(key)
                    .or_default()
                    .push(self.aggregate_input(query, aggregate, &env));
            }
        }

        Ok(groups
            .into_iter()
            .filter_map(|(key, inputs)| fold_aggregate(aggregate, inputs.into_iter()).map(|v| (key, v)))
            .collect())
    }
}

impl MemoryStore {
    fn check_aggregate(&self, query: &Query, aggregate: &Aggregate) -> Result<(), StorageError> {
        match aggregate {
            Aggregate::Count => Ok(()),
            Aggregate::Avg(field) | Aggregate::Sum(field) => {
                self.check_column(
                &query.column(field),
                &[(query.alias.as_str(), query.entity.as_str())],
            )
            }
        }
    }

    /// L'entrée d'un agrégat pour un tuple : Some(1) pour COUNT, la valeur
    /// numérique pour AVG/SUM (None si nulle, donc ignorée).
    fn aggregate_input(&self, query: &Query, aggregate: &Aggregate, env: &Env<'_>) -> Option<f64> {
        match aggregate {
            Aggregate::Count => Some(1.0),
            Aggregate::Avg(field) | Aggregate::Sum(field) => {
                self.value_of(&query.column(field), env).as_f64()
            }
        }
    }
}

fn fold_aggregate(aggregate: &Aggregate, inputs: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let values: Vec<f64> = inputs.flatten().collect();
    match aggregate {
        Aggregate::Count => Some(values.len() as f64),
        Aggregate::Sum(_) if values.is_empty() => None,
        Aggregate::Sum(_) => Some(values.iter().sum()),
        Aggregate::Avg(_) if values.is_empty() => None,
        Aggregate::Avg(_) => Some(values.iter().sum::<f64>() / values.len() as f64),
    }
}

fn compare_keys(query: &Query, a: &[Value], b: &[Value]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(&query.order_by) {
        let ord = x.sort_cmp(y);
        let ord = match order.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn malformed(message: String) -> StorageError {
    StorageError::MalformedQuery(message)
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Clé hashable pour DISTINCT (les f64 passent par leur représentation binaire).
#[derive(Debug, PartialEq, Eq, Hash)]
enum ValueKey {
    Row(RowId),
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl ValueKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKey::Null,
            Value::Boolean(b) => ValueKey::Bool(*b),
            Value::Integer(i) => ValueKey::Int(*i),
            Value::Float(f) => ValueKey::Float(f.to_bits()),
            Value::Date(d) => ValueKey::Text(d.to_string()),
            Value::String(s) => ValueKey::Text(s.clone()),
        }
    }
}

/// Un élément de motif LIKE
#[derive(Debug, Clone, Copy, PartialEq)]
enum PatternToken {
    AnyRun,
    AnyOne,
    Literal(char),
}

fn tokenize_pattern(pattern: &str, case_sensitive: bool) -> Vec<PatternToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            '%' => PatternToken::AnyRun,
            '_' => PatternToken::AnyOne,
            '\\' => PatternToken::Literal(chars.next().unwrap_or('\\')),
            other => PatternToken::Literal(other),
        };
        tokens.push(match token {
            PatternToken::Literal(l) if !case_sensitive => PatternToken::Literal(fold_case(l)),
            t => t,
        });
    }
    tokens
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Filtrage LIKE : `%` (toute suite), `_` (un caractère), `\` (échappement).
///
/// Parcours glouton avec retour arrière sur le dernier `%` rencontré.
pub fn like_match(text: &str, pattern: &str, case_sensitive: bool) -> bool {
    let text: Vec<char> = if case_sensitive {
        text.chars().collect()
    } else {
        text.chars().map(fold_case).collect()
    };
    let tokens = tokenize_pattern(pattern, case_sensitive);

    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(PatternToken::AnyRun) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(PatternToken::AnyOne) => {
                t += 1;
                p += 1;
            }
            Some(PatternToken::Literal(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    backtrack = Some((star_p, star_t + 1));
                    p = star_p + 1;
                    t = star_t + 1;
                }
                None => return false,
            },
        }
    }

    tokens[p.min(tokens.len())..]
        .iter()
        .all(|tok| *tok == PatternToken::AnyRun)
}

/// Échappe un texte utilisateur pour qu'il soit pris littéralement dans un motif.
pub fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::CompOp;
    use crate::core::typeside::BaseType;

    fn employee(name: &str, salary: f64, skills: &str, team: i64) -> [(&'static str, Value); 4] {
        [
            ("name", Value::from(name)),
            ("salary", Value::from(salary)),
            ("skills", Value::from(skills)),
            ("team_id", Value::from(team)),
        ]
    }

    fn team_store() -> MemoryStore {
        let mut s = Schema::new("Teams");
        s.add_node("Team", "teams")
            .add_node("Employee", "employees")
            .add_attribute("name", "Team", BaseType::String)
            .add_attribute("name", "Employee", BaseType::String)
            .add_attribute("salary", "Employee", BaseType::Float)
            .add_attribute("skills", "Employee", BaseType::String)
            .add_fk("team_id", "Employee", "Team", "id");

        let mut inst = Instance::new("Data", &s);
        let core_team = inst.insert("Team", [("name", Value::from("Core"))]).unwrap() as i64;
        let web_team = inst.insert("Team", [("name", Value::from("Web"))]).unwrap() as i64;
        inst.insert("Team", [("name", Value::from("Empty"))]).unwrap();

        inst.insert("Employee", employee("Alice", 5000.0, "go,rust", core_team)).unwrap();
        inst.insert("Employee", employee("Bob", 4000.0, "Python", core_team)).unwrap();
        inst.insert("Employee", employee("Chloé", 6000.0, "TypeScript,RUST", web_team)).unwrap();
        inst.insert("Employee", [
            ("name", Value::from("Dan")),
            ("salary", Value::Null),
            ("skills", Value::Null),
            ("team_id", Value::Null),
        ]).unwrap();

        MemoryStore::new(s, inst)
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().filter_map(|r| r.get_str("name").map(str::to_string)).collect()
    }

    #[test]
    fn test_fetch_all() {
        let store = team_store();
        let rows = store.fetch(&Query::from("Employee", "t0")).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_compare_and_null() {
        let store = team_store();
        let q = Query::from("Employee", "t0")
            .filter(Predicate::compare(ColumnRef::new("t0", "salary"), CompOp::Gte, 5000.0));
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Alice", "Chloé"]);

        // Dan (salaire NULL) n'est ni >= ni < : logique à trois valeurs
        let q = Query::from("Employee", "t0").filter(Predicate::negate(
            Predicate::compare(ColumnRef::new("t0", "salary"), CompOp::Gte, 5000.0),
        ));
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Bob"]);
    }

    #[test]
    fn test_join_many_to_one() {
        let store = team_store();
        let q = Query::from("Employee", "t0")
            .join(Join {
                entity: "Team".into(),
                alias: "t1".into(),
                left: ColumnRef::new("t0", "team_id"),
                right: ColumnRef::new("t1", "id"),
            })
            .filter(Predicate::eq(ColumnRef::new("t1", "name"), "Core"));
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_join_fan_out_duplicates_without_distinct() {
        let store = team_store();
        // Team JOIN Employee : une ligne par employé, donc Core apparaît deux fois
        let q = Query::from("Team", "t0").join(Join {
            entity: "Employee".into(),
            alias: "t1".into(),
            left: ColumnRef::new("t1", "team_id"),
            right: ColumnRef::new("t0", "id"),
        });
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Core", "Core", "Web"]);
        assert_eq!(names(&store.fetch(&q.distinct()).unwrap()), vec!["Core", "Web"]);
    }

    #[test]
    fn test_correlated_exists() {
        let store = team_store();
        let employees = Query::from("Employee", "t1")
            .filter(Predicate::ColumnsEqual {
                left: ColumnRef::new("t1", "team_id"),
                right: ColumnRef::new("t0", "id"),
            })
            .filter(Predicate::Like {
                column: ColumnRef::new("t1", "skills"),
                pattern: "%rust%".into(),
                case_sensitive: false,
            });
        let q = Query::from("Team", "t0").filter(Predicate::Exists(Box::new(employees)));
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Core", "Web"]);
    }

    #[test]
    fn test_count_compare() {
        let store = team_store();
        let members = Query::from("Employee", "t1").filter(Predicate::ColumnsEqual {
            left: ColumnRef::new("t1", "team_id"),
            right: ColumnRef::new("t0", "id"),
        });
        let q = Query::from("Team", "t0").filter(Predicate::CountCompare {
            subquery: Box::new(members),
            op: CompOp::Gte,
            threshold: 2,
        });
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Core"]);
    }

    #[test]
    fn test_in_subquery() {
        let store = team_store();
        let core_ids = Query::from("Team", "t1")
            .filter(Predicate::eq(ColumnRef::new("t1", "name"), "Core"))
            .select(ColumnRef::new("t1", "id"));
        let q = Query::from("Employee", "t0").filter(Predicate::InSubquery {
            column: ColumnRef::new("t0", "team_id"),
            subquery: Box::new(core_ids),
        });
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_order_by_count_desc() {
        let store = team_store();
        let members = Query::from("Employee", "t1").filter(Predicate::ColumnsEqual {
            left: ColumnRef::new("t1", "team_id"),
            right: ColumnRef::new("t0", "id"),
        });
        let q = Query::from("Team", "t0").order_by(OrderKey::Count(Box::new(members)), SortDirection::Desc);
        assert_eq!(names(&store.fetch(&q).unwrap()), vec!["Core", "Web", "Empty"]);
    }

    #[test]
    fn test_aggregates() {
        let store = team_store();
        let all = Query::from("Employee", "t0");
        assert_eq!(store.count(&all).unwrap(), 4);
        // AVG ignore les NULL
        assert_eq!(store.aggregate(&all, &Aggregate::Avg("salary".into())).unwrap(), Some(5000.0));
        assert_eq!(store.aggregate(&all, &Aggregate::Sum("salary".into())).unwrap(), Some(15000.0));

        let none = all.clone().filter(Predicate::eq(ColumnRef::new("t0", "name"), "Nobody"));
        assert_eq!(store.count(&none).unwrap(), 0);
        assert_eq!(store.aggregate(&none, &Aggregate::Avg("salary".into())).unwrap(), None);
    }

    #[test]
    fn test_aggregate_by_group() {
        let store = team_store();
        let all = Query::from("Employee", "t0");
        let counts = store
            .aggregate_by(&all, &ColumnRef::new("t0", "team_id"), &Aggregate::Count)
            .unwrap();
        assert_eq!(counts.get(&1), Some(&2.0));
        assert_eq!(counts.get(&2), Some(&1.0));
        assert_eq!(counts.get(&3), None);

        // La limite s'applique aux lignes avant le regroupement
        let first_two = store
            .aggregate_by(&all.limit(2), &ColumnRef::new("t0", "team_id"), &Aggregate::Count)
            .unwrap();
        assert_eq!(first_two.len(), 1);
        assert_eq!(first_two.get(&1), Some(&2.0));
    }

    #[test]
    fn test_malformed_query() {
        let store = team_store();
        let q = Query::from("Employee", "t0").filter(Predicate::eq(ColumnRef::new("t0", "shoe_size"), 42i64));
        assert!(matches!(store.fetch(&q), Err(StorageError::MalformedQuery(_))));

        let q = Query::from("Employee", "t0").filter(Predicate::eq(ColumnRef::new("t9", "name"), "x"));
        assert!(matches!(store.fetch(&q), Err(StorageError::MalformedQuery(_))));

        assert!(store.fetch(&Query::from("Galaxy", "t0")).is_err());
    }

    #[test]
    fn test_limit_and_first() {
        let store = team_store();
        let q = Query::from("Employee", "t0").order_by(
            OrderKey::Column(ColumnRef::new("t0", "name")),
            SortDirection::Desc,
        );
        let first = store.first(&q).unwrap().unwrap();
        assert_eq!(first.get_str("name"), Some("Dan"));
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("go,rust", "%rust%", false));
        assert!(like_match("TypeScript,RUST", "%rust%", false));
        assert!(!like_match("TypeScript,RUST", "%rust%", true));
        assert!(like_match("abc", "a_c", true));
        assert!(!like_match("abbc", "a_c", true));
        assert!(like_match("100%", "100\\%", true));
        assert!(!like_match("1000", "100\\%", true));
        assert!(like_match("", "%", true));
        assert!(!like_match("", "_", true));
        assert!(like_match("mississippi", "%iss%ppi", true));
    }

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("50%_off"), "50\\%\\_off");
        assert!(like_match("50%_off sale", &format!("{}%", escape_pattern("50%_off")), true));
    }
}
