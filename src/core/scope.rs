// =============================================================================
// SCOPE — Filtres composables sur les relations
// =============================================================================
//
// Un Filter est une VALEUR : il porte tous ses paramètres (chemin, motif,
// bornes...) et ne capture rien. On le compile ensuite en Predicate pour
// un alias donné, puis on l'applique à une Query.
//
//   Filter::has(team_employees, Filter::contains("skills", "rust"))
//     & Filter::count(team_employees, CompOp::Gte, 2)
//
//   →  EXISTS (SELECT 1 FROM employees t1
//              WHERE t1.skills LIKE '%rust%' AND t1.team_id = t0.id)
//      AND (SELECT COUNT(*) FROM employees t2 WHERE t2.team_id = t0.id) >= 2
//
// Les filtres vers le bas passent toujours par un EXISTS corrélé (ou un
// COUNT corrélé) : aucune ligne source n'est dupliquée, quel que soit
// l'éventail des niveaux intermédiaires.
//
// La compilation vérifie chaque champ et chaque chemin contre le schéma :
// une faute de configuration est une ConfigError, levée avant toute requête.
//
// =============================================================================

use std::ops;

use super::eval::escape_pattern;
use super::query::{AliasGen, ColumnRef, CompOp, OrderKey, Predicate, Query, SortDirection};
use super::resolve::{chain_predicate, constrain, Anchor, Strategy};
use super::schema::{RelationPath, Schema};
use super::typeside::{BaseType, Value};
use crate::config::TraversalConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Aucun filtre
    All,
    /// Au moins un descendant (au bout de `path`) vérifie `inner`
    Has { path: RelationPath, inner: Box<Filter> },
    /// Le nombre de descendants vérifiant `inner` satisfait `op threshold`
    Count {
        path: RelationPath,
        inner: Box<Filter>,
        op: CompOp,
        threshold: u64,
    },
    /// L'ancêtre au sommet de `path` a la clé `key`
    Under { path: RelationPath, key: Value },
    /// Motif LIKE brut (`%`, `_`, `\`)
    Pattern { field: String, pattern: String },
    /// low <= champ <= high
    Range { field: String, low: Value, high: Value },
    Compare { field: String, op: CompOp, value: Value },
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn has(path: RelationPath, inner: Filter) -> Self {
        Filter::Has {
            path,
            inner: Box::new(inner),
        }
    }

    pub fn count(path: RelationPath, op: CompOp, threshold: u64) -> Self {
        Filter::Count {
            path,
            inner: Box::new(Filter::All),
            op,
            threshold,
        }
    }

    pub fn count_where(path: RelationPath, inner: Filter, op: CompOp, threshold: u64) -> Self {
        Filter::Count {
            path,
            inner: Box::new(inner),
            op,
            threshold,
        }
    }

    pub fn under(path: RelationPath, key: impl Into<Value>) -> Self {
        Filter::Under {
            path,
            key: key.into(),
        }
    }

    /// Sous-chaîne littérale : le texte est échappé puis entouré de `%`.
    pub fn contains(field: &str, text: &str) -> Self {
        Filter::Pattern {
            field: field.to_string(),
            pattern: format!("%{}%", escape_pattern(text)),
        }
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Filter::Pattern {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Intervalle fermé ; `low > high` ne retient rien.
    pub fn between(field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn compare(field: &str, op: CompOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::compare(field, CompOp::Eq, value)
    }

    pub fn is_null(field: &str) -> Self {
        Filter::IsNull(field.to_string())
    }

    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Or(mut a), Filter::Or(b)) => {
                a.extend(b);
                Filter::Or(a)
            }
            (Filter::Or(mut a), f) => {
                a.push(f);
                Filter::Or(a)
            }
            (a, b) => Filter::Or(vec![a, b]),
        }
    }

    pub fn negate(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            f => Filter::Not(Box::new(f)),
        }
    }

    /// Compile le filtre pour la ligne `alias` de l'entité `entity`.
    pub fn compile(
        &self,
        schema: &Schema,
        config: &TraversalConfig,
        entity: &str,
        alias: &str,
        gen: &mut AliasGen,
    ) -> Result<Predicate, ConfigError> {
        schema.require_node(entity)?;
        match self {
            Filter::All => Ok(Predicate::Always),

            Filter::Has { path, inner } => {
                let sub = descendant_subquery(schema, config, path, inner, entity, alias, gen)?;
                Ok(Predicate::Exists(Box::new(sub)))
            }

            Filter::Count {
                path,
                inner,
                op,
                threshold,
            } => {
                let sub = descendant_subquery(schema, config, path, inner, entity, alias, gen)?;
                Ok(Predicate::CountCompare {
                    subquery: Box::new(sub),
                    op: *op,
                    threshold: *threshold,
                })
            }

            Filter::Under { path, key } => {
                if path.leaf() != entity {
                    return Err(ConfigError::NoRelationship {
                        origin: entity.to_string(),
                        target: path.root().to_string(),
                    });
                }
                let level = path.depth() - 1;
                Ok(chain_predicate(
                    path,
                    level,
                    alias,
                    &Anchor::Key(key.clone()),
                    Strategy::Exists,
                    gen,
                ))
            }

            Filter::Pattern { field, pattern } => {
                schema.require_field(entity, field)?;
                Ok(Predicate::Like {
                    column: ColumnRef::new(alias, field),
                    pattern: pattern.clone(),
                    case_sensitive: config.pattern_case_sensitive,
                })
            }

            Filter::Range { field, low, high } => {
                check_value(schema, entity, field, low)?;
                check_value(schema, entity, field, high)?;
                if low.is_null() || high.is_null() {
                    return Err(ConfigError::InvalidSetting(format!(
                        "intervalle sur {}.{} : les deux bornes sont obligatoires",
                        entity, field
                    )));
                }
                Ok(Predicate::Between {
                    column: ColumnRef::new(alias, field),
                    low: low.clone(),
                    high: high.clone(),
                })
            }

            Filter::Compare { field, op, value } => {
                check_value(schema, entity, field, value)?;
                Ok(Predicate::compare(ColumnRef::new(alias, field), *op, value.clone()))
            }

            Filter::IsNull(field) => {
                schema.require_field(entity, field)?;
                Ok(Predicate::IsNull(ColumnRef::new(alias, field)))
            }

            Filter::And(parts) => parts.iter().try_fold(Predicate::Always, |acc, f| {
                Ok(acc.and(f.compile(schema, config, entity, alias, gen)?))
            }),

            Filter::Or(parts) => {
                let compiled = parts
                    .iter()
                    .map(|f| f.compile(schema, config, entity, alias, gen))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::Or(compiled))
            }

            Filter::Not(inner) => Ok(inner.compile(schema, config, entity, alias, gen)?.negate()),
        }
    }

    /// Compile le filtre sur l'entité de base de `query` et l'y ajoute (AND).
    pub fn apply(&self, schema: &Schema, config: &TraversalConfig, query: Query) -> Result<Query, ConfigError> {
        let mut gen = AliasGen::after(&query);
        let predicate = self.compile(schema, config, &query.entity, &query.alias, &mut gen)?;
        Ok(query.filter(predicate))
    }
}

/// La sous-requête corrélée « descendants de la ligne `alias` vérifiant `inner` ».
fn descendant_subquery(
    schema: &Schema,
    config: &TraversalConfig,
    path: &RelationPath,
    inner: &Filter,
    entity: &str,
    alias: &str,
    gen: &mut AliasGen,
) -> Result<Query, ConfigError> {
    if path.root() != entity {
        return Err(ConfigError::NoRelationship {
            origin: entity.to_string(),
            target: path.leaf().to_string(),
        });
    }
    let leaf_alias = gen.fresh();
    let inner = inner.compile(schema, config, path.leaf(), &leaf_alias, gen)?;
    let sub = Query::from(path.leaf(), &leaf_alias).filter(inner);
    let anchor = Anchor::Column(ColumnRef::new(alias, &path.hops()[0].parent_key));
    Ok(constrain(sub, path, &anchor, Strategy::Exists, gen))
}

/// Vérifie que la constante est comparable au type du champ.
fn check_value(schema: &Schema, entity: &str, field: &str, value: &Value) -> Result<(), ConfigError> {
    schema.require_field(entity, field)?;
    let (Some(expected), Some(actual)) = (schema.field_type(entity, field), value.get_type()) else {
        return Ok(());
    };
    let numeric = |t: BaseType| matches!(t, BaseType::Integer | BaseType::Float);
    if expected == actual || (numeric(expected) && numeric(actual)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting(format!(
            "{}.{} est de type {}, comparé à une valeur {}",
            entity, field, expected, actual
        )))
    }
}

/// Trie une requête par le nombre de descendants de chaque ligne.
pub fn order_by_descendant_count(
    query: Query,
    path: &RelationPath,
    direction: SortDirection,
) -> Result<Query, ConfigError> {
    if path.root() != query.entity {
        return Err(ConfigError::NoRelationship {
            origin: query.entity.clone(),
            target: path.leaf().to_string(),
        });
    }
    let mut gen = AliasGen::after(&query);
    let leaf_alias = gen.fresh();
    let anchor = Anchor::Column(ColumnRef::new(&query.alias, &path.hops()[0].parent_key));
    let counted = constrain(
        Query::from(path.leaf(), &leaf_alias),
        path,
        &anchor,
        Strategy::Exists,
        &mut gen,
    );
    Ok(query.order_by(OrderKey::Count(Box::new(counted)), direction))
}

impl ops::BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl ops::BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

impl ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eval::MemoryStore;
    use crate::core::instance::{Instance, Row};
    use crate::core::storage::Storage;

    fn schema() -> Schema {
        let mut s = Schema::new("Company");
        s.add_node("Company", "companies")
            .add_node("Department", "departments")
            .add_node("Team", "teams")
            .add_node("Employee", "employees")
            .add_attribute("name", "Company", BaseType::String)
            .add_attribute("name", "Department", BaseType::String)
            .add_attribute("name", "Team", BaseType::String)
            .add_attribute("name", "Employee", BaseType::String)
            .add_attribute("skills", "Employee", BaseType::String)
            .add_attribute("salary", "Employee", BaseType::Float)
            .add_fk("company_id", "Department", "Company", "id")
            .add_fk("department_id", "Team", "Department", "id")
            .add_fk("team_id", "Employee", "Team", "id");
        s
    }

    fn store() -> MemoryStore {
        let s = schema();
        let mut inst = Instance::new("Data", &s);
        inst.insert("Company", [("name", Value::from("Acme"))]).unwrap();
        inst.insert("Company", [("name", Value::from("Globex"))]).unwrap();
        inst.insert("Department", [("name", Value::from("R&D")), ("company_id", Value::Integer(1))]).unwrap();
        inst.insert("Department", [("name", Value::from("Ops")), ("company_id", Value::Integer(2))]).unwrap();
        inst.insert("Team", [("name", Value::from("Core")), ("department_id", Value::Integer(1))]).unwrap();
        inst.insert("Team", [("name", Value::from("Infra")), ("department_id", Value::Integer(2))]).unwrap();
        let staff = [
            ("Alice", "go,rust", 5000.0, 1),
            ("Bob", "python", 4000.0, 1),
            ("Chloé", "Rust,C", 6500.0, 2),
        ];
        for (name, skills, salary, team) in staff {
            inst.insert("Employee", [
                ("name", Value::from(name)),
                ("skills", Value::from(skills)),
                ("salary", Value::from(salary)),
                ("team_id", Value::Integer(team)),
            ]).unwrap();
        }
        MemoryStore::new(s, inst)
    }

    fn names(rows: Vec<Row>) -> Vec<String> {
        rows.iter().filter_map(|r| r.get_str("name").map(str::to_string)).collect()
    }

    fn run(store: &MemoryStore, entity: &str, filter: Filter) -> Vec<String> {
        let query = filter.apply(store.schema(), &TraversalConfig::default(), Query::from(entity, "t0")).unwrap();
        names(store.fetch(&query).unwrap())
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let f = Filter::contains("skills", "c_%");
        assert_eq!(
            f,
            Filter::Pattern {
                field: "skills".into(),
                pattern: "%c\\_\\%%".into()
            }
        );
    }

    #[test]
    fn test_pattern_and_range() {
        let store = store();
        assert_eq!(run(&store, "Employee", Filter::contains("skills", "rust")), vec!["Alice", "Chloé"]);
        assert_eq!(run(&store, "Employee", Filter::between("salary", 4000.0, 5000.0)), vec!["Alice", "Bob"]);
        assert!(run(&store, "Employee", Filter::between("salary", 6000.0, 1000.0)).is_empty());
    }

    #[test]
    fn test_pattern_convention_comes_from_config() {
        let store = store();
        let sensitive = TraversalConfig::from_json_str(r#"{ "pattern_case_sensitive": true }"#).unwrap();
        let query = Filter::contains("skills", "rust")
            .apply(store.schema(), &sensitive, Query::from("Employee", "t0"))
            .unwrap();
        assert_eq!(names(store.fetch(&query).unwrap()), vec!["Alice"]);
        assert_eq!(run(&store, "Employee", Filter::contains("skills", "RUST")), vec!["Alice", "Chloé"]);
    }

    #[test]
    fn test_existence_across_three_hops() {
        let store = store();
        let path = RelationPath::down(store.schema(), "Company", &["Department", "Team", "Employee"]).unwrap();
        let with_python = Filter::has(path.clone(), Filter::contains("skills", "python"));
        assert_eq!(run(&store, "Company", with_python), vec!["Acme"]);

        let with_rust = Filter::has(path, Filter::contains("skills", "rust"));
        assert_eq!(run(&store, "Company", with_rust), vec!["Acme", "Globex"]);
    }

    #[test]
    fn test_count_threshold() {
        let store = store();
        let path = RelationPath::down(store.schema(), "Team", &["Employee"]).unwrap();
        assert_eq!(run(&store, "Team", Filter::count(path.clone(), CompOp::Gte, 2)), vec!["Core"]);
        assert_eq!(run(&store, "Team", Filter::count(path, CompOp::Lte, 1)), vec!["Infra"]);
    }

    #[test]
    fn test_under_ancestor() {
        let store = store();
        let path = RelationPath::down(store.schema(), "Company", &["Department", "Team", "Employee"]).unwrap();
        assert_eq!(run(&store, "Employee", Filter::under(path, 2i64)), vec!["Chloé"]);
    }

    #[test]
    fn test_combinators() {
        let store = store();
        let rust = Filter::contains("skills", "rust");
        let rich = Filter::compare("salary", CompOp::Gt, 6000.0);
        assert_eq!(run(&store, "Employee", rust.clone() & !rich.clone()), vec!["Alice"]);
        assert_eq!(run(&store, "Employee", Filter::contains("skills", "python") | rich), vec!["Bob", "Chloé"]);
        assert_eq!(!!rust.clone(), rust);
    }

    #[test]
    fn test_compile_checks_schema() {
        let s = schema();
        let config = TraversalConfig::default();
        let mut gen = AliasGen::new();
        let err = Filter::contains("hobbies", "chess").compile(&s, &config, "Employee", "t0", &mut gen).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { .. }));

        let err = Filter::eq("salary", "lots").compile(&s, &config, "Employee", "t0", &mut gen).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting(_)));

        let path = RelationPath::down(&s, "Team", &["Employee"]).unwrap();
        let err = Filter::has(path, Filter::All).compile(&s, &config, "Company", "t0", &mut gen).unwrap_err();
        assert!(matches!(err, ConfigError::NoRelationship { .. }));

        let err = Filter::between("salary", Value::Null, 10.0).compile(&s, &config, "Employee", "t0", &mut gen).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting(_)));
    }

    #[test]
    fn test_order_by_descendant_count() {
        let store = store();
        let path = RelationPath::down(store.schema(), "Team", &["Employee"]).unwrap();
        let asc = order_by_descendant_count(Query::from("Team", "t0"), &path, SortDirection::Asc).unwrap();
        assert_eq!(names(store.fetch(&asc).unwrap()), vec!["Infra", "Core"]);
        let desc = order_by_descendant_count(Query::from("Team", "t0"), &path, SortDirection::Desc).unwrap();
        assert_eq!(names(store.fetch(&desc).unwrap()), vec!["Core", "Infra"]);
    }
}
