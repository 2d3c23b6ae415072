// =============================================================================
// COMPANY — Company → Department → Team → Employee
// =============================================================================
//
//   companies    (id, name, code, address)
//   departments  (id, name, code, company_id, manager_name)
//   teams        (id, name, department_id, team_leader, description)
//   employees    (id, name, email, team_id, position, salary, skills, hire_date)
//
// Aucune clé raccourcie : un Employee ne connaît sa Company qu'à travers
// Team puis Department. Tout ce qui franchit plus d'un niveau passe par
// le résolveur.
//
// =============================================================================

use std::collections::HashMap;

use chrono::NaiveDate;

use super::{checked, Hierarchy};
use crate::config::TraversalConfig;
use crate::core::instance::{Row, RowId};
use crate::core::query::{CompOp, Query, SortDirection};
use crate::core::relations::RelationshipTable;
use crate::core::resolve::Resolver;
use crate::core::schema::Schema;
use crate::core::scope::{order_by_descendant_count, Filter};
use crate::core::storage::Storage;
use crate::core::typeside::{BaseType, Value};
use crate::error::{ConfigError, Result};

pub const COMPANY: &str = "Company";
pub const DEPARTMENT: &str = "Department";
pub const TEAM: &str = "Team";
pub const EMPLOYEE: &str = "Employee";

pub fn company_schema() -> Schema {
    let mut s = Schema::new("Company");
    s.add_node(COMPANY, "companies")
        .add_node(DEPARTMENT, "departments")
        .add_node(TEAM, "teams")
        .add_node(EMPLOYEE, "employees");

    s.add_attribute("name", COMPANY, BaseType::String)
        .add_attribute("code", COMPANY, BaseType::String)
        .add_attribute("address", COMPANY, BaseType::String);

    s.add_attribute("name", DEPARTMENT, BaseType::String)
        .add_attribute("code", DEPARTMENT, BaseType::String)
        .add_attribute("manager_name", DEPARTMENT, BaseType::String)
        .add_fk("company_id", DEPARTMENT, COMPANY, "id");

    s.add_attribute("name", TEAM, BaseType::String)
        .add_attribute("team_leader", TEAM, BaseType::String)
        .add_attribute("description", TEAM, BaseType::String)
        .add_fk("department_id", TEAM, DEPARTMENT, "id");

    s.add_attribute("name", EMPLOYEE, BaseType::String)
        .add_attribute("email", EMPLOYEE, BaseType::String)
        .add_attribute("position", EMPLOYEE, BaseType::String)
        .add_attribute("salary", EMPLOYEE, BaseType::Float)
        .add_attribute("skills", EMPLOYEE, BaseType::String)
        .add_attribute("hire_date", EMPLOYEE, BaseType::Date)
        .add_fk("team_id", EMPLOYEE, TEAM, "id");
    s
}

pub fn company_relations(s: &Schema) -> Result<RelationshipTable, ConfigError> {
    let mut t = RelationshipTable::new();
    t.has_many(s, "departments", COMPANY, &[DEPARTMENT])?
        .has_many(s, "teams", COMPANY, &[DEPARTMENT, TEAM])?
        .has_many(s, "employees", COMPANY, &[DEPARTMENT, TEAM, EMPLOYEE])?;

    t.belongs_to(s, "company", DEPARTMENT, &[COMPANY])?
        .has_many(s, "teams", DEPARTMENT, &[TEAM])?
        .has_many(s, "employees", DEPARTMENT, &[TEAM, EMPLOYEE])?;

    t.belongs_to(s, "department", TEAM, &[DEPARTMENT])?
        .belongs_to(s, "company", TEAM, &[DEPARTMENT, COMPANY])?
        .has_many(s, "employees", TEAM, &[EMPLOYEE])?;

    t.belongs_to(s, "team", EMPLOYEE, &[TEAM])?
        .belongs_to(s, "department", EMPLOYEE, &[TEAM, DEPARTMENT])?
        .belongs_to(s, "company", EMPLOYEE, &[TEAM, DEPARTMENT, COMPANY])?;
    Ok(t)
}

#[derive(Debug, Clone)]
pub struct CompanyCatalog {
    schema: Schema,
    relations: RelationshipTable,
    config: TraversalConfig,
}

impl Hierarchy for CompanyCatalog {
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

impl CompanyCatalog {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(TraversalConfig::default())
    }

    pub fn with_config(config: TraversalConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let schema = checked(company_schema())?;
        let relations = company_relations(&schema)?;
        Ok(CompanyCatalog { schema, relations, config })
    }

    fn expect_entity(row: &Row, allowed: &[&str]) -> Result<(), ConfigError> {
        if allowed.contains(&row.entity.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::NoRelationship {
                origin: row.entity.clone(),
                target: allowed.join("|"),
            })
        }
    }

    // ─── Scopes nommés ─────────────────────────────────────────────────────

    /// Companies ayant au moins un employé (quatre niveaux plus bas) dont
    /// les compétences contiennent `skill`.
    pub fn company_with_employee_skill(&self, skill: &str) -> Result<Filter, ConfigError> {
        let path = self.path(COMPANY, EMPLOYEE)?.clone();
        Ok(Filter::has(path, Filter::contains("skills", skill)))
    }

    pub fn department_with_skill(&self, skill: &str) -> Result<Filter, ConfigError> {
        let path = self.path(DEPARTMENT, EMPLOYEE)?.clone();
        Ok(Filter::has(path, Filter::contains("skills", skill)))
    }

    /// Départements triés par effectif (`desc` pour le tri d'origine).
    pub fn departments_by_employee_count(&self, query: Query, direction: SortDirection) -> Result<Query, ConfigError> {
        order_by_descendant_count(query, self.path(DEPARTMENT, EMPLOYEE)?, direction)
    }

    /// Équipes d'au moins `min` employés.
    pub fn team_with_employee_count(&self, min: u64) -> Result<Filter, ConfigError> {
        let path = self.path(TEAM, EMPLOYEE)?.clone();
        Ok(Filter::count(path, CompOp::Gte, min))
    }

    /// Équipes ayant au moins un employé payé entre `min` et `max` (inclus).
    pub fn team_with_salary_range(&self, min: f64, max: f64) -> Result<Filter, ConfigError> {
        let path = self.path(TEAM, EMPLOYEE)?.clone();
        Ok(Filter::has(path, Filter::between("salary", min, max)))
    }

    pub fn employee_from_company(&self, company_id: RowId) -> Result<Filter, ConfigError> {
        let path = self.path(EMPLOYEE, COMPANY)?.clone();
        Ok(Filter::under(path, Value::Integer(company_id as i64)))
    }

    pub fn employee_from_department(&self, department_id: RowId) -> Result<Filter, ConfigError> {
        let path = self.path(EMPLOYEE, DEPARTMENT)?.clone();
        Ok(Filter::under(path, Value::Integer(department_id as i64)))
    }

    pub fn employee_with_skill(&self, skill: &str) -> Filter {
        Filter::contains("skills", skill)
    }

    pub fn employee_salary_between(&self, min: f64, max: f64) -> Filter {
        Filter::between("salary", min, max)
    }

    /// Embauchés le `date` ou après.
    pub fn employee_hired_after(&self, date: NaiveDate) -> Filter {
        Filter::compare("hire_date", CompOp::Gte, date)
    }

    // ─── Attributs dérivés ─────────────────────────────────────────────────

    /// Effectif d'une Company, d'un Department ou d'une Team.
    pub fn employee_count<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, row: &Row) -> Result<u64> {
        Self::expect_entity(row, &[COMPANY, DEPARTMENT, TEAM])?;
        resolver.descendant_count(row, self.path(&row.entity, EMPLOYEE)?)
    }

    /// Effectifs de toutes les lignes d'un scope, en deux requêtes.
    pub fn employee_counts<S: Storage + ?Sized>(
        &self,
        resolver: &Resolver<'_, S>,
        scope: &Query,
    ) -> Result<HashMap<RowId, u64>> {
        let path = self.path(&scope.entity, EMPLOYEE)?;
        resolver.descendant_counts(scope, path)
    }

    pub fn team_count<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, row: &Row) -> Result<u64> {
        Self::expect_entity(row, &[COMPANY, DEPARTMENT])?;
        resolver.descendant_count(row, self.path(&row.entity, TEAM)?)
    }

    /// Salaire moyen des employés d'une équipe (0.0 si elle est vide).
    pub fn average_salary<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, team: &Row) -> Result<f64> {
        Self::expect_entity(team, &[TEAM, DEPARTMENT, COMPANY])?;
        resolver.descendant_average(team, self.path(&team.entity, EMPLOYEE)?, "salary")
    }

    pub fn department_name<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, employee: &Row) -> Result<Option<String>> {
        self.ancestor_name(resolver, employee, DEPARTMENT)
    }

    pub fn company_name<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, employee: &Row) -> Result<Option<String>> {
        self.ancestor_name(resolver, employee, COMPANY)
    }

    fn ancestor_name<S: Storage + ?Sized>(
        &self,
        resolver: &Resolver<'_, S>,
        row: &Row,
        ancestor: &str,
    ) -> Result<Option<String>> {
        let path = self.path(&row.entity, ancestor)?;
        let name = resolver.ancestor_field(row, path, "name")?;
        Ok(name.and_then(|v| v.as_str().map(str::to_string)))
    }

    /// La Company d'une ligne de n'importe quel niveau inférieur.
    pub fn company_of<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, row: &Row) -> Result<Option<Row>> {
        resolver.resolve_ancestor(row, self.path(&row.entity, COMPANY)?)
    }

    /// "Acme > R&D > Core > Alice", tronqué au premier niveau manquant.
    pub fn hierarchy_path<S: Storage + ?Sized>(&self, resolver: &Resolver<'_, S>, employee: &Row) -> Result<String> {
        Self::expect_entity(employee, &[EMPLOYEE])?;
        resolver.hierarchy_path(employee, self.path(EMPLOYEE, COMPANY)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds() {
        let catalog = CompanyCatalog::new().unwrap();
        assert_eq!(catalog.relations().len(), 12);
        assert_eq!(catalog.path(COMPANY, EMPLOYEE).unwrap().depth(), 3);
        assert_eq!(catalog.path(EMPLOYEE, COMPANY).unwrap().root(), COMPANY);
        assert_eq!(catalog.schema().table_of(EMPLOYEE), Some("employees"));
        assert_eq!(
            catalog.relations().names_of(EMPLOYEE),
            vec!["company", "department", "team"]
        );
    }

    #[test]
    fn test_named_scopes_compile() {
        let catalog = CompanyCatalog::new().unwrap();
        let teams = catalog.query(TEAM).unwrap();
        let q = catalog
            .scoped(teams, &catalog.team_with_employee_count(2).unwrap())
            .unwrap();
        assert_eq!(q.subquery_count(), 1);

        let employees = catalog.query(EMPLOYEE).unwrap();
        let from_company = catalog.employee_from_company(1).unwrap();
        let q = catalog.scoped(employees, &from_company).unwrap();
        assert_eq!(q.subquery_count(), 2);

        assert!(catalog.query("Galaxy").is_err());
    }
}
