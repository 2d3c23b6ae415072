// =============================================================================
// SCÉNARIOS — Company → Department → Team → Employee, de bout en bout
// =============================================================================

use approx::assert_relative_eq;

use strata::catalog::company::{COMPANY, DEPARTMENT, EMPLOYEE, TEAM};
use strata::catalog::{CompanyCatalog, Hierarchy};
use strata::config::TraversalConfig;
use strata::core::eval::MemoryStore;
use strata::core::instance::{Instance, Row, RowId};
use strata::core::resolve::{Resolver, Strategy};
use strata::core::storage::Storage;
use strata::core::typeside::Value;

fn fk(id: RowId) -> Value {
    Value::Integer(id as i64)
}

/// C1 → D1 → T1 → E1 (5000, "go,rust")
fn scenario() -> (CompanyCatalog, MemoryStore) {
    scenario_with(TraversalConfig::default())
}

fn scenario_with(config: TraversalConfig) -> (CompanyCatalog, MemoryStore) {
    let catalog = CompanyCatalog::with_config(config).unwrap();
    let mut inst = Instance::new("Scenario", catalog.schema());
    let c1 = inst.insert(COMPANY, [("name", Value::from("C1"))]).unwrap();
    let d1 = inst
        .insert(DEPARTMENT, [("name", Value::from("D1")), ("company_id", fk(c1))])
        .unwrap();
    let t1 = inst
        .insert(TEAM, [("name", Value::from("T1")), ("department_id", fk(d1))])
        .unwrap();
    inst.insert(
        EMPLOYEE,
        [
            ("name", Value::from("E1")),
            ("team_id", fk(t1)),
            ("salary", Value::Float(5000.0)),
            ("skills", Value::from("go,rust")),
        ],
    )
    .unwrap();
    let store = MemoryStore::new(catalog.schema().clone(), inst);
    (catalog, store)
}

fn names(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get_str("name").map(str::to_string))
        .collect()
}

fn row(store: &MemoryStore, entity: &str, id: RowId) -> Row {
    store.instance().get(entity, id).unwrap()
}

#[test]
fn descendants_and_ancestor_across_four_tiers() {
    let (catalog, store) = scenario();
    let resolver = Resolver::new(&store, TraversalConfig::default());
    let c1 = row(&store, COMPANY, 1);
    let e1 = row(&store, EMPLOYEE, 1);

    let employees = resolver
        .resolve_descendants(&c1, catalog.path(COMPANY, EMPLOYEE).unwrap())
        .unwrap();
    assert_eq!(names(&employees), vec!["E1"]);

    let company = resolver
        .resolve_ancestor(&e1, catalog.path(EMPLOYEE, COMPANY).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(company.id, 1);
    assert_eq!(company.get_str("name"), Some("C1"));
}

#[test]
fn every_strategy_returns_the_same_rows() {
    let (catalog, store) = scenario();
    let resolver = Resolver::new(&store, TraversalConfig::default());
    let c1 = row(&store, COMPANY, 1);
    let path = catalog.path(COMPANY, EMPLOYEE).unwrap();
    for strategy in [Strategy::Join, Strategy::InSubquery, Strategy::Exists, Strategy::Auto] {
        let rows = resolver.resolve_descendants_with(&c1, path, strategy).unwrap();
        assert_eq!(names(&rows), vec!["E1"], "stratégie {}", strategy);
    }
}

#[test]
fn skill_scope_on_employees() {
    let (catalog, store) = scenario();
    let go = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_with_skill("go"))
        .unwrap();
    assert_eq!(names(&store.fetch(&go).unwrap()), vec!["E1"]);

    let python = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_with_skill("python"))
        .unwrap();
    assert!(store.fetch(&python).unwrap().is_empty());

    // Une seule convention : insensible à la casse par défaut
    let upper = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_with_skill("RUST"))
        .unwrap();
    assert_eq!(store.fetch(&upper).unwrap().len(), 1);
}

#[test]
fn case_sensitive_patterns_from_loaded_config() {
    let config = TraversalConfig::from_json_str(r#"{ "pattern_case_sensitive": true }"#).unwrap();
    let (catalog, store) = scenario_with(config);

    let upper = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_with_skill("RUST"))
        .unwrap();
    assert!(store.fetch(&upper).unwrap().is_empty());

    let lower = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_with_skill("rust"))
        .unwrap();
    assert_eq!(names(&store.fetch(&lower).unwrap()), vec!["E1"]);

    // Le resolver du catalogue partage la même configuration
    let resolver = catalog.resolver(&store);
    let c1 = row(&store, COMPANY, 1);
    let employees = resolver
        .resolve_descendants(&c1, catalog.path(COMPANY, EMPLOYEE).unwrap())
        .unwrap();
    assert_eq!(names(&employees), vec!["E1"]);
}

#[test]
fn invalid_config_is_rejected_by_the_catalog() {
    let config = TraversalConfig::default().with_join_depth_limit(0);
    assert!(config.validate().is_err());
    assert!(CompanyCatalog::with_config(config).is_err());
}

#[test]
fn employee_without_team_degrades_gracefully() {
    let (catalog, mut store) = scenario();
    let e2 = store
        .instance_mut()
        .insert(EMPLOYEE, [("name", Value::from("E2")), ("team_id", Value::Null)])
        .unwrap();
    let resolver = Resolver::new(&store, TraversalConfig::default());
    let e2 = row(&store, EMPLOYEE, e2);

    let department = resolver
        .resolve_ancestor(&e2, catalog.path(EMPLOYEE, DEPARTMENT).unwrap())
        .unwrap();
    assert!(department.is_none());
    assert_eq!(catalog.department_name(&resolver, &e2).unwrap(), None);
    assert_eq!(catalog.hierarchy_path(&resolver, &e2).unwrap(), "E2");
}

#[test]
fn count_threshold_follows_the_data() {
    let (catalog, mut store) = scenario();
    let filter = catalog.team_with_employee_count(2).unwrap();
    let teams = catalog.scoped(catalog.query(TEAM).unwrap(), &filter).unwrap();
    assert!(store.fetch(&teams).unwrap().is_empty());

    store
        .instance_mut()
        .insert(EMPLOYEE, [("name", Value::from("E3")), ("team_id", Value::Integer(1))])
        .unwrap();
    assert_eq!(names(&store.fetch(&teams).unwrap()), vec!["T1"]);
}

#[test]
fn hierarchy_path_full_and_truncated() {
    let (catalog, mut store) = scenario();
    {
        let resolver = Resolver::new(&store, TraversalConfig::default());
        let e1 = row(&store, EMPLOYEE, 1);
        assert_eq!(catalog.hierarchy_path(&resolver, &e1).unwrap(), "C1 > D1 > T1 > E1");
    }

    // L'ancêtre le plus haut disparaît
    assert!(store.instance_mut().delete(COMPANY, 1).unwrap());
    let resolver = Resolver::new(&store, TraversalConfig::default());
    let e1 = row(&store, EMPLOYEE, 1);
    assert_eq!(catalog.hierarchy_path(&resolver, &e1).unwrap(), "D1 > T1 > E1");
    assert_eq!(catalog.company_of(&resolver, &e1).unwrap(), None);

    let slash = Resolver::new(&store, TraversalConfig::default().with_path_separator(" / "));
    assert_eq!(catalog.hierarchy_path(&slash, &e1).unwrap(), "D1 / T1 / E1");
}

#[test]
fn empty_aggregates_are_zero() {
    let (catalog, mut store) = scenario();
    let lonely = store
        .instance_mut()
        .insert(TEAM, [("name", Value::from("Empty")), ("department_id", Value::Integer(1))])
        .unwrap();
    let resolver = Resolver::new(&store, TraversalConfig::default());
    let lonely = row(&store, TEAM, lonely);
    let t1 = row(&store, TEAM, 1);

    assert_eq!(catalog.employee_count(&resolver, &lonely).unwrap(), 0);
    assert_relative_eq!(catalog.average_salary(&resolver, &lonely).unwrap(), 0.0);
    assert_relative_eq!(catalog.average_salary(&resolver, &t1).unwrap(), 5000.0);

    let counts = catalog
        .employee_counts(&resolver, &catalog.query(TEAM).unwrap())
        .unwrap();
    assert_eq!(counts.get(&1), Some(&1));
    assert_eq!(counts.get(&lonely.id), Some(&0));
}

#[test]
fn employee_scoped_to_company_and_department() {
    let (catalog, mut store) = scenario();
    let c2 = store.instance_mut().insert(COMPANY, [("name", Value::from("C2"))]).unwrap();
    let d2 = store
        .instance_mut()
        .insert(DEPARTMENT, [("name", Value::from("D2")), ("company_id", fk(c2))])
        .unwrap();
    let t2 = store
        .instance_mut()
        .insert(TEAM, [("name", Value::from("T2")), ("department_id", fk(d2))])
        .unwrap();
    store
        .instance_mut()
        .insert(EMPLOYEE, [("name", Value::from("F1")), ("team_id", fk(t2))])
        .unwrap();

    let in_c2 = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_from_company(c2).unwrap())
        .unwrap();
    assert_eq!(names(&store.fetch(&in_c2).unwrap()), vec!["F1"]);

    let in_d1 = catalog
        .scoped(catalog.query(EMPLOYEE).unwrap(), &catalog.employee_from_department(1).unwrap())
        .unwrap();
    assert_eq!(names(&store.fetch(&in_d1).unwrap()), vec!["E1"]);

    let with_go = catalog
        .scoped(catalog.query(COMPANY).unwrap(), &catalog.company_with_employee_skill("go").unwrap())
        .unwrap();
    assert_eq!(names(&store.fetch(&with_go).unwrap()), vec!["C1"]);
}
