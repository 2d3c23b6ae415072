// =============================================================================
// STRATA — Point d'entrée : démonstration du moteur de traversée
// =============================================================================
//
// Ce main.rs montre un exemple complet :
//   1. Construire la hiérarchie Company → Department → Team → Employee
//   2. Peupler une instance en mémoire (avec un employé orphelin)
//   3. Résoudre descendants et ancêtres à plusieurs sauts
//   4. Calculer les attributs dérivés (effectifs, moyennes, chemins)
//   5. Appliquer les scopes nommés
//   6. Générer le SQL (PostgreSQL, Snowflake, Trino)
//   7. Détecter les orphelins
//
// Journalisation : RUST_LOG=strata=debug pour voir le choix des stratégies.
// Configuration : STRATA_CONFIG=chemin/vers/config.json (sinon les défauts).
//
// =============================================================================

use chrono::NaiveDate;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata::backend::sql::{PostgresDialect, SnowflakeDialect, SqlBackend, TrinoDialect};
use strata::backend::Backend;
use strata::catalog::company::{COMPANY, DEPARTMENT, EMPLOYEE, TEAM};
use strata::catalog::{CompanyCatalog, GarageCatalog, Hierarchy};
use strata::config::TraversalConfig;
use strata::core::eval::MemoryStore;
use strata::core::instance::{Instance, RowId};
use strata::core::query::SortDirection;
use strata::core::resolve::Strategy;
use strata::core::storage::{Aggregate, Storage};
use strata::core::typeside::Value;
use strata::core::validate;

type DemoResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() -> DemoResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("╔══════════════════════════════════════════════════╗");
    println!("║      STRATA — Traversée relationnelle            ║");
    println!("║      Relations à N sauts, sans clé raccourcie    ║");
    println!("╚══════════════════════════════════════════════════╝\n");

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 1 : La hiérarchie
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 1 : Schéma et relations ═══\n");

    let config = match std::env::var("STRATA_CONFIG") {
        Ok(path) => TraversalConfig::from_json_file(path)?,
        Err(_) => TraversalConfig::default(),
    };
    let catalog = CompanyCatalog::with_config(config)?;
    println!("{}\n", catalog.schema());
    for entity in [COMPANY, DEPARTMENT, TEAM, EMPLOYEE] {
        println!("  {} : {}", entity, catalog.relations().names_of(entity).join(", "));
    }
    println!();

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 2 : Les données
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 2 : Données en mémoire ═══\n");

    let instance = company_data(&catalog)?;
    println!("{}", instance.display());
    let store = MemoryStore::new(catalog.schema().clone(), instance);
    let resolver = catalog.resolver(&store);

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 3 : Descendants et ancêtres
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 3 : Résolution ═══\n");

    let acme = store.instance().get(COMPANY, 1).ok_or("Acme absente")?;
    let path = catalog.path(COMPANY, EMPLOYEE)?;
    for strategy in [Strategy::Join, Strategy::InSubquery, Strategy::Exists] {
        let names: Vec<String> = resolver
            .resolve_descendants_with(&acme, path, strategy)?
            .iter()
            .filter_map(|e| e.get_str("name").map(str::to_string))
            .collect();
        println!("  [{}] employés d'Acme : {}", strategy, names.join(", "));
    }

    for id in store.instance().entity(EMPLOYEE).map(|d| d.row_ids()).unwrap_or_default() {
        let Some(employee) = store.instance().get(EMPLOYEE, id) else {
            continue;
        };
        let company = catalog
            .company_name(&resolver, &employee)?
            .unwrap_or_else(|| "—".to_string());
        println!(
            "  {:<8} → {:<8} | {}",
            employee.get_str("name").unwrap_or("?"),
            company,
            catalog.hierarchy_path(&resolver, &employee)?
        );
    }
    println!();

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 4 : Attributs dérivés
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 4 : Attributs dérivés ═══\n");

    println!("  Acme : {} employés, {} équipes",
        catalog.employee_count(&resolver, &acme)?,
        catalog.team_count(&resolver, &acme)?);
    for id in store.instance().entity(TEAM).map(|d| d.row_ids()).unwrap_or_default() {
        if let Some(team) = store.instance().get(TEAM, id) {
            println!(
                "  équipe {:<10} salaire moyen {:>8.2}",
                team.get_str("name").unwrap_or("?"),
                catalog.average_salary(&resolver, &team)?
            );
        }
    }
    let counts = catalog.employee_counts(&resolver, &catalog.query(DEPARTMENT)?)?;
    let mut counts: Vec<(RowId, u64)> = counts.into_iter().collect();
    counts.sort();
    println!("  effectifs par département (2 requêtes) : {:?}\n", counts);

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 5 : Scopes
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 5 : Scopes nommés ═══\n");

    let rust_companies = catalog.scoped(
        catalog.query(COMPANY)?,
        &catalog.company_with_employee_skill("rust")?,
    )?;
    print_names("companies avec un employé Rust", &store, &rust_companies)?;

    let big_teams = catalog.scoped(catalog.query(TEAM)?, &catalog.team_with_employee_count(2)?)?;
    print_names("équipes d'au moins 2 employés", &store, &big_teams)?;

    let since = NaiveDate::from_ymd_opt(2022, 1, 1).ok_or("date invalide")?;
    let recent_rust = catalog.scoped(
        catalog.query(EMPLOYEE)?,
        &(catalog.employee_from_company(1)?
            & catalog.employee_with_skill("rust")
            & catalog.employee_hired_after(since)),
    )?;
    print_names("employés Rust d'Acme embauchés depuis 2022", &store, &recent_rust)?;

    let by_size = catalog.departments_by_employee_count(catalog.query(DEPARTMENT)?, SortDirection::Desc)?;
    print_names("départements par effectif décroissant", &store, &by_size)?;
    println!();

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 6 : Génération SQL
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 6 : Génération SQL ═══\n");

    let deep = resolver
        .descendants_of(&acme, path, Strategy::Auto)?
        .ok_or("Acme sans clé")?;
    let backends: Vec<Box<dyn Backend>> = vec![
        Box::new(SqlBackend::new(PostgresDialect)),
        Box::new(SqlBackend::new(SnowflakeDialect)),
        Box::new(SqlBackend::new(TrinoDialect::new("iceberg", "hr"))),
    ];
    for backend in &backends {
        println!("--- {} ---", backend.name());
        println!("{}", backend.render_query(catalog.schema(), &deep)?);
        println!("{}", backend.render_query(catalog.schema(), &recent_rust)?);
        println!(
            "{}\n",
            backend.render_aggregate(catalog.schema(), &deep, &Aggregate::Avg("salary".into()))?
        );
    }

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 7 : Orphelins
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 7 : Orphelins ═══\n");

    let orphans = validate::find_orphans(store.instance(), catalog.schema());
    for orphan in &orphans {
        println!("  {}", orphan);
    }
    println!("  (JSON) {}\n", serde_json::to_string(&orphans)?);

    let garage = GarageCatalog::new()?;
    info!(
        company = catalog.relations().len(),
        garage = garage.relations().len(),
        "relations déclarées"
    );

    println!("═══════════════════════════════════════════════════");
    println!("Traversée complète !");
    println!("  {} lignes en mémoire", store.instance().total_rows());
    println!("  {} orphelins détectés", orphans.len());
    println!("  3 dialectes SQL : PostgreSQL, Snowflake, Trino");
    println!("═══════════════════════════════════════════════════");
    Ok(())
}

fn print_names(title: &str, store: &MemoryStore, query: &strata::core::query::Query) -> DemoResult<()> {
    let names: Vec<String> = store
        .fetch(query)?
        .iter()
        .filter_map(|r| r.get_str("name").map(str::to_string))
        .collect();
    println!("  {} : {}", title, names.join(", "));
    Ok(())
}

fn company_data(catalog: &CompanyCatalog) -> DemoResult<Instance> {
    let mut inst = Instance::new("Demo", catalog.schema());

    let acme = inst.insert(COMPANY, [("name", Value::from("Acme")), ("code", Value::from("ACM"))])?;
    let globex = inst.insert(COMPANY, [("name", Value::from("Globex")), ("code", Value::from("GLX"))])?;

    let rnd = inst.insert(DEPARTMENT, [("name", Value::from("R&D")), ("company_id", fk(acme))])?;
    let sales = inst.insert(DEPARTMENT, [("name", Value::from("Sales")), ("company_id", fk(acme))])?;
    let ops = inst.insert(DEPARTMENT, [("name", Value::from("Ops")), ("company_id", fk(globex))])?;

    let core = inst.insert(TEAM, [("name", Value::from("Core")), ("department_id", fk(rnd))])?;
    let web = inst.insert(TEAM, [("name", Value::from("Web")), ("department_id", fk(rnd))])?;
    let field = inst.insert(TEAM, [("name", Value::from("Field")), ("department_id", fk(sales))])?;
    let infra = inst.insert(TEAM, [("name", Value::from("Infra")), ("department_id", fk(ops))])?;

    let staff = [
        ("Alice", 5200.0, "rust,go", core, (2021, 3, 1)),
        ("Bruno", 4800.0, "Rust,sql", core, (2023, 6, 12)),
        ("Chloé", 4100.0, "typescript", web, (2022, 9, 5)),
        ("Dmitri", 3900.0, "excel", field, (2020, 1, 20)),
        ("Eve", 6100.0, "rust,k8s", infra, (2022, 2, 14)),
    ];
    for (name, salary, skills, team, (y, m, d)) in staff {
        let hired = NaiveDate::from_ymd_opt(y, m, d).ok_or("date invalide")?;
        inst.insert(
            EMPLOYEE,
            [
                ("name", Value::from(name)),
                ("salary", Value::from(salary)),
                ("skills", Value::from(skills)),
                ("hire_date", Value::from(hired)),
                ("team_id", fk(team)),
            ],
        )?;
    }
    // Sans équipe, puis rattaché à une équipe disparue
    inst.insert(EMPLOYEE, [("name", Value::from("Zoé")), ("team_id", Value::Null)])?;
    inst.insert(EMPLOYEE, [("name", Value::from("Yann")), ("team_id", Value::Integer(99))])?;
    Ok(inst)
}

fn fk(id: RowId) -> Value {
    Value::Integer(id as i64)
}
