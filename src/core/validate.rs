// =============================================================================
// VALIDATE — Vérification du schéma et diagnostic des orphelins
// =============================================================================
//
// Deux vérifications, de nature très différente :
//
//   validate_schema  → erreurs de CONFIGURATION. Une FK qui pointe vers une
//                      entité absente, une clé cible inexistante, une entité
//                      avec deux parents : le schéma est inutilisable.
//
//   find_orphans     → simple DIAGNOSTIC sur les données. Une ligne dont la
//                      FK parente est nulle ou pendante est orpheline ; la
//                      traversée la gère déjà (chemin tronqué, None, vide),
//                      on se contente de la signaler.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::instance::{Instance, RowId};
use super::schema::{Edge, Schema};
use crate::error::ConfigError;

/// Vérifie qu'un Schema est bien formé et rend TOUTES les fautes trouvées.
///
/// - les deux extrémités de chaque FK existent
/// - la clé cible de chaque FK existe sur l'entité cible
/// - chaque attribut est porté par une entité qui existe
/// - aucune entité n'a plus d'un parent immédiat
pub fn validate_schema(schema: &Schema) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let mut edges: Vec<&Edge> = schema.edges.values().collect();
    edges.sort_by(|a, b| (a.source(), a.name()).cmp(&(b.source(), b.name())));

    for edge in &edges {
        match edge {
            Edge::ForeignKey {
                name,
                source,
                target,
                target_key,
            } => {
                if schema.node(source).is_none() {
                    errors.push(ConfigError::UnknownEntity(source.clone()));
                }
                if schema.node(target).is_none() {
                    errors.push(ConfigError::UnknownEntity(target.clone()));
                } else if !schema.has_field(target, target_key) {
                    errors.push(ConfigError::UnknownField {
                        entity: target.clone(),
                        field: target_key.clone(),
                    });
                }
                if source == target {
                    errors.push(ConfigError::InvalidSetting(format!(
                        "'{}.{}' pointe vers sa propre entité",
                        source, name
                    )));
                }
            }
            Edge::Attribute { source, .. } => {
                if schema.node(source).is_none() {
                    errors.push(ConfigError::UnknownEntity(source.clone()));
                }
            }
        }
    }

    let mut parents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in &edges {
        if let Edge::ForeignKey { source, target, .. } = edge {
            let seen = parents.entry(source.as_str()).or_default();
            if !seen.contains(&target.as_str()) {
                seen.push(target.as_str());
            }
        }
    }
    for (child, targets) in parents {
        if targets.len() > 1 {
            errors.push(ConfigError::InvalidSetting(format!(
                "'{}' a plusieurs parents : {}",
                child,
                targets.join(", ")
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Une ligne dont la FK parente est nulle ou pendante.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Orphan {
    pub entity: String,
    pub id: RowId,
    pub foreign_key: String,
    /// La valeur pendante, ou None si la FK est nulle
    pub dangling: Option<RowId>,
}

impl fmt::Display for Orphan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dangling {
            Some(link) => write!(
                f,
                "{}[{}] : '{}' = {} ne référence aucune ligne",
                self.entity, self.id, self.foreign_key, link
            ),
            None => write!(f, "{}[{}] : '{}' est nulle", self.entity, self.id, self.foreign_key),
        }
    }
}

/// Liste les lignes orphelines, triées par entité puis par id.
pub fn find_orphans(instance: &Instance, schema: &Schema) -> Vec<Orphan> {
    let mut fks = schema.foreign_keys();
    fks.sort_by(|a, b| (a.source(), a.name()).cmp(&(b.source(), b.name())));

    let mut orphans = Vec::new();
    for fk in fks {
        let Edge::ForeignKey { name, source, .. } = fk else {
            continue;
        };
        let Some(data) = instance.entity(source) else {
            continue;
        };
        for id in data.row_ids() {
            if instance.parent_of(schema, source, id, name).is_some() {
                continue;
            }
            let orphan = Orphan {
                entity: source.clone(),
                id,
                foreign_key: name.clone(),
                dangling: data.get_fk(id, name),
            };
            warn!(
                entity = %orphan.entity,
                id = orphan.id,
                foreign_key = %orphan.foreign_key,
                dangling = ?orphan.dangling,
                "ligne orpheline"
            );
            orphans.push(orphan);
        }
    }
    orphans
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typeside::{BaseType, Value};

    fn schema() -> Schema {
        let mut s = Schema::new("Garage");
        s.add_node("Mechanic", "mechanics")
            .add_node("Car", "cars")
            .add_node("Owner", "owners")
            .add_attribute("name", "Mechanic", BaseType::String)
            .add_fk("mechanic_id", "Car", "Mechanic", "id")
            .add_fk("car_id", "Owner", "Car", "id");
        s
    }

    #[test]
    fn test_validate_schema_ok() {
        assert!(validate_schema(&schema()).is_ok());
    }

    #[test]
    fn test_validate_schema_reports_every_fault() {
        let mut s = schema();
        s.add_fk("garage_id", "Car", "Garage", "id")
            .add_fk("car_id", "Mechanic", "Car", "serial")
            .add_attribute("color", "Paint", BaseType::String);

        let errors = validate_schema(&s).unwrap_err();
        assert!(errors.contains(&ConfigError::UnknownEntity("Garage".into())));
        assert!(errors.contains(&ConfigError::UnknownEntity("Paint".into())));
        assert!(errors.contains(&ConfigError::UnknownField {
            entity: "Car".into(),
            field: "serial".into()
        }));
        // Car → Mechanic et Car → Garage
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidSetting(m) if m.contains("plusieurs parents"))));
    }

    #[test]
    fn test_find_orphans() {
        let s = schema();
        let mut inst = Instance::new("Data", &s);
        let m = inst.insert("Mechanic", [("name", Value::from("Joe"))]).unwrap();
        inst.insert("Car", [("mechanic_id", Value::Integer(m as i64))]).unwrap();
        inst.insert("Car", [("mechanic_id", Value::Null)]).unwrap();
        inst.insert("Owner", [("car_id", Value::Integer(42))]).unwrap();

        let orphans = find_orphans(&inst, &s);
        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans[0].entity, "Car");
        assert_eq!(orphans[0].id, 2);
        assert_eq!(orphans[0].dangling, None);
        assert_eq!(orphans[1].entity, "Owner");
        assert_eq!(orphans[1].dangling, Some(42));
        assert!(orphans[1].to_string().contains("42"));
    }
}
