// =============================================================================
// RELATIONS — Table statique des relations déclarées
// =============================================================================
//
// Chaque relation est déclarée UNE fois, à l'initialisation, et rangée sous
// sa paire (source, cible) :
//
//   ("Company",  "Employee") → HasMany   Company > Department > Team > Employee
//   ("Employee", "Company")  → BelongsTo le même chemin, parcouru à l'envers
//
// Le chemin est validé contre le schéma dès la déclaration : une relation
// mal décrite échoue au démarrage, jamais au milieu d'une requête.
//
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::instance::Row;
use super::resolve::Resolver;
use super::schema::{RelationPath, Schema};
use super::storage::Storage;
use crate::error::{ConfigError, Result};

/// Sens de parcours d'une relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// 1 → N, de la racine vers les descendants
    HasMany,
    /// N → 1, d'une feuille vers son ancêtre
    BelongsTo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub name: String,
    pub source: String,
    pub target: String,
    pub direction: Direction,
    /// Toujours orienté de l'ancêtre vers le descendant
    pub path: RelationPath,
}

/// Résultat d'une relation : une collection ou au plus une ligne.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    Many(Vec<Row>),
    One(Option<Row>),
}

impl Related {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Related::Many(rows) => rows,
            Related::One(row) => row.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipTable {
    by_pair: HashMap<(String, String), Relationship>,
    /// (source, nom) → cible
    by_name: BTreeMap<(String, String), String>,
}

impl RelationshipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `source` a plusieurs `chain.last()`, en descendant par `chain`.
    pub fn has_many(&mut self, schema: &Schema, name: &str, source: &str, chain: &[&str]) -> Result<&mut Self, ConfigError> {
        let path = RelationPath::down(schema, source, chain)?;
        let target = path.leaf().to_string();
        self.declare(Relationship {
            name: name.to_string(),
            source: source.to_string(),
            target,
            direction: Direction::HasMany,
            path,
        })
    }

    /// `source` appartient à `chain.last()`, en remontant par `chain`.
    ///
    /// `belongs_to(s, "company", "Employee", &["Team", "Department", "Company"])`
    pub fn belongs_to(&mut self, schema: &Schema, name: &str, source: &str, chain: &[&str]) -> Result<&mut Self, ConfigError> {
        let Some((root, above)) = chain.split_last() else {
            return Err(ConfigError::EmptyPath(source.to_string()));
        };
        let down: Vec<&str> = above
            .iter()
            .rev()
            .copied()
            .chain(std::iter::once(source))
            .collect();
        let path = RelationPath::down(schema, root, &down)?;
        self.declare(Relationship {
            name: name.to_string(),
            source: source.to_string(),
            target: root.to_string(),
            direction: Direction::BelongsTo,
            path,
        })
    }

    fn declare(&mut self, relationship: Relationship) -> Result<&mut Self, ConfigError> {
        let pair = (relationship.source.clone(), relationship.target.clone());
        if self.by_pair.contains_key(&pair) {
            return Err(ConfigError::InvalidSetting(format!(
                "relation {} → {} déclarée deux fois",
                pair.0, pair.1
            )));
        }
        self.by_name.insert(
            (relationship.source.clone(), relationship.name.clone()),
            relationship.target.clone(),
        );
        self.by_pair.insert(pair, relationship);
        Ok(self)
    }

    pub fn get(&self, source: &str, target: &str) -> Result<&Relationship, ConfigError> {
        self.by_pair
            .get(&(source.to_string(), target.to_string()))
            .ok_or_else(|| ConfigError::NoRelationship {
                origin: source.to_string(),
                target: target.to_string(),
            })
    }

    pub fn by_name(&self, source: &str, name: &str) -> Result<&Relationship, ConfigError> {
        let target = self
            .by_name
            .get(&(source.to_string(), name.to_string()))
            .ok_or_else(|| ConfigError::NoRelationship {
                origin: source.to_string(),
                target: name.to_string(),
            })?;
        self.get(source, target)
    }

    /// Le chemin d'une relation (orienté ancêtre → descendant)
    pub fn path(&self, source: &str, target: &str) -> Result<&RelationPath, ConfigError> {
        Ok(&self.get(source, target)?.path)
    }

    /// Noms des relations déclarées sur une entité, triés
    pub fn names_of(&self, source: &str) -> Vec<&str> {
        self.by_name
            .keys()
            .filter(|(s, _)| s == source)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

impl<'s, S: Storage + ?Sized> Resolver<'s, S> {
    /// Suit la relation (row.entity → target) déclarée dans la table.
    pub fn related(&self, table: &RelationshipTable, row: &Row, target: &str) -> Result<Related> {
        let relationship = table.get(&row.entity, target)?;
        match relationship.direction {
            Direction::HasMany => Ok(Related::Many(self.resolve_descendants(row, &relationship.path)?)),
            Direction::BelongsTo => Ok(Related::One(self.resolve_ancestor(row, &relationship.path)?)),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraversalConfig;
    use crate::core::eval::MemoryStore;
    use crate::core::instance::Instance;
    use crate::core::typeside::{BaseType, Value};

    fn schema() -> Schema {
        let mut s = Schema::new("Garage");
        s.add_node("Mechanic", "mechanics")
            .add_node("Car", "cars")
            .add_node("Owner", "owners")
            .add_attribute("name", "Mechanic", BaseType::String)
            .add_attribute("model", "Car", BaseType::String)
            .add_attribute("name", "Owner", BaseType::String)
            .add_fk("mechanic_id", "Car", "Mechanic", "id")
            .add_fk("car_id", "Owner", "Car", "id");
        s
    }

    fn table(s: &Schema) -> RelationshipTable {
        let mut t = RelationshipTable::new();
        t.has_many(s, "owners", "Mechanic", &["Car", "Owner"])
            .unwrap()
            .belongs_to(s, "mechanic", "Owner", &["Car", "Mechanic"])
            .unwrap();
        t
    }

    #[test]
    fn test_lookup() {
        let s = schema();
        let t = table(&s);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("Mechanic", "Owner").unwrap().path.depth(), 2);
        assert_eq!(t.by_name("Owner", "mechanic").unwrap().target, "Mechanic");
        assert_eq!(t.names_of("Mechanic"), vec!["owners"]);
        assert!(matches!(
            t.get("Owner", "Galaxy"),
            Err(ConfigError::NoRelationship { .. })
        ));
    }

    #[test]
    fn test_misdeclared_chain_fails_at_init() {
        let s = schema();
        let mut t = RelationshipTable::new();
        assert!(t.has_many(&s, "owners", "Owner", &["Car"]).is_err());
        assert!(matches!(
            t.belongs_to(&s, "nothing", "Owner", &[]),
            Err(ConfigError::EmptyPath(_))
        ));
        t.has_many(&s, "cars", "Mechanic", &["Car"]).unwrap();
        assert!(t.has_many(&s, "cars_again", "Mechanic", &["Car"]).is_err());
    }

    #[test]
    fn test_related_both_directions() {
        let s = schema();
        let t = table(&s);
        let mut inst = Instance::new("Data", &s);
        let m = inst.insert("Mechanic", [("name", Value::from("Joe"))]).unwrap();
        let c = inst
            .insert("Car", [("model", Value::from("Clio")), ("mechanic_id", Value::Integer(m as i64))])
            .unwrap();
        inst.insert("Owner", [("name", Value::from("Ann")), ("car_id", Value::Integer(c as i64))]).unwrap();
        inst.insert("Owner", [("name", Value::from("Lost")), ("car_id", Value::Null)]).unwrap();
        let store = MemoryStore::new(s, inst);
        let resolver = Resolver::new(&store, TraversalConfig::default());

        let joe = store.instance().get("Mechanic", m).unwrap();
        let owners = resolver.related(&t, &joe, "Owner").unwrap().into_rows();
        assert_eq!(owners.len(), 1);

        let ann = store.instance().get("Owner", 1).unwrap();
        match resolver.related(&t, &ann, "Mechanic").unwrap() {
            Related::One(Some(mechanic)) => assert_eq!(mechanic.get_str("name"), Some("Joe")),
            other => panic!("mécanicien attendu, obtenu {:?}", other),
        }
        let lost = store.instance().get("Owner", 2).unwrap();
        assert_eq!(resolver.related(&t, &lost, "Mechanic").unwrap(), Related::One(None));
    }
}
