// =============================================================================
// INSTANCE — Les lignes concrètes, en mémoire
// =============================================================================
//
// Si le Schema est le "moule" (CREATE TABLE), l'Instance est le "contenu"
// (les INSERT INTO). C'est le stockage de référence du moteur : le
// MemoryStore (voir eval.rs) exécute les requêtes composées directement
// dessus, sans base de données.
//
// Les FK sont des colonnes comme les autres :
//   Employee[3] { name: "Alice", team_id: 1 }     → lien valide
//   Employee[4] { name: "Bob",   team_id: NULL }  → orphelin (lien nul)
//   Employee[5] { name: "Carl",  team_id: 999 }   → orphelin (lien pendant)
//
// Rien n'empêche une ligne orpheline d'exister : c'est au moteur de
// traversée de dégrader proprement (chemin partiel, résultat vide).
//
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::schema::{Schema, PRIMARY_KEY};
use super::typeside::Value;
use crate::error::ConfigError;

/// Identifiant d'une ligne au sein de son entité (= valeur de `id`).
pub type RowId = u64;

/// Instantané en lecture seule d'une ligne.
///
/// Rendu par toutes les opérations de lecture : l'appelant le possède,
/// il ne garde aucun lien vers le stockage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub entity: String,
    pub id: RowId,
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Valeur d'une colonne ; `id` est toujours présent, une colonne
    /// absente vaut Null.
    pub fn get(&self, field: &str) -> Value {
        if field == PRIMARY_KEY {
            return Value::Integer(self.id as i64);
        }
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }
}

/// Les lignes d'une entité (table).
#[derive(Debug, Clone)]
pub struct EntityData {
    /// Compteur pour générer les RowId auto-incrémentés
    next_id: RowId,
    /// row_id → (colonne → valeur). BTreeMap : parcours par id croissant.
    pub rows: BTreeMap<RowId, HashMap<String, Value>>,
}

impl Default for EntityData {
    fn default() -> Self {
        EntityData::new()
    }
}

impl EntityData {
    pub fn new() -> Self {
        EntityData {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }

    /// Insère une ligne et retourne le RowId attribué.
    pub fn insert(&mut self, values: HashMap<String, Value>) -> RowId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.rows.insert(id, values);
        id
    }

    /// Insère une ligne avec un RowId imposé (remplace une ligne existante).
    pub fn insert_with_id(&mut self, id: RowId, values: HashMap<String, Value>) {
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
        self.rows.insert(id, values);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.keys().copied().collect()
    }

    pub fn contains(&self, row_id: RowId) -> bool {
        self.rows.contains_key(&row_id)
    }

    /// Lit une colonne (Null si absente ; `id` est synthétisé)
    pub fn get_value(&self, row_id: RowId, field: &str) -> Option<Value> {
        let row = self.rows.get(&row_id)?;
        if field == PRIMARY_KEY {
            return Some(Value::Integer(row_id as i64));
        }
        Some(row.get(field).cloned().unwrap_or(Value::Null))
    }

    /// Lit la cible d'une FK (None si la ligne n'existe pas ou si la FK est nulle)
    pub fn get_fk(&self, row_id: RowId, fk_name: &str) -> Option<RowId> {
        self.rows
            .get(&row_id)
            .and_then(|values| values.get(fk_name))
            .and_then(Value::as_row_id)
    }

    pub fn snapshot(&self, entity: &str, row_id: RowId) -> Option<Row> {
        let values = self.rows.get(&row_id)?;
        Some(Row {
            entity: entity.to_string(),
            id: row_id,
            values: values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

/// Toutes les données d'un schéma : une EntityData par entité.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub schema_name: String,
    pub data: HashMap<String, EntityData>,
}

fn to_columns<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> HashMap<String, Value> {
    fields
        .into_iter()
        .filter(|(k, _)| *k != PRIMARY_KEY)
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl Instance {
    /// Crée une instance vide pour un schéma donné
    pub fn new(name: &str, schema: &Schema) -> Self {
        let data = schema
            .nodes
            .keys()
            .map(|n| (n.clone(), EntityData::new()))
            .collect();
        Instance {
            name: name.to_string(),
            schema_name: schema.name.clone(),
            data,
        }
    }

    fn entity_mut(&mut self, entity: &str) -> Result<&mut EntityData, ConfigError> {
        self.data
            .get_mut(entity)
            .ok_or_else(|| ConfigError::UnknownEntity(entity.to_string()))
    }

    /// Insère une ligne ; retourne son RowId.
    pub fn insert<'a>(
        &mut self,
        entity: &str,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<RowId, ConfigError> {
        let columns = to_columns(fields);
        Ok(self.entity_mut(entity)?.insert(columns))
    }

    pub fn insert_with_id<'a>(
        &mut self,
        entity: &str,
        id: RowId,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<(), ConfigError> {
        // RowId::MAX reste libre : le compteur ne doit jamais déborder
        if id == RowId::MAX {
            return Err(ConfigError::InvalidSetting(format!(
                "{} : l'id {} est réservé",
                entity, id
            )));
        }
        let columns = to_columns(fields);
        self.entity_mut(entity)?.insert_with_id(id, columns);
        Ok(())
    }

    /// Modifie une colonne. Retourne false si la ligne n'existe pas.
    pub fn update(
        &mut self,
        entity: &str,
        id: RowId,
        field: &str,
        value: Value,
    ) -> Result<bool, ConfigError> {
        let data = self.entity_mut(entity)?;
        Ok(match data.rows.get_mut(&id) {
            Some(row) => {
                row.insert(field.to_string(), value);
                true
            }
            None => false,
        })
    }

    /// Supprime une ligne, sans toucher aux enfants (qui deviennent orphelins).
    pub fn delete(&mut self, entity: &str, id: RowId) -> Result<bool, ConfigError> {
        Ok(self.entity_mut(entity)?.rows.remove(&id).is_some())
    }

    pub fn entity(&self, entity: &str) -> Option<&EntityData> {
        self.data.get(entity)
    }

    pub fn get(&self, entity: &str, id: RowId) -> Option<Row> {
        self.data.get(entity)?.snapshot(entity, id)
    }

    /// Suit une FK d'une ligne vers son parent, si le parent existe.
    pub fn parent_of(&self, schema: &Schema, entity: &str, id: RowId, fk: &str) -> Option<RowId> {
        let target = match schema.edge(entity, fk)? {
            super::schema::Edge::ForeignKey { target, .. } => target,
            _ => return None,
        };
        let parent = self.data.get(entity)?.get_fk(id, fk)?;
        self.data
            .get(target)
            .filter(|d| d.contains(parent))
            .map(|_| parent)
    }

    /// Nombre total de lignes dans toutes les entités
    pub fn total_rows(&self) -> usize {
        self.data.values().map(|ed| ed.len()).sum()
    }

    /// Affiche l'instance de manière lisible (pour le debug)
    pub fn display(&self) -> String {
        let mut out = format!("instance {} : {} = {{\n", self.name, self.schema_name);

        let mut entities: Vec<_> = self.data.iter().collect();
        entities.sort_by(|a, b| a.0.cmp(b.0));
        for (entity_name, entity_data) in entities {
            if entity_data.is_empty() {
                continue;
            }
            out.push_str(&format!("  {} ({} lignes):\n", entity_name, entity_data.len()));

            for (row_id, values) in &entity_data.rows {
                out.push_str(&format!("    [{}]", row_id));
                let mut cols: Vec<_> = values.iter().collect();
                cols.sort_by(|a, b| a.0.cmp(b.0));
                for (field, value) in cols {
                    out.push_str(&format!(" {}: {},", field, value));
                }
                out.push('\n');
            }
        }

        out.push_str("}\n");
        out
    }
}
