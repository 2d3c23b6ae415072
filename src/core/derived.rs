// =============================================================================
// DERIVED — Attributs calculés à la lecture
// =============================================================================
//
// Ce sont des valeurs qui n'existent dans aucune colonne, et qui demandent
// de parcourir un ou plusieurs sauts :
//
//   - comptage de descendants   (Team.employee_count, Company.employee_count)
//   - moyenne d'un champ        (Team.average_salary)
//   - chemin hiérarchique       ("Acme > R&D > Core > Alice")
//   - champ d'un ancêtre        (Employee.company_name)
//
// Deux règles :
//   * un ensemble vide donne 0 (comptage) ou 0.0 (moyenne), jamais une erreur
//   * un maillon manquant raccourcit le chemin ou rend None, jamais une erreur
//
// Les versions « par lot » (descendant_counts, descendant_averages) calculent
// un agrégat pour TOUTES les racines d'un scope en deux requêtes, quel que soit
// le nombre de racines : pas de N+1.
//
// =============================================================================

use std::collections::HashMap;

use super::instance::{Row, RowId};
use super::query::{AliasGen, ColumnRef, Predicate, Query};
use super::resolve::{grouped_query, Resolver};
use super::schema::RelationPath;
use super::storage::{Aggregate, Storage};
use super::typeside::Value;
use crate::error::{ConfigError, Result};

impl<'s, S: Storage + ?Sized> Resolver<'s, S> {
    /// Nombre de lignes de `path.leaf()` sous `source`.
    pub fn descendant_count(&self, source: &Row, path: &RelationPath) -> Result<u64> {
        match self.descendants_of(source, path, Default::default())? {
            Some(query) => Ok(self.storage.count(&query)?),
            None => Ok(0),
        }
    }

    /// Moyenne de `field` sur les descendants ; 0.0 si aucun.
    pub fn descendant_average(&self, source: &Row, path: &RelationPath, field: &str) -> Result<f64> {
        let Some(query) = self.descendants_of(source, path, Default::default())? else {
            return Ok(0.0);
        };
        let avg = self
            .storage
            .aggregate(&query, &Aggregate::Avg(field.to_string()))?;
        Ok(avg.unwrap_or(0.0))
    }

    /// Comptage des descendants pour chaque ligne du scope (requête sur
    /// `path.root()`). Chaque ligne du scope a une entrée, 0 compris.
    pub fn descendant_counts(&self, scope: &Query, path: &RelationPath) -> Result<HashMap<RowId, u64>> {
        let batch = self.batched(scope, path, &Aggregate::Count)?;
        Ok(batch
            .into_iter()
            .map(|(id, n)| (id, n.map(|n| n as u64).unwrap_or(0)))
            .collect())
    }

    /// Moyenne de `field` pour chaque ligne du scope ; 0.0 pour les racines
    /// sans descendant.
    pub fn descendant_averages(
        &self,
        scope: &Query,
        path: &RelationPath,
        field: &str,
    ) -> Result<HashMap<RowId, f64>> {
        let batch = self.batched(scope, path, &Aggregate::Avg(field.to_string()))?;
        Ok(batch
            .into_iter()
            .map(|(id, avg)| (id, avg.unwrap_or(0.0)))
            .collect())
    }

    /// Une requête pour les racines, une requête GROUP BY pour l'agrégat.
    fn batched(
        &self,
        scope: &Query,
        path: &RelationPath,
        aggregate: &Aggregate,
    ) -> Result<HashMap<RowId, Option<f64>>> {
        if scope.entity != path.root() {
            return Err(ConfigError::NoRelationship {
                origin: scope.entity.clone(),
                target: path.leaf().to_string(),
            }
            .into());
        }

        let roots = self.storage.fetch(scope)?;
        let mut gen = AliasGen::after(scope);
        let (grouped, group) = grouped_query(path, &mut gen);

        let parent_key = &path.hops()[0].parent_key;
        let within = Predicate::InSubquery {
            column: group.clone(),
            subquery: Box::new(scope.clone().select(ColumnRef::new(&scope.alias, parent_key))),
        };
        let by_key = self
            .storage
            .aggregate_by(&grouped.filter(within), &group, aggregate)?;

        Ok(roots
            .iter()
            .map(|root| {
                let value = root
                    .get(parent_key)
                    .as_row_id()
                    .and_then(|key| by_key.get(&key).copied());
                (root.id, value)
            })
            .collect())
    }

    /// Ancêtres de `row`, du plus proche au plus lointain, arrêtés au premier
    /// maillon manquant. Chaque élément est un instantané en lecture seule.
    pub fn ancestor_chain(&self, row: &Row, path: &RelationPath) -> Result<Vec<Row>> {
        self.walk_up(row, path)
    }

    /// Un champ de l'ancêtre de type `path.root()` (None si un maillon manque).
    pub fn ancestor_field(&self, row: &Row, path: &RelationPath, field: &str) -> Result<Option<Value>> {
        Ok(self
            .resolve_ancestor(row, path)?
            .map(|ancestor| ancestor.get(field)))
    }

    /// "Acme > R&D > Core > Alice" : les libellés des ancêtres depuis le plus
    /// lointain trouvé, puis celui de `row`. Tronqué au premier maillon manquant.
    /// Un ancêtre trouvé garde son segment, vide si son libellé est nul.
    pub fn hierarchy_path(&self, row: &Row, path: &RelationPath) -> Result<String> {
        let ancestors = self.walk_up(row, path)?;
        let label_field = &self.config.label_field;
        let labels: Vec<String> = ancestors
            .iter()
            .rev()
            .chain(std::iter::once(row))
            .map(|r| label(r, label_field))
            .collect();
        Ok(labels.join(&self.config.path_separator))
    }
}

fn label(row: &Row, field: &str) -> String {
    match row.get(field) {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}
