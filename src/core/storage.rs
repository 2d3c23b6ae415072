// =============================================================================
// STORAGE — Le collaborateur de stockage
// =============================================================================
//
// Le moteur de traversée ne stocke rien. Il compose des Query et les confie
// à un Storage, qui peut être :
//   - le MemoryStore (eval.rs) : exécution en mémoire sur une Instance
//   - un adaptateur vers une vraie base, qui rend la Query en SQL via
//     backend::sql puis l'exécute avec son propre pilote
//
// Chaque appel est un aller-retour synchrone et indépendant. Le moteur ne
// pose aucun verrou : la concurrence, l'isolation, les timeouts et
// l'annulation sont l'affaire du Storage.
//
// =============================================================================

use std::collections::HashMap;

use super::instance::{Row, RowId};
use super::query::{ColumnRef, Query};
use crate::error::StorageError;

/// Fonction d'agrégation, appliquée à l'entité de base de la requête.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// COUNT(*)
    Count,
    /// AVG(champ)
    Avg(String),
    /// SUM(champ)
    Sum(String),
}

pub trait Storage {
    /// Exécute une requête et rend les lignes de l'entité de base.
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, StorageError>;

    /// Agrégat sur toute la requête. None quand l'agrégat est indéfini
    /// (AVG ou SUM d'un ensemble vide) ; COUNT rend toujours une valeur.
    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> Result<Option<f64>, StorageError>;

    /// Agrégat groupé par une colonne de clé (GROUP BY). Les groupes vides
    /// n'apparaissent pas ; les lignes dont la clé est nulle sont ignorées.
    fn aggregate_by(
        &self,
        query: &Query,
        group: &ColumnRef,
        aggregate: &Aggregate,
    ) -> Result<HashMap<RowId, f64>, StorageError>;

    /// COUNT(*) sur la requête.
    fn count(&self, query: &Query) -> Result<u64, StorageError> {
        Ok(self
            .aggregate(query, &Aggregate::Count)?
            .map(|n| n as u64)
            .unwrap_or(0))
    }

    /// Première ligne de la requête, si elle existe.
    fn first(&self, query: &Query) -> Result<Option<Row>, StorageError> {
        let limited = query.clone().limit(1);
        Ok(self.fetch(&limited)?.into_iter().next())
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, StorageError> {
        (**self).fetch(query)
    }

    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> Result<Option<f64>, StorageError> {
        (**self).aggregate(query, aggregate)
    }

    fn aggregate_by(
        &self,
        query: &Query,
        group: &ColumnRef,
        aggregate: &Aggregate,
    ) -> Result<HashMap<RowId, f64>, StorageError> {
        (**self).aggregate_by(query, group, aggregate)
    }
}
