// =============================================================================
// RESOLVE — Le résolveur de relations multi-niveaux
// =============================================================================
//
// Un RelationPath décrit la chaîne de FK entre une racine et une cible :
//
//   Company -[company_id]-> Department -[department_id]-> Team -[team_id]-> Employee
//
// Le résolveur en tire deux choses :
//
//   DESCENDANTS (vers le bas, 1 → N) : une Query sur l'entité cible, filtrée
//   pour ne garder que les lignes rattachées à une racine donnée. Trois formes
//   équivalentes, au choix de la Strategy :
//
//     Join        employees t0 JOIN teams t1 ON t0.team_id = t1.id
//                              JOIN departments t2 ON t1.department_id = t2.id
//                 WHERE t2.company_id = :root
//
//     InSubquery  employees t0 WHERE t0.team_id IN (
//                   SELECT t1.id FROM teams t1 WHERE t1.department_id IN (
//                     SELECT t2.id FROM departments t2 WHERE t2.company_id = :root))
//
//     Exists      employees t0 WHERE EXISTS (
//                   SELECT 1 FROM teams t1 WHERE t1.id = t0.team_id AND EXISTS (
//                     SELECT 1 FROM departments t2 WHERE t2.id = t1.department_id
//                       AND t2.company_id = :root))
//
//   Les jointures partent de la FEUILLE et remontent : chaque JOIN suit une
//   FK many-to-one, donc aucune ligne n'est dupliquée. Au-delà de
//   `join_depth_limit` sauts, Auto bascule sur la forme EXISTS.
//
//   ANCÊTRE (vers le haut, N → 1) : on suit les FK une par une. Au premier
//   lien nul ou pendant, on s'arrête et on renvoie None, sans erreur.
//
// =============================================================================

use std::fmt;

use tracing::debug;

use super::instance::Row;
use super::query::{AliasGen, ColumnRef, Join, Predicate, Query};
use super::schema::RelationPath;
use super::storage::Storage;
use super::typeside::Value;
use crate::config::TraversalConfig;
use crate::error::{ConfigError, Result};

/// Forme de la requête de descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Join jusqu'à `join_depth_limit` sauts, Exists au-delà
    #[default]
    Auto,
    /// Chaîne de INNER JOIN remontant de la feuille vers la racine
    Join,
    /// Sous-requêtes `IN (SELECT ...)` imbriquées
    InSubquery,
    /// Sous-requêtes `EXISTS` corrélées imbriquées
    Exists,
}

impl Strategy {
    /// Résout `Auto` pour une profondeur donnée.
    pub fn for_depth(self, depth: usize, config: &TraversalConfig) -> Strategy {
        match self {
            Strategy::Auto if depth <= config.join_depth_limit => Strategy::Join,
            Strategy::Auto => Strategy::Exists,
            other => other,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Auto => write!(f, "auto"),
            Strategy::Join => write!(f, "join"),
            Strategy::InSubquery => write!(f, "in-subquery"),
            Strategy::Exists => write!(f, "exists"),
        }
    }
}

/// Ce à quoi se rattache le haut de la chaîne : la FK du premier saut doit
/// valoir une clé connue, ou égaler une colonne d'une requête englobante.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    Key(Value),
    Column(ColumnRef),
}

impl Anchor {
    fn predicate(&self, link: ColumnRef) -> Predicate {
        match self {
            Anchor::Key(value) => Predicate::eq(link, value.clone()),
            Anchor::Column(outer) => Predicate::ColumnsEqual {
                left: link,
                right: outer.clone(),
            },
        }
    }
}

// ─── Construction des requêtes ───────────────────────────────────────────────

/// Rattache une requête dont l'entité de base est `path.leaf()` à l'ancre,
/// selon la stratégie (déjà résolue : `Auto` est traité comme `Exists`).
pub fn constrain(query: Query, path: &RelationPath, anchor: &Anchor, strategy: Strategy, gen: &mut AliasGen) -> Query {
    let hops = path.hops();
    let leaf = hops.len() - 1;

    if strategy != Strategy::Join {
        let alias = query.alias.clone();
        let predicate = chain_predicate(path, leaf, &alias, anchor, strategy, gen);
        return query.filter(predicate);
    }

    let mut query = query;
    let mut child = query.alias.clone();
    for i in (1..=leaf).rev() {
        let parent = gen.fresh();
        query = query.join(Join {
            entity: hops[i - 1].entity.clone(),
            alias: parent.clone(),
            left: ColumnRef::new(&child, &hops[i].foreign_key),
            right: ColumnRef::new(&parent, &hops[i].parent_key),
        });
        child = parent;
    }
    query.filter(anchor.predicate(ColumnRef::new(&child, &hops[0].foreign_key)))
}

/// Prédicat « la ligne `alias`, de l'entité du saut `level`, descend de l'ancre »,
/// sans jointure (forme IN ou EXISTS).
pub fn chain_predicate(
    path: &RelationPath,
    level: usize,
    alias: &str,
    anchor: &Anchor,
    strategy: Strategy,
    gen: &mut AliasGen,
) -> Predicate {
    let hops = path.hops();
    let hop = &hops[level];
    if level == 0 {
        return anchor.predicate(ColumnRef::new(alias, &hop.foreign_key));
    }

    let parent = gen.fresh();
    let upper = chain_predicate(path, level - 1, &parent, anchor, strategy, gen);
    let parent_query = Query::from(&hops[level - 1].entity, &parent);

    match strategy {
        Strategy::InSubquery => Predicate::InSubquery {
            column: ColumnRef::new(alias, &hop.foreign_key),
            subquery: Box::new(
                parent_query
                    .filter(upper)
                    .select(ColumnRef::new(&parent, &hop.parent_key)),
            ),
        },
        _ => Predicate::Exists(Box::new(
            parent_query
                .filter(Predicate::ColumnsEqual {
                    left: ColumnRef::new(&parent, &hop.parent_key),
                    right: ColumnRef::new(alias, &hop.foreign_key),
                })
                .filter(upper),
        )),
    }
}

/// Query de toutes les lignes de `path.leaf()` qui descendent de l'ancre.
pub fn descendants_query(path: &RelationPath, anchor: &Anchor, strategy: Strategy, gen: &mut AliasGen) -> Query {
    let base = Query::from(path.leaf(), &gen.fresh());
    constrain(base, path, anchor, strategy, gen)
}

/// Query de toutes les feuilles avec, en regard, la colonne qui porte la clé
/// de leur racine : la base d'un GROUP BY par racine. Toujours en jointures.
pub fn grouped_query(path: &RelationPath, gen: &mut AliasGen) -> (Query, ColumnRef) {
    let hops = path.hops();
    let mut query = Query::from(path.leaf(), &gen.fresh());
    let mut child = query.alias.clone();
    for i in (1..hops.len()).rev() {
        let parent = gen.fresh();
        query = query.join(Join {
            entity: hops[i - 1].entity.clone(),
            alias: parent.clone(),
            left: ColumnRef::new(&child, &hops[i].foreign_key),
            right: ColumnRef::new(&parent, &hops[i].parent_key),
        });
        child = parent;
    }
    let group = ColumnRef::new(&child, &hops[0].foreign_key);
    (query, group)
}

// ─── Exécution ───────────────────────────────────────────────────────────────

/// Le résolveur : un stockage et une configuration.
///
/// Sans état mutable : plusieurs résolutions peuvent partager le même
/// stockage si celui-ci accepte les lectures concurrentes.
pub struct Resolver<'s, S: Storage + ?Sized> {
    pub(crate) storage: &'s S,
    pub(crate) config: TraversalConfig,
}

impl<'s, S: Storage + ?Sized> Resolver<'s, S> {
    pub fn new(storage: &'s S, config: TraversalConfig) -> Self {
        Resolver { storage, config }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        self.storage
    }

    fn check_root(row: &Row, path: &RelationPath) -> Result<()> {
        if row.entity == path.root() {
            Ok(())
        } else {
            Err(ConfigError::NoRelationship {
                origin: row.entity.clone(),
                target: path.leaf().to_string(),
            }
            .into())
        }
    }

    /// Clé de rattachement d'une racine (None si la colonne est nulle).
    pub(crate) fn root_key(row: &Row, path: &RelationPath) -> Option<Value> {
        let key = row.get(&path.hops()[0].parent_key);
        (!key.is_null()).then_some(key)
    }

    /// La requête de descendants d'une ligne racine, avec la stratégie résolue.
    /// None si la clé de la racine est nulle.
    pub fn descendants_of(&self, source: &Row, path: &RelationPath, strategy: Strategy) -> Result<Option<Query>> {
        Self::check_root(source, path)?;
        let Some(key) = Self::root_key(source, path) else {
            return Ok(None);
        };
        let chosen = strategy.for_depth(path.depth(), &self.config);
        debug!(
            path = %path,
            depth = path.depth(),
            strategy = %chosen,
            "stratégie de descente choisie"
        );
        let mut gen = AliasGen::new();
        Ok(Some(descendants_query(path, &Anchor::Key(key), chosen, &mut gen)))
    }

    /// Toutes les lignes de `path.leaf()` rattachées à `source`.
    /// Ordre non spécifié. Vide si un maillon manque.
    pub fn resolve_descendants(&self, source: &Row, path: &RelationPath) -> Result<Vec<Row>> {
        self.resolve_descendants_with(source, path, Strategy::Auto)
    }

    pub fn resolve_descendants_with(&self, source: &Row, path: &RelationPath, strategy: Strategy) -> Result<Vec<Row>> {
        match self.descendants_of(source, path, strategy)? {
            Some(query) => Ok(self.storage.fetch(&query)?),
            None => Ok(Vec::new()),
        }
    }

    /// Remonte de `row` (une ligne de `path.leaf()`) vers la racine, un saut
    /// à la fois. Rend les ancêtres trouvés, du plus proche au plus lointain,
    /// en s'arrêtant au premier lien nul ou pendant.
    pub fn walk_up(&self, row: &Row, path: &RelationPath) -> Result<Vec<Row>> {
        if row.entity != path.leaf() {
            return Err(ConfigError::NoRelationship {
                origin: row.entity.clone(),
                target: path.root().to_string(),
            }
            .into());
        }

        let mut ancestors: Vec<Row> = Vec::with_capacity(path.depth());
        for (i, hop) in path.hops().iter().enumerate().rev() {
            let current = ancestors.last().unwrap_or(row);
            let link = current.get(&hop.foreign_key);
            if link.is_null() {
                debug!(
                    entity = %current.entity,
                    id = current.id,
                    foreign_key = %hop.foreign_key,
                    "lien nul, remontée interrompue"
                );
                break;
            }

            let parent_entity = path.parent_of(i);
            let query = Query::from(parent_entity, "t0")
                .filter(Predicate::eq(ColumnRef::new("t0", &hop.parent_key), link.clone()));
            match self.storage.first(&query)? {
                Some(parent) => ancestors.push(parent),
                None => {
                    debug!(
                        entity = %current.entity,
                        id = current.id,
                        foreign_key = %hop.foreign_key,
                        target = %parent_entity,
                        link = %link,
                        "lien pendant, remontée interrompue"
                    );
                    break;
                }
            }
        }
        Ok(ancestors)
    }

    /// L'unique ancêtre de type `path.root()`, ou None si un maillon manque.
    pub fn resolve_ancestor(&self, row: &Row, path: &RelationPath) -> Result<Option<Row>> {
        let mut ancestors = self.walk_up(row, path)?;
        if ancestors.len() == path.depth() {
            Ok(ancestors.pop())
        } else {
            Ok(None)
        }
    }
}
