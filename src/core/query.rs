// =============================================================================
// QUERY — L'expression de requête composable
// =============================================================================
//
// Le moteur ne parle jamais SQL directement : il construit une Query, un
// petit arbre que le stockage sait exécuter (MemoryStore) ou que le backend
// sait rendre en SQL (backend::sql).
//
//   Query {
//     from   employees t0
//     join   teams t1 ON t0.team_id = t1.id          ← chaîne de JOINs
//     where  t1.department_id = 7
//        AND EXISTS (SELECT 1 FROM teams t2           ← sous-requête corrélée
//                    WHERE t2.id = t0.team_id AND ...)
//     order  by t0.salary DESC
//   }
//
// Chaque table porte un ALIAS explicite. Une sous-requête peut référencer
// les alias des requêtes qui l'englobent : c'est ce qui la rend corrélée.
//
// Aucune fermeture ne capture de contexte : toutes les valeurs sont portées
// par l'arbre lui-même, qui reste donc clonable, comparable et affichable.
//
// =============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::typeside::Value;

/// Référence qualifiée à une colonne : `alias.field`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub alias: String,
    pub field: String,
}

impl ColumnRef {
    pub fn new(alias: &str, field: &str) -> Self {
        ColumnRef {
            alias: alias.to_string(),
            field: field.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.field)
    }
}

/// Opérateur de comparaison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompOp {
    Eq,  // =
    Neq, // !=
    Lt,  // <
    Gt,  // >
    Lte, // <=
    Gte, // >=
}

impl CompOp {
    /// Applique l'opérateur au résultat d'une comparaison.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::Neq => ordering != Ordering::Equal,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Lte => ordering != Ordering::Greater,
            CompOp::Gte => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompOp::Eq => write!(f, "="),
            CompOp::Neq => write!(f, "!="),
            CompOp::Lt => write!(f, "<"),
            CompOp::Gt => write!(f, ">"),
            CompOp::Lte => write!(f, "<="),
            CompOp::Gte => write!(f, ">="),
        }
    }
}

/// Une condition WHERE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    /// Toujours vrai (élément neutre du AND)
    Always,
    /// colonne op constante
    Compare {
        column: ColumnRef,
        op: CompOp,
        value: Value,
    },
    /// Égalité entre deux colonnes (corrélation ou condition de jointure)
    ColumnsEqual { left: ColumnRef, right: ColumnRef },
    /// low <= colonne <= high
    Between {
        column: ColumnRef,
        low: Value,
        high: Value,
    },
    /// Motif LIKE : `%` = n'importe quelle suite, `_` = un caractère, `\` échappe.
    /// La sensibilité à la casse est fixée à la compilation du filtre.
    Like {
        column: ColumnRef,
        pattern: String,
        case_sensitive: bool,
    },
    IsNull(ColumnRef),
    /// colonne IN (SELECT <projection> FROM ...)
    InSubquery {
        column: ColumnRef,
        subquery: Box<Query>,
    },
    /// EXISTS (SELECT 1 FROM ...)
    Exists(Box<Query>),
    /// (SELECT COUNT(*) FROM ...) op seuil
    CountCompare {
        subquery: Box<Query>,
        op: CompOp,
        threshold: u64,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: ColumnRef, op: CompOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: ColumnRef, value: impl Into<Value>) -> Self {
        Predicate::compare(column, CompOp::Eq, value)
    }

    /// Conjonction aplatie : `Always` disparaît, les AND imbriqués fusionnent.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut a), Predicate::Or(b)) => {
                a.extend(b);
                Predicate::Or(a)
            }
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Nombre de sous-requêtes (IN / EXISTS / COUNT) contenues, récursivement.
    pub fn subquery_count(&self) -> usize {
        match self {
            Predicate::InSubquery { subquery, .. }
            | Predicate::Exists(subquery)
            | Predicate::CountCompare { subquery, .. } => 1 + subquery.subquery_count(),
            Predicate::And(ps) | Predicate::Or(ps) => ps.iter().map(Predicate::subquery_count).sum(),
            Predicate::Not(p) => p.subquery_count(),
            _ => 0,
        }
    }
}

/// INNER JOIN `entity alias` ON `left = right`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    pub entity: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Ce que la requête produit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    /// Les lignes de l'entité de base
    All,
    /// Une seule colonne (pour `IN (subquery)`)
    Column(ColumnRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("direction de tri inconnue '{}'", other)),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Clé de tri : une colonne, ou un comptage corrélé (withCount + orderBy)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OrderKey {
    Column(ColumnRef),
    Count(Box<Query>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub key: OrderKey,
    pub direction: SortDirection,
}

/// Une requête sur une entité de base, avec ses jointures et son filtre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub entity: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    pub projection: Projection,
    pub distinct: bool,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(entity: &str, alias: &str) -> Self {
        Query {
            entity: entity.to_string(),
            alias: alias.to_string(),
            joins: Vec::new(),
            predicate: Predicate::Always,
            projection: Projection::All,
            distinct: false,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// `alias.field` sur l'entité de base
    pub fn column(&self, field: &str) -> ColumnRef {
        ColumnRef::new(&self.alias, field)
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Ajoute une condition, combinée en AND avec les précédentes.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        let current = std::mem::replace(&mut self.predicate, Predicate::Always);
        self.predicate = current.and(predicate);
        self
    }

    pub fn select(mut self, column: ColumnRef) -> Self {
        self.projection = Projection::Column(column);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn order_by(mut self, key: OrderKey, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy { key, direction });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Alias introduits par cette requête (base + jointures)
    pub fn local_aliases(&self) -> Vec<&str> {
        std::iter::once(self.alias.as_str())
            .chain(self.joins.iter().map(|j| j.alias.as_str()))
            .collect()
    }

    /// Entité associée à un alias local
    pub fn entity_of(&self, alias: &str) -> Option<&str> {
        if alias == self.alias {
            return Some(&self.entity);
        }
        self.joins
            .iter()
            .find(|j| j.alias == alias)
            .map(|j| j.entity.as_str())
    }

    pub fn subquery_count(&self) -> usize {
        let in_order: usize = self
            .order_by
            .iter()
            .map(|o| match &o.key {
                OrderKey::Count(q) => 1 + q.subquery_count(),
                OrderKey::Column(_) => 0,
            })
            .sum();
        self.predicate.subquery_count() + in_order
    }
}

/// Générateur d'alias uniques (t0, t1, t2...) pour une requête et toutes
/// ses sous-requêtes.
#[derive(Debug, Default)]
pub struct AliasGen {
    next: usize,
}

impl AliasGen {
    pub fn new() -> Self {
        AliasGen { next: 0 }
    }

    /// Démarre après les alias déjà pris par une requête existante (tN).
    pub fn after(query: &Query) -> Self {
        let mut gen = AliasGen::new();
        gen.reserve(query);
        gen
    }

    fn reserve(&mut self, query: &Query) {
        for alias in query.local_aliases() {
            if let Some(n) = alias.strip_prefix('t').and_then(|n| n.parse::<usize>().ok()) {
                self.next = self.next.max(n + 1);
            }
        }
    }

    pub fn fresh(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }
}
