// =============================================================================
// SCHEMA — Description statique des entités, colonnes et clés étrangères
// =============================================================================
//
// Un Schema est un graphe :
//   - les NŒUDS sont les entités (= tables)
//   - les ARÊTES sont de deux sortes :
//       1. Foreign Keys : colonne d'un enfant → clé du parent
//          (Department.company_id → Company.id)
//       2. Attributs : colonne typée (Employee.salary : Float)
//
// Chaque entité possède implicitement sa clé primaire `id` (Integer).
//
// Un RelationPath décrit comment descendre d'une entité racine vers une
// entité cible, saut par saut :
//
//   Company ──company_id──▶ Department ──department_id──▶ Team ──team_id──▶ Employee
//           (1 saut)                   (2 sauts)                 (3 sauts)
//
// Chaque saut est un triplet (entité enfant, FK sur l'enfant, clé du parent).
// Le MÊME chemin sert dans les deux sens :
//   - vers le bas  : tous les Employee d'une Company (hasManyThrough)
//   - vers le haut : la Company d'un Employee (hasOneThrough)
//
// Aucun raccourci n'est stocké : Employee n'a PAS de company_id.
//
// =============================================================================

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::typeside::BaseType;
use crate::error::ConfigError;

/// Nom de la clé primaire implicite de chaque entité
pub const PRIMARY_KEY: &str = "id";

/// Une entité du schéma et la table qui la stocke.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub name: String,
    pub table: String,
}

impl Node {
    pub fn new(name: &str, table: &str) -> Self {
        Node {
            name: name.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Une colonne déclarée sur une entité.
///
/// - **ForeignKey** : la colonne `name` de `source` référence `target.target_key`
/// - **Attribute** : une colonne typée ordinaire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Edge {
    ForeignKey {
        name: String,
        source: String,
        target: String,
        target_key: String,
    },
    Attribute {
        name: String,
        source: String,
        target: BaseType,
    },
}

impl Edge {
    pub fn fk(name: &str, source: &str, target: &str, target_key: &str) -> Self {
        Edge::ForeignKey {
            name: name.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            target_key: target_key.to_string(),
        }
    }

    pub fn attr(name: &str, source: &str, target: BaseType) -> Self {
        Edge::Attribute {
            name: name.to_string(),
            source: source.to_string(),
            target,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Edge::ForeignKey { name, .. } => name,
            Edge::Attribute { name, .. } => name,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Edge::ForeignKey { source, .. } => source,
            Edge::Attribute { source, .. } => source,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self, Edge::ForeignKey { .. })
    }
}

/// Un saut : l'entité enfant, sa colonne FK, et la clé du parent référencée.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub entity: String,
    pub foreign_key: String,
    pub parent_key: String,
}

impl Hop {
    pub fn new(entity: &str, foreign_key: &str, parent_key: &str) -> Self {
        Hop {
            entity: entity.to_string(),
            foreign_key: foreign_key.to_string(),
            parent_key: parent_key.to_string(),
        }
    }
}

/// Un chemin validé d'une racine vers une entité descendante.
///
/// `hops[0].entity` est l'enfant direct de `root`, `hops.last().entity`
/// est la cible. Construit uniquement via [`RelationPath::new`] ou
/// [`RelationPath::down`], qui vérifient chaque saut contre le schéma.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelationPath {
    root: String,
    hops: Vec<Hop>,
}

impl RelationPath {
    /// Valide une chaîne explicite de triplets.
    pub fn new(schema: &Schema, root: &str, hops: Vec<Hop>) -> Result<Self, ConfigError> {
        schema.require_node(root)?;
        if hops.is_empty() {
            return Err(ConfigError::EmptyPath(root.to_string()));
        }

        let mut parent = root;
        for hop in &hops {
            schema.require_node(&hop.entity)?;
            match schema.edge(&hop.entity, &hop.foreign_key) {
                Some(Edge::ForeignKey { target, .. }) if target == parent => {}
                Some(Edge::ForeignKey { target, .. }) => {
                    return Err(ConfigError::ForeignKeyTargetMismatch {
                        entity: hop.entity.clone(),
                        field: hop.foreign_key.clone(),
                        expected: parent.to_string(),
                        actual: target.clone(),
                    });
                }
                Some(Edge::Attribute { .. }) => {
                    return Err(ConfigError::NotAForeignKey {
                        entity: hop.entity.clone(),
                        field: hop.foreign_key.clone(),
                    });
                }
                None => {
                    return Err(ConfigError::UnknownField {
                        entity: hop.entity.clone(),
                        field: hop.foreign_key.clone(),
                    });
                }
            }
            schema.require_field(parent, &hop.parent_key)?;
            parent = &hop.entity;
        }

        Ok(RelationPath {
            root: root.to_string(),
            hops,
        })
    }

    /// Construit le chemin à partir de la seule suite d'entités, en retrouvant
    /// pour chaque saut l'unique FK de l'enfant vers le parent.
    ///
    /// `RelationPath::down(&s, "Company", &["Department", "Team", "Employee"])`
    pub fn down(schema: &Schema, root: &str, chain: &[&str]) -> Result<Self, ConfigError> {
        let mut hops = Vec::with_capacity(chain.len());
        let mut parent = root;
        for child in chain {
            schema.require_node(child)?;
            let mut candidates = schema.fks_between(child, parent);
            let edge = match (candidates.pop(), candidates.is_empty()) {
                (Some(edge), true) => edge,
                _ => {
                    return Err(ConfigError::NoRelationship {
                        origin: parent.to_string(),
                        target: child.to_string(),
                    })
                }
            };
            if let Edge::ForeignKey { name, target_key, .. } = edge {
                hops.push(Hop::new(child, name, target_key));
            }
            parent = child;
        }
        RelationPath::new(schema, root, hops)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Nombre de sauts (≥ 1)
    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// L'entité cible (au bout du chemin)
    pub fn leaf(&self) -> &str {
        self.hops
            .last()
            .map(|h| h.entity.as_str())
            .unwrap_or(self.root.as_str())
    }

    /// Entité parente du saut `i` (la racine pour i = 0)
    pub fn parent_of(&self, i: usize) -> &str {
        if i == 0 {
            &self.root
        } else {
            &self.hops[i - 1].entity
        }
    }

    /// Toutes les entités traversées, de la racine à la cible.
    pub fn entities(&self) -> Vec<&str> {
        std::iter::once(self.root.as_str())
            .chain(self.hops.iter().map(|h| h.entity.as_str()))
            .collect()
    }

    /// Le sous-chemin qui commence à l'entité de rang `from` (0 = racine).
    /// None si ce sous-chemin serait vide.
    pub fn suffix(&self, from: usize) -> Option<RelationPath> {
        if from >= self.hops.len() {
            return None;
        }
        Some(RelationPath {
            root: self.parent_of(from).to_string(),
            hops: self.hops[from..].to_vec(),
        })
    }

    /// Le sous-chemin limité aux `len` premiers sauts.
    pub fn prefix(&self, len: usize) -> Option<RelationPath> {
        if len == 0 || len > self.hops.len() {
            return None;
        }
        Some(RelationPath {
            root: self.root.clone(),
            hops: self.hops[..len].to_vec(),
        })
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for hop in &self.hops {
            write!(f, " -[{}]-> {}", hop.foreign_key, hop.entity)?;
        }
        Ok(())
    }
}

/// Le schéma complet : entités + colonnes + FK.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    /// entité → Node
    pub nodes: HashMap<String, Node>,
    /// "Entité.colonne" → Edge
    pub edges: HashMap<String, Edge>,
}

fn edge_key(entity: &str, field: &str) -> String {
    format!("{}.{}", entity, field)
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Schema {
            name: name.to_string(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    /// Ajoute une entité stockée dans `table`
    pub fn add_node(&mut self, name: &str, table: &str) -> &mut Self {
        self.nodes.insert(name.to_string(), Node::new(name, table));
        self
    }

    /// Ajoute une FK `source.name → target.target_key`.
    ///
    /// Aucune vérification ici : `validate::validate_schema` et
    /// `RelationPath::new` rapportent les incohérences en ConfigError.
    pub fn add_fk(&mut self, name: &str, source: &str, target: &str, target_key: &str) -> &mut Self {
        self.edges
            .insert(edge_key(source, name), Edge::fk(name, source, target, target_key));
        self
    }

    pub fn add_attribute(&mut self, name: &str, source: &str, ty: BaseType) -> &mut Self {
        self.edges
            .insert(edge_key(source, name), Edge::attr(name, source, ty));
        self
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn table_of(&self, entity: &str) -> Option<&str> {
        self.nodes.get(entity).map(|n| n.table.as_str())
    }

    pub fn edge(&self, entity: &str, field: &str) -> Option<&Edge> {
        self.edges.get(&edge_key(entity, field))
    }

    /// La colonne existe-t-elle (clé primaire comprise) ?
    pub fn has_field(&self, entity: &str, field: &str) -> bool {
        self.nodes.contains_key(entity)
            && (field == PRIMARY_KEY || self.edges.contains_key(&edge_key(entity, field)))
    }

    /// Type d'une colonne ; les FK et la clé primaire sont des Integer.
    pub fn field_type(&self, entity: &str, field: &str) -> Option<BaseType> {
        if field == PRIMARY_KEY && self.nodes.contains_key(entity) {
            return Some(BaseType::Integer);
        }
        match self.edge(entity, field)? {
            Edge::ForeignKey { .. } => Some(BaseType::Integer),
            Edge::Attribute { target, .. } => Some(*target),
        }
    }

    pub fn require_node(&self, entity: &str) -> Result<&Node, ConfigError> {
        self.nodes
            .get(entity)
            .ok_or_else(|| ConfigError::UnknownEntity(entity.to_string()))
    }

    pub fn require_field(&self, entity: &str, field: &str) -> Result<(), ConfigError> {
        self.require_node(entity)?;
        if self.has_field(entity, field) {
            Ok(())
        } else {
            Err(ConfigError::UnknownField {
                entity: entity.to_string(),
                field: field.to_string(),
            })
        }
    }

    pub fn foreign_keys(&self) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.is_foreign_key()).collect()
    }

    /// Les FK de `child` qui pointent vers `parent`
    pub fn fks_between(&self, child: &str, parent: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| match e {
                Edge::ForeignKey { source, target, .. } => source == child && target == parent,
                _ => false,
            })
            .collect()
    }

    /// Les FK pointant vers une entité donnée
    pub fn fks_targeting(&self, node_name: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| matches!(e, Edge::ForeignKey { target, .. } if target == node_name))
            .collect()
    }

    pub fn fks_of(&self, node_name: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| e.is_foreign_key() && e.source() == node_name)
            .collect()
    }

    pub fn attributes_of(&self, node_name: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| !e.is_foreign_key() && e.source() == node_name)
            .collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "schema {} {{", self.name)?;

        let mut nodes: Vec<_> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        for node in nodes {
            writeln!(f, "  {} ({})", node.name, node.table)?;
            let mut edges: Vec<_> = self
                .edges
                .values()
                .filter(|e| e.source() == node.name)
                .collect();
            edges.sort_by(|a, b| a.name().cmp(b.name()));
            for edge in edges {
                match edge {
                    Edge::ForeignKey { name, target, target_key, .. } => {
                        writeln!(f, "    {} -> {}.{}", name, target, target_key)?
                    }
                    Edge::Attribute { name, target, .. } => writeln!(f, "    {} : {}", name, target)?,
                }
            }
        }

        write!(f, "}}")
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Company → Department → Team → Employee, réduit au minimum
    fn company_schema() -> Schema {
        let mut s = Schema::new("Company");
        s.add_node("Company", "companies")
            .add_node("Department", "departments")
            .add_node("Team", "teams")
            .add_node("Employee", "employees")
            .add_attribute("name", "Company", BaseType::String)
            .add_fk("company_id", "Department", "Company", "id")
            .add_fk("department_id", "Team", "Department", "id")
            .add_fk("team_id", "Employee", "Team", "id")
            .add_attribute("salary", "Employee", BaseType::Float);
        s
    }

    #[test]
    fn test_create_schema() {
        let s = company_schema();
        assert_eq!(s.nodes.len(), 4);
        assert_eq!(s.foreign_keys().len(), 3);
        assert_eq!(s.attributes_of("Employee").len(), 1);
    }

    #[test]
    fn test_primary_key_is_implicit() {
        let s = company_schema();
        assert!(s.has_field("Team", "id"));
        assert_eq!(s.field_type("Team", "id"), Some(BaseType::Integer));
        assert_eq!(s.field_type("Employee", "team_id"), Some(BaseType::Integer));
        assert!(!s.has_field("Employee", "company_id"));
    }

    #[test]
    fn test_down_infers_foreign_keys() {
        let s = company_schema();
        let p = RelationPath::down(&s, "Company", &["Department", "Team", "Employee"]).unwrap();
        assert_eq!(p.depth(), 3);
        assert_eq!(p.leaf(), "Employee");
        assert_eq!(p.hops()[1], Hop::new("Team", "department_id", "id"));
        assert_eq!(
            p.to_string(),
            "Company -[company_id]-> Department -[department_id]-> Team -[team_id]-> Employee"
        );
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let s = company_schema();
        let err = RelationPath::new(&s, "Team", vec![Hop::new("Employee", "squad_id", "id")])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownField {
                entity: "Employee".into(),
                field: "squad_id".into()
            }
        );
    }

    #[test]
    fn test_fk_pointing_elsewhere_is_rejected() {
        let s = company_schema();
        let err = RelationPath::new(&s, "Company", vec![Hop::new("Employee", "team_id", "id")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::ForeignKeyTargetMismatch { .. }));
    }

    #[test]
    fn test_attribute_is_not_a_hop() {
        let s = company_schema();
        let err = RelationPath::new(&s, "Team", vec![Hop::new("Employee", "salary", "id")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAForeignKey { .. }));
    }

    #[test]
    fn test_empty_path() {
        let s = company_schema();
        assert_eq!(
            RelationPath::new(&s, "Team", vec![]).unwrap_err(),
            ConfigError::EmptyPath("Team".into())
        );
    }

    #[test]
    fn test_no_fk_between() {
        let s = company_schema();
        let err = RelationPath::down(&s, "Company", &["Team"]).unwrap_err();
        assert!(matches!(err, ConfigError::NoRelationship { .. }));
    }

    #[test]
    fn test_suffix_and_prefix() {
        let s = company_schema();
        let p = RelationPath::down(&s, "Company", &["Department", "Team", "Employee"]).unwrap();

        let tail = p.suffix(1).unwrap();
        assert_eq!(tail.root(), "Department");
        assert_eq!(tail.depth(), 2);
        assert!(p.suffix(3).is_none());

        let head = p.prefix(2).unwrap();
        assert_eq!(head.leaf(), "Team");
        assert!(p.prefix(0).is_none());
        assert_eq!(p.entities(), vec!["Company", "Department", "Team", "Employee"]);
    }

    #[test]
    fn test_schema_display() {
        let display = company_schema().to_string();
        assert!(display.contains("schema Company"));
        assert!(display.contains("team_id -> Team.id"));
    }
}
