// =============================================================================
// ERROR — Taxonomie des erreurs du moteur de traversée
// =============================================================================
//
// Trois familles, et seulement deux sont des erreurs :
//
//   1. Lien cassé (FK nulle ou pendante au milieu d'une chaîne)
//      → PAS une erreur. On renvoie None / un ensemble vide.
//
//   2. Erreur de configuration (chemin mal décrit, champ inexistant...)
//      → ConfigError, détectée à la CONSTRUCTION du chemin ou du filtre,
//        jamais pendant le parcours des lignes.
//
//   3. Erreur du stockage (connexion perdue, requête malformée, timeout)
//      → StorageError, propagée telle quelle. Aucun retry nulle part.
//
// =============================================================================

use thiserror::Error;

/// Erreur de configuration : un programmeur a mal décrit un chemin,
/// une table de relations, un filtre ou un réglage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("entité inconnue '{0}'")]
    UnknownEntity(String),

    #[error("le champ '{field}' n'existe pas sur l'entité '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("'{entity}.{field}' n'est pas une clé étrangère")]
    NotAForeignKey { entity: String, field: String },

    #[error("'{entity}.{field}' pointe vers '{actual}', mais le chemin attend '{expected}'")]
    ForeignKeyTargetMismatch {
        entity: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("chemin vide depuis '{0}'")]
    EmptyPath(String),

    #[error("aucune relation déclarée de '{origin}' vers '{target}'")]
    NoRelationship { origin: String, target: String },

    #[error("réglage invalide : {0}")]
    InvalidSetting(String),
}

/// Erreur remontée par le collaborateur de stockage.
///
/// Le moteur ne l'interprète jamais : il la propage sans la modifier.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("requête malformée : {0}")]
    MalformedQuery(String),

    #[error("stockage indisponible : {0}")]
    Unavailable(String),

    #[error("délai dépassé après {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Erreur publique des opérations de traversée.
#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("erreur de configuration : {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TraversalError {
    /// Vrai si l'erreur vient d'une mauvaise configuration (et non du stockage).
    pub fn is_config(&self) -> bool {
        matches!(self, TraversalError::Config(_))
    }
}

pub type Result<T, E = TraversalError> = std::result::Result<T, E>;
