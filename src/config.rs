// =============================================================================
// CONFIG — Réglages du moteur de traversée
// =============================================================================
//
// Peu de réglages, tous avec une valeur par défaut raisonnable :
//
//   join_depth_limit        → au-delà de N sauts, on abandonne la chaîne de
//                             JOINs au profit d'un EXISTS corrélé
//   path_separator          → "Acme > R&D > Core > Alice"
//   pattern_case_sensitive  → UNE convention pour tous les filtres LIKE
//   label_field             → le champ affiché dans les chemins hiérarchiques
//
// Format JSON, chaque champ est optionnel :
//
// ```json
// { "join_depth_limit": 1, "pattern_case_sensitive": true }
// ```
//
// =============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversalConfig {
    pub join_depth_limit: usize,
    pub path_separator: String,
    pub pattern_case_sensitive: bool,
    pub label_field: String,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        TraversalConfig {
            join_depth_limit: 2,
            path_separator: " > ".to_string(),
            pattern_case_sensitive: false,
            label_field: "name".to_string(),
        }
    }
}

impl TraversalConfig {
    /// Lit une configuration JSON puis la valide.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: TraversalConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::InvalidSetting(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidSetting(format!("lecture de {} : {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.join_depth_limit == 0 {
            return Err(ConfigError::InvalidSetting(
                "join_depth_limit doit valoir au moins 1".into(),
            ));
        }
        if self.label_field.trim().is_empty() {
            return Err(ConfigError::InvalidSetting("label_field est vide".into()));
        }
        Ok(())
    }

    pub fn with_join_depth_limit(mut self, limit: usize) -> Self {
        self.join_depth_limit = limit;
        self
    }

    pub fn with_case_sensitive_patterns(mut self, sensitive: bool) -> Self {
        self.pattern_case_sensitive = sensitive;
        self
    }

    pub fn with_path_separator(mut self, separator: &str) -> Self {
        self.path_separator = separator.to_string();
        self
    }
}
