// =============================================================================
// STRATA — Traversée relationnelle multi-niveaux en Rust
// =============================================================================
//
// Strata résout des relations qui franchissent plusieurs niveaux d'une
// hiérarchie (Company → Department → Team → Employee) sans clé raccourcie :
// descendants d'une racine, ancêtre d'une feuille, attributs dérivés et
// filtres composables, au-dessus d'un stockage abstrait.
//
// Architecture :
//   core/     → Le moteur pur (schéma, requêtes, résolution, scopes)
//   catalog/  → Les hiérarchies concrètes (company, garage)
//   backend/  → Traduction des requêtes vers les DB réelles (SQL)
//
// Concepts fondamentaux :
//   RelationPath = une chaîne de sauts FK, de l'ancêtre vers le descendant
//   Query        = l'arbre de requête, exécuté ou rendu en SQL
//   Storage      = le collaborateur qui exécute les Query
//   Filter       = un scope composable, compilé en prédicat
//
// =============================================================================

pub mod error;
pub mod config;
pub mod core;
pub mod catalog;
pub mod backend;
