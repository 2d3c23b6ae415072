// =============================================================================
// CORE — Le cœur du moteur de traversée
// =============================================================================
//
// Ce module regroupe toute la logique pure :
// pas de SQL, pas de pilote de base, pas de réseau.
//
// Architecture :
//   typeside   → les types primitifs (String, Integer, Float, Date...)
//   schema     → entités, clés étrangères, chemins de relation
//   instance   → les lignes concrètes, en mémoire
//   query      → l'arbre de requête composable (JOIN, IN, EXISTS, COUNT)
//   storage    → le contrat du collaborateur de stockage
//   eval       → exécuteur in-memory des Query (zéro DB)
//   resolve    → descendants à N sauts, ancêtre à N sauts
//   derived    → comptages, moyennes, chaîne d'ancêtres, chemin affiché
//   scope      → filtres composables (has, count, under, motif, intervalle)
//   relations  → la table statique des relations déclarées
//   validate   → cohérence du schéma, détection des orphelins
//
// =============================================================================

pub mod typeside;
pub mod schema;
pub mod instance;
pub mod query;
pub mod storage;
pub mod eval;
pub mod resolve;
pub mod derived;
pub mod scope;
pub mod relations;
pub mod validate;
