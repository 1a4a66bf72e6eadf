//! Candidate collection
//!
//! Walks the scope chain from a query site out to the root namespace and gathers
//! every candidate witness visible there:
//! - witness parameters of enclosing generic methods and types (ambient candidates)
//! - accessible instances declared in each scope on the chain
//! - accessible instances declared in every namespace imported at that level
//!
//! The resulting set is de-duplicated by declaration identity. Its order reflects
//! discovery, not priority.

use crate::error::RegistryError;
use crate::registry::{InstanceDefinition, InstanceId, Registry, ScopeId, Visibility};
use crate::types::{FrozenVariables, TypeParameter, TypeVarId};
use indexmap::IndexMap;
use std::fmt;

/// A candidate witness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Candidate<'r> {
    /// Whatever witness the caller of an enclosing generic supplies
    Ambient(&'r TypeParameter),
    /// A named instance declaration
    Declared(&'r InstanceDefinition),
}

/// Identity of a candidate, used for de-duplication and cycle detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandidateKey {
    Ambient(TypeVarId),
    Declared(InstanceId),
}

impl<'r> Candidate<'r> {
    pub fn key(&self) -> CandidateKey {
        match self {
            Self::Ambient(param) => CandidateKey::Ambient(param.var_id),
            Self::Declared(instance) => CandidateKey::Declared(instance.id),
        }
    }

    pub fn name(&self) -> &'r str {
        match self {
            Self::Ambient(param) => &param.name,
            Self::Declared(instance) => &instance.name,
        }
    }

    pub fn is_overlappable(&self) -> bool {
        match self {
            Self::Ambient(_) => false,
            Self::Declared(instance) => instance.overlappable,
        }
    }
}

impl fmt::Display for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered, identity-deduplicated set of candidates
#[derive(Debug, Clone, Default)]
pub struct CandidateSet<'r> {
    entries: IndexMap<CandidateKey, Candidate<'r>>,
}

impl<'r> CandidateSet<'r> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Add a candidate; returns `false` if the same declaration is already present
    pub fn insert(&mut self, candidate: Candidate<'r>) -> bool {
        let key = candidate.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, candidate);
        true
    }

    pub fn contains(&self, key: CandidateKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candidate<'r>> + '_ {
        self.entries.values()
    }

    pub fn names(&self) -> Vec<&'r str> {
        self.entries.values().map(Candidate::name).collect()
    }
}

impl<'r> FromIterator<Candidate<'r>> for CandidateSet<'r> {
    fn from_iter<I: IntoIterator<Item = Candidate<'r>>>(iter: I) -> Self {
        let mut set = Self::new();
        for candidate in iter {
            set.insert(candidate);
        }
        set
    }
}

/// Accessibility predicate supplied by name resolution
///
/// `site` is the scope chain of the query, innermost first.
pub trait Accessibility {
    fn is_accessible(&self, instance: &InstanceDefinition, site: &[ScopeId]) -> bool;
}

impl<F> Accessibility for F
where
    F: Fn(&InstanceDefinition, &[ScopeId]) -> bool,
{
    fn is_accessible(&self, instance: &InstanceDefinition, site: &[ScopeId]) -> bool {
        self(instance, site)
    }
}

/// Default accessibility: public instances everywhere, private ones inside their declaring scope
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityRules;

impl Accessibility for VisibilityRules {
    fn is_accessible(&self, instance: &InstanceDefinition, site: &[ScopeId]) -> bool {
        match instance.visibility {
            Visibility::Public => true,
            Visibility::Private => site.contains(&instance.scope),
        }
    }
}

pub struct CandidateCollector<'r, A = VisibilityRules> {
    registry: &'r Registry,
    accessibility: A,
}

impl<'r> CandidateCollector<'r, VisibilityRules> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            accessibility: VisibilityRules,
        }
    }
}

impl<'r, A: Accessibility> CandidateCollector<'r, A> {
    pub fn with_accessibility(registry: &'r Registry, accessibility: A) -> Self {
        Self {
            registry,
            accessibility,
        }
    }

    /// Gather every candidate visible from `scope`
    pub fn collect(&self, scope: ScopeId) -> Result<CandidateSet<'r>, RegistryError> {
        let chain = self.registry.scope_chain(scope)?;
        let mut candidates = CandidateSet::new();

        for &level in &chain {
            let entry = self.registry.scope(level)?;

            if entry.kind.is_generic() {
                for param in entry.type_params.iter().filter(|param| param.is_witness()) {
                    candidates.insert(Candidate::Ambient(param));
                }
            }

            self.collect_declared(level, &chain, &mut candidates)?;
            for &imported in &entry.imports {
                self.collect_declared(imported, &chain, &mut candidates)?;
            }
        }

        log::trace!(
            "collected {} candidates from scope {}: {:?}",
            candidates.len(),
            scope,
            candidates.names()
        );
        Ok(candidates)
    }

    fn collect_declared(
        &self,
        scope: ScopeId,
        site: &[ScopeId],
        candidates: &mut CandidateSet<'r>,
    ) -> Result<(), RegistryError> {
        let registry = self.registry;
        for &id in &registry.scope(scope)?.instances {
            let instance = registry.instance(id)?;
            // Instances nested in another instance are not candidates
            if instance.member_of.is_some() {
                continue;
            }
            if !self.accessibility.is_accessible(instance, site) {
                log::trace!("instance {} is not accessible here", instance.name);
                continue;
            }
            candidates.insert(Candidate::Declared(instance));
        }
        Ok(())
    }
}

/// Type parameters bound by every enclosing generic method or type of `scope`
pub fn frozen_variables(registry: &Registry, scope: ScopeId) -> Result<FrozenVariables, RegistryError> {
    let mut frozen = FrozenVariables::new();
    for level in registry.scope_chain(scope)? {
        let scope = registry.scope(level)?;
        if scope.kind.is_generic() {
            frozen.extend(scope.type_params.iter().map(|param| param.var_id));
        }
    }
    Ok(frozen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConceptDeclaration, InstanceDeclaration};
    use crate::types::{ConceptRef, Type};
    use pretty_assertions::assert_eq;

    fn show(ty: Type) -> ConceptRef {
        ConceptRef::new("Show", vec![ty])
    }

    fn create_registry() -> Registry {
        let mut registry = Registry::new();
        let t = registry.type_param("T");
        registry
            .declare_concept(ConceptDeclaration::new("Show", vec![t]))
            .unwrap();
        registry
    }

    #[test]
    fn test_collects_from_every_level() {
        let mut registry = create_registry();
        let root = registry.root();
        let app = registry.declare_namespace(root, "app").unwrap();

        registry
            .declare_instance(root, InstanceDeclaration::new("ShowInt").provides(show(Type::concrete("Int"))))
            .unwrap();
        registry
            .declare_instance(app, InstanceDeclaration::new("ShowBool").provides(show(Type::concrete("Bool"))))
            .unwrap();

        let candidates = CandidateCollector::new(&registry).collect(app).unwrap();

        assert_eq!(candidates.names(), vec!["ShowBool", "ShowInt"]);
    }

    #[test]
    fn test_imports_are_deduplicated() {
        let mut registry = create_registry();
        let root = registry.root();
        let lib = registry.declare_namespace(root, "lib").unwrap();
        let app = registry.declare_namespace(root, "app").unwrap();
        let inner = registry.declare_namespace(app, "inner").unwrap();

        registry
            .declare_instance(lib, InstanceDeclaration::new("ShowInt").provides(show(Type::concrete("Int"))))
            .unwrap();
        registry.add_import(app, lib).unwrap();
        registry.add_import(inner, lib).unwrap();

        let candidates = CandidateCollector::new(&registry).collect(inner).unwrap();

        assert_eq!(candidates.names(), vec!["ShowInt"]);
    }

    #[test]
    fn test_unimported_namespaces_are_invisible() {
        let mut registry = create_registry();
        let root = registry.root();
        let lib = registry.declare_namespace(root, "lib").unwrap();
        let app = registry.declare_namespace(root, "app").unwrap();

        registry
            .declare_instance(lib, InstanceDeclaration::new("ShowInt").provides(show(Type::concrete("Int"))))
            .unwrap();

        let candidates = CandidateCollector::new(&registry).collect(app).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_nested_instances_are_excluded() {
        let mut registry = create_registry();
        let root = registry.root();

        let outer = registry
            .declare_instance(root, InstanceDeclaration::new("ShowInt").provides(show(Type::concrete("Int"))))
            .unwrap();
        registry
            .declare_instance(
                root,
                InstanceDeclaration::new("ShowIntInner")
                    .provides(show(Type::concrete("Int")))
                    .member_of(outer),
            )
            .unwrap();

        let candidates = CandidateCollector::new(&registry).collect(root).unwrap();
        assert_eq!(candidates.names(), vec!["ShowInt"]);
    }

    #[test]
    fn test_private_instances_stay_in_their_scope() {
        let mut registry = create_registry();
        let root = registry.root();
        let lib = registry.declare_namespace(root, "lib").unwrap();
        let nested = registry.declare_namespace(lib, "nested").unwrap();
        let app = registry.declare_namespace(root, "app").unwrap();

        registry
            .declare_instance(
                lib,
                InstanceDeclaration::new("ShowSecret")
                    .provides(show(Type::concrete("Secret")))
                    .private(),
            )
            .unwrap();
        registry.add_import(app, lib).unwrap();

        let collector = CandidateCollector::new(&registry);
        assert_eq!(collector.collect(nested).unwrap().names(), vec!["ShowSecret"]);
        assert!(collector.collect(app).unwrap().is_empty());
    }

    #[test]
    fn test_custom_accessibility_predicate() {
        let mut registry = create_registry();
        let root = registry.root();

        registry
            .declare_instance(root, InstanceDeclaration::new("ShowInt").provides(show(Type::concrete("Int"))))
            .unwrap();
        registry
            .declare_instance(root, InstanceDeclaration::new("ShowBool").provides(show(Type::concrete("Bool"))))
            .unwrap();

        let only_int = |instance: &InstanceDefinition, _: &[ScopeId]| instance.name == "ShowInt";
        let candidates = CandidateCollector::with_accessibility(&registry, only_int)
            .collect(root)
            .unwrap();

        assert_eq!(candidates.names(), vec!["ShowInt"]);
    }

    #[test]
    fn test_ambient_witnesses_and_frozen_variables() {
        let mut registry = create_registry();
        let root = registry.root();

        let a = registry.type_param("A");
        let w = registry.witness_param("W", vec![show(a.as_type())]);
        let method = registry
            .declare_method_scope(root, "describe", vec![a.clone(), w.clone()])
            .unwrap();

        let candidates = CandidateCollector::new(&registry).collect(method).unwrap();
        assert!(candidates.contains(CandidateKey::Ambient(w.var_id)));
        assert!(!candidates.contains(CandidateKey::Ambient(a.var_id)));

        let frozen = frozen_variables(&registry, method).unwrap();
        assert!(frozen.contains(a.var_id));
        assert!(frozen.contains(w.var_id));
        assert_eq!(frozen.len(), 2);
    }
}
