//! Declaration registry for concepts, instances and scopes
//!
//! The registry is an append-only table built once per compilation unit. All
//! declaration methods take `&mut self`; every query used during resolution
//! takes `&self`, so a finished registry can be shared between threads.

use crate::defaults::DefaultCarrier;
use crate::error::RegistryError;
use crate::types::{ConceptId, ConceptRef, Substitution, Type, TypeParameter, TypeVarGenerator, TypeVarId};
use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of a lexical scope (namespace, type or method body)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Identifier of a declared instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Namespace,
    /// Body of a generic type; its type parameters are in scope
    Type,
    /// Body of a generic method; its type parameters are in scope
    Method,
}

impl ScopeKind {
    /// Whether the scope binds type parameters
    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Type | Self::Method)
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub type_params: Vec<TypeParameter>,
    /// Namespaces whose instances are visible here
    pub imports: Vec<ScopeId>,
    /// Instances declared directly in this scope, in declaration order
    pub instances: Vec<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    /// Visible only from the declaring scope and scopes nested inside it
    Private,
}

/// A method declared by a concept
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDeclaration {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Unbound default body, if the concept supplies one
    pub default_body: Option<String>,
}

impl MethodDeclaration {
    pub fn new(name: impl Into<String>, params: Vec<Type>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            default_body: None,
        }
    }

    pub fn with_default(mut self, body: impl Into<String>) -> Self {
        self.default_body = Some(body.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default_body.is_some()
    }

    /// The method's signature as a function type
    pub fn signature(&self) -> Type {
        Type::function(self.params.clone(), self.return_type.clone())
    }
}

/// One syntax fragment of a concept body
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptFragment {
    Method(MethodDeclaration),
    /// Anything that is not a method declaration (doc blocks, associated constants...)
    Other(String),
}

/// A concept as handed to [`Registry::declare_concept`]
#[derive(Debug, Clone)]
pub struct ConceptDeclaration {
    pub name: String,
    pub params: Vec<TypeParameter>,
    pub parents: Vec<ConceptRef>,
    pub fragments: Vec<ConceptFragment>,
}

impl ConceptDeclaration {
    pub fn new(name: impl Into<String>, params: Vec<TypeParameter>) -> Self {
        Self {
            name: name.into(),
            params,
            parents: Vec::new(),
            fragments: Vec::new(),
        }
    }

    /// Declare a parent concept; its arguments range over this concept's parameters
    pub fn extends(mut self, parent: ConceptRef) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn with_method(mut self, method: MethodDeclaration) -> Self {
        self.fragments.push(ConceptFragment::Method(method));
        self
    }

    pub fn with_fragment(mut self, fragment: ConceptFragment) -> Self {
        self.fragments.push(fragment);
        self
    }
}

/// A registered concept
#[derive(Debug)]
pub struct ConceptDefinition {
    pub id: ConceptId,
    pub params: Vec<TypeParameter>,
    pub parents: Vec<ConceptRef>,
    pub fragments: Vec<ConceptFragment>,
    /// Variable reserved for the default carrier's witness parameter
    pub(crate) carrier_witness: TypeVarId,
    pub(crate) carrier: OnceCell<Arc<DefaultCarrier>>,
}

impl ConceptDefinition {
    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// The concept applied to its own parameters (`Ord<T>`)
    pub fn self_reference(&self) -> ConceptRef {
        ConceptRef {
            concept: self.id.clone(),
            args: self.params.iter().map(TypeParameter::as_type).collect(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDeclaration> + '_ {
        self.fragments.iter().filter_map(|fragment| match fragment {
            ConceptFragment::Method(method) => Some(method),
            ConceptFragment::Other(_) => None,
        })
    }

    pub fn has_defaults(&self) -> bool {
        self.methods().any(MethodDeclaration::has_default)
    }
}

/// An instance as handed to [`Registry::declare_instance`]
#[derive(Debug, Clone)]
pub struct InstanceDeclaration {
    pub name: String,
    pub type_params: Vec<TypeParameter>,
    pub provides: Vec<ConceptRef>,
    pub overlappable: bool,
    pub visibility: Visibility,
    pub member_of: Option<InstanceId>,
    pub implemented_members: Vec<String>,
}

impl InstanceDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            provides: Vec::new(),
            overlappable: false,
            visibility: Visibility::Public,
            member_of: None,
            implemented_members: Vec::new(),
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParameter>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn provides(mut self, concept: ConceptRef) -> Self {
        self.provides.push(concept);
        self
    }

    pub fn overlappable(mut self) -> Self {
        self.overlappable = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// Declare this instance as a member of another instance
    pub fn member_of(mut self, container: InstanceId) -> Self {
        self.member_of = Some(container);
        self
    }

    pub fn implements(mut self, member: impl Into<String>) -> Self {
        self.implemented_members.push(member.into());
        self
    }
}

/// A registered instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDefinition {
    pub id: InstanceId,
    pub name: String,
    pub scope: ScopeId,
    pub type_params: Vec<TypeParameter>,
    pub provides: Vec<ConceptRef>,
    pub overlappable: bool,
    pub visibility: Visibility,
    pub member_of: Option<InstanceId>,
    pub implemented_members: Vec<String>,
}

impl InstanceDefinition {
    pub fn implements(&self, member: &str) -> bool {
        self.implemented_members.iter().any(|name| name == member)
    }
}

/// Append-only declaration tables
#[derive(Debug)]
pub struct Registry {
    concepts: HashMap<ConceptId, ConceptDefinition>,
    instances: Vec<InstanceDefinition>,
    scopes: Vec<Scope>,
    /// Edges point from a concept to each of its parents
    inheritance: DiGraph<ConceptId, ()>,
    concept_nodes: HashMap<ConceptId, NodeIndex>,
    vars: TypeVarGenerator,
}

impl Registry {
    /// Create a registry containing only the root namespace
    pub fn new() -> Self {
        Self {
            concepts: HashMap::new(),
            instances: Vec::new(),
            scopes: vec![Scope {
                id: ScopeId(0),
                kind: ScopeKind::Namespace,
                name: "<root>".to_string(),
                parent: None,
                type_params: Vec::new(),
                imports: Vec::new(),
                instances: Vec::new(),
            }],
            inheritance: DiGraph::new(),
            concept_nodes: HashMap::new(),
            vars: TypeVarGenerator::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    // Variables

    pub fn fresh_var(&mut self) -> TypeVarId {
        self.vars.fresh_id()
    }

    /// Allocate an ordinary type parameter
    pub fn type_param(&mut self, name: impl Into<String>) -> TypeParameter {
        TypeParameter::ordinary(self.fresh_var(), name)
    }

    /// Allocate a witness type parameter
    pub fn witness_param(
        &mut self,
        name: impl Into<String>,
        constraints: Vec<ConceptRef>,
    ) -> TypeParameter {
        TypeParameter::witness(self.fresh_var(), name, constraints)
    }

    /// First variable id never used by any declaration
    pub fn var_watermark(&self) -> u32 {
        self.vars.peek()
    }

    fn reserve_vars(&mut self, params: &[TypeParameter], refs: &[ConceptRef]) {
        let mut seen: Vec<TypeVarId> = params.iter().map(|param| param.var_id).collect();
        for param in params {
            for constraint in param.constraints() {
                constraint.collect_variables(&mut seen);
            }
        }
        for concept_ref in refs {
            concept_ref.collect_variables(&mut seen);
        }

        if let Some(max) = seen.iter().map(|var| var.0).max() {
            if max >= self.vars.peek() {
                self.vars = TypeVarGenerator::starting_at(max + 1);
            }
        }
    }

    // Scopes

    pub fn declare_namespace(
        &mut self,
        parent: ScopeId,
        name: impl Into<String>,
    ) -> Result<ScopeId, RegistryError> {
        self.push_scope(parent, ScopeKind::Namespace, name.into(), Vec::new())
    }

    pub fn declare_type_scope(
        &mut self,
        parent: ScopeId,
        name: impl Into<String>,
        type_params: Vec<TypeParameter>,
    ) -> Result<ScopeId, RegistryError> {
        self.push_scope(parent, ScopeKind::Type, name.into(), type_params)
    }

    pub fn declare_method_scope(
        &mut self,
        parent: ScopeId,
        name: impl Into<String>,
        type_params: Vec<TypeParameter>,
    ) -> Result<ScopeId, RegistryError> {
        self.push_scope(parent, ScopeKind::Method, name.into(), type_params)
    }

    fn push_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: String,
        type_params: Vec<TypeParameter>,
    ) -> Result<ScopeId, RegistryError> {
        self.scope(parent)?;
        for param in &type_params {
            for constraint in param.constraints() {
                self.check_concept_ref(constraint)?;
            }
        }
        self.reserve_vars(&type_params, &[]);

        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            name,
            parent: Some(parent),
            type_params,
            imports: Vec::new(),
            instances: Vec::new(),
        });
        Ok(id)
    }

    /// Make the instances of `imported` visible from `scope`
    pub fn add_import(&mut self, scope: ScopeId, imported: ScopeId) -> Result<(), RegistryError> {
        self.scope(imported)?;
        let target = self
            .scopes
            .get_mut(scope.0 as usize)
            .ok_or(RegistryError::UndefinedScope { scope: scope.0 })?;
        if !target.imports.contains(&imported) {
            target.imports.push(imported);
        }
        Ok(())
    }

    pub fn scope(&self, id: ScopeId) -> Result<&Scope, RegistryError> {
        self.scopes
            .get(id.0 as usize)
            .ok_or(RegistryError::UndefinedScope { scope: id.0 })
    }

    /// The scope and all its ancestors, innermost first
    pub fn scope_chain(&self, id: ScopeId) -> Result<Vec<ScopeId>, RegistryError> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = self.scope(scope_id)?;
            chain.push(scope_id);
            current = scope.parent;
        }
        Ok(chain)
    }

    // Concepts

    pub fn declare_concept(&mut self, decl: ConceptDeclaration) -> Result<ConceptId, RegistryError> {
        let id = ConceptId::new(decl.name.clone());
        if self.concepts.contains_key(&id) {
            return Err(RegistryError::DuplicateConcept {
                concept_name: decl.name,
            });
        }

        for parent in &decl.parents {
            if parent.concept == id {
                return Err(RegistryError::CyclicInheritance {
                    concept_name: decl.name,
                });
            }
            self.check_concept_ref(parent)?;
        }

        let node = self.inheritance.add_node(id.clone());
        for parent in &decl.parents {
            if let Some(&parent_node) = self.concept_nodes.get(&parent.concept) {
                self.inheritance.add_edge(node, parent_node, ());
            }
        }
        if algo::is_cyclic_directed(&self.inheritance) {
            self.inheritance.remove_node(node);
            return Err(RegistryError::CyclicInheritance {
                concept_name: decl.name,
            });
        }
        self.concept_nodes.insert(id.clone(), node);

        self.reserve_vars(&decl.params, &decl.parents);
        let carrier_witness = self.fresh_var();

        log::debug!("declared concept {}", id.name());
        self.concepts.insert(
            id.clone(),
            ConceptDefinition {
                id: id.clone(),
                params: decl.params,
                parents: decl.parents,
                fragments: decl.fragments,
                carrier_witness,
                carrier: OnceCell::new(),
            },
        );
        Ok(id)
    }

    pub fn concept(&self, id: &ConceptId) -> Result<&ConceptDefinition, RegistryError> {
        self.concepts
            .get(id)
            .ok_or_else(|| RegistryError::UndefinedConcept {
                concept_name: id.name().to_string(),
            })
    }

    fn check_concept_ref(&self, concept_ref: &ConceptRef) -> Result<(), RegistryError> {
        let concept = self.concept(&concept_ref.concept)?;
        if concept.params.len() != concept_ref.args.len() {
            return Err(RegistryError::ConceptArityMismatch {
                concept_name: concept.name().to_string(),
                expected: concept.params.len(),
                found: concept_ref.args.len(),
            });
        }
        Ok(())
    }

    /// Every ancestor of `concept_ref`, instantiated through the parent references
    pub fn ancestors(&self, concept_ref: &ConceptRef) -> Vec<ConceptRef> {
        let mut found = IndexSet::new();
        self.collect_ancestors(concept_ref, &mut found);
        found.into_iter().collect()
    }

    fn collect_ancestors(&self, concept_ref: &ConceptRef, found: &mut IndexSet<ConceptRef>) {
        let Ok(concept) = self.concept(&concept_ref.concept) else {
            return;
        };

        let mut instantiation = Substitution::new();
        for (param, arg) in concept.params.iter().zip(concept_ref.args.iter()) {
            instantiation.insert(param.var_id, arg.clone());
        }

        for parent in &concept.parents {
            let parent = instantiation.apply_concept(parent);
            if found.insert(parent.clone()) {
                self.collect_ancestors(&parent, found);
            }
        }
    }

    /// Whether satisfying `stronger` already guarantees `weaker`
    pub fn implies(&self, stronger: &ConceptRef, weaker: &ConceptRef) -> bool {
        let (Some(&from), Some(&to)) = (
            self.concept_nodes.get(&stronger.concept),
            self.concept_nodes.get(&weaker.concept),
        ) else {
            return false;
        };
        if from == to || !algo::has_path_connecting(&self.inheritance, from, to, None) {
            return false;
        }
        self.ancestors(stronger).contains(weaker)
    }

    /// Capabilities provided by a list of declared capabilities, ancestors included
    pub fn expand_provided(&self, provides: &[ConceptRef]) -> Vec<ConceptRef> {
        let mut expanded = IndexSet::new();
        for concept_ref in provides {
            expanded.insert(concept_ref.clone());
            expanded.extend(self.ancestors(concept_ref));
        }
        expanded.into_iter().collect()
    }

    /// Drop duplicates and every constraint implied by another constraint in the set
    pub fn minimize_required(&self, required: &[ConceptRef]) -> Vec<ConceptRef> {
        let unique: IndexSet<ConceptRef> = required.iter().cloned().collect();
        unique
            .iter()
            .filter(|candidate| {
                !unique
                    .iter()
                    .any(|other| other != *candidate && self.implies(other, candidate))
            })
            .cloned()
            .collect()
    }

    // Instances

    pub fn declare_instance(
        &mut self,
        scope: ScopeId,
        decl: InstanceDeclaration,
    ) -> Result<InstanceId, RegistryError> {
        if self.scope(scope)?.kind == ScopeKind::Method {
            return Err(RegistryError::InstanceInMethodScope {
                instance_name: decl.name,
            });
        }
        if let Some(container) = decl.member_of {
            self.instance(container)?;
        }
        for concept_ref in &decl.provides {
            self.check_concept_ref(concept_ref)?;
        }
        for param in &decl.type_params {
            for constraint in param.constraints() {
                self.check_concept_ref(constraint)?;
            }
        }
        self.reserve_vars(&decl.type_params, &decl.provides);

        let id = InstanceId(self.instances.len() as u32);
        log::debug!("declared instance {} in scope {}", decl.name, scope);
        self.instances.push(InstanceDefinition {
            id,
            name: decl.name,
            scope,
            type_params: decl.type_params,
            provides: decl.provides,
            overlappable: decl.overlappable,
            visibility: decl.visibility,
            member_of: decl.member_of,
            implemented_members: decl.implemented_members,
        });
        if let Some(scope) = self.scopes.get_mut(scope.0 as usize) {
            scope.instances.push(id);
        }
        Ok(id)
    }

    pub fn instance(&self, id: InstanceId) -> Result<&InstanceDefinition, RegistryError> {
        self.instances
            .get(id.0 as usize)
            .ok_or(RegistryError::UndefinedInstance { instance: id.0 })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
