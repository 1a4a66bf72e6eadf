//! Witness Resolver
//!
//! Compile-time resolution of concept witnesses with default-implementation synthesis.

#![allow(clippy::uninlined_format_args)]
//!
//! ## Architecture
//!
//! A generic method may declare witness parameters: type parameters that are
//! filled not by argument inference but by finding an instance of a concept.
//! Once ordinary inference has fixed what it can, this crate resolves the rest:
//!
//! - **Registry**: append-only tables of concepts, instances, scopes and imports
//! - **Candidate Collector**: visible instances and ambient witnesses for a call site
//! - **Unifier**: structural unification that never binds frozen variables
//! - **Resolution Engine**: filtering, recursive dependency resolution with a cycle
//!   guard, and specificity-based disambiguation
//! - **Default Carriers**: memoized fallback implementations of a concept's default
//!   methods
//!
//! ## Example
//!
//! ```
//! use witness_resolver::{
//!     ConceptDeclaration, ConceptRef, InstanceDeclaration, Registry, ResolutionEngine,
//!     Substitution, Type,
//! };
//!
//! let mut registry = Registry::new();
//! let t = registry.type_param("T");
//! registry.declare_concept(ConceptDeclaration::new("Ord", vec![t])).unwrap();
//!
//! let root = registry.root();
//! let int = Type::concrete("Int");
//! registry
//!     .declare_instance(root, InstanceDeclaration::new("OrdInt").provides(ConceptRef::new("Ord", vec![int.clone()])))
//!     .unwrap();
//!
//! let witness = registry.witness_param("W", vec![ConceptRef::new("Ord", vec![int])]);
//! let resolution = ResolutionEngine::new(&registry)
//!     .resolve(&witness, root, &Substitution::new())
//!     .unwrap();
//! assert_eq!(resolution.witness.to_string(), "OrdInt");
//! ```

pub mod collector;
pub mod config;
pub mod defaults;
pub mod error;
pub mod inference;
pub mod registry;
pub mod resolution;
pub mod types;
pub mod unification;

// Re-export public API
pub use collector::{
    frozen_variables, Accessibility, Candidate, CandidateCollector, CandidateKey, CandidateSet,
    VisibilityRules,
};
pub use config::{DependencyPolicy, ResolverConfig};
pub use defaults::{
    lookup_member, BoundMember, CarrierMembers, CarrierShell, DefaultCarrier, MemberBinder,
    MemberSource, SignatureBinder,
};
pub use error::{
    FailureTag, InferenceError, RegistryError, ResolutionError, SynthesisError, UnificationError,
    WitnessError,
};
pub use inference::{WitnessInference, WitnessOutcome, WitnessReport};
pub use registry::{
    ConceptDeclaration, ConceptDefinition, ConceptFragment, InstanceDeclaration,
    InstanceDefinition, InstanceId, MethodDeclaration, Registry, Scope, ScopeId, ScopeKind,
    Visibility,
};
pub use resolution::{Resolution, ResolutionEngine, Witness, WitnessArgument};
pub use types::{
    ConceptId, ConceptRef, FrozenVariables, ParameterKind, Substitution, Type, TypeId,
    TypeParameter, TypeVarGenerator, TypeVarId,
};
pub use unification::{instance_of, unify, Unifier};

#[cfg(test)]
mod tests;
