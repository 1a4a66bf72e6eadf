//! Error types for witness resolution
//!
//! Following the miette patterns used across the compiler for consistent error reporting.
//! Resolution failures are returned as values; the caller decides how to turn them
//! into diagnostics at the call site.

use crate::types::{ConceptId, ConceptRef, Type};
use miette::Diagnostic;
use thiserror::Error;

/// Main error type combining every failure this crate can report
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum WitnessError {
    #[error("Witness resolution failed")]
    #[diagnostic(code(witness::resolution_failed))]
    Resolution(#[from] ResolutionError),

    #[error("Invalid declaration")]
    #[diagnostic(code(witness::registry_error))]
    Registry(#[from] RegistryError),

    #[error("Witness inference is not applicable")]
    #[diagnostic(code(witness::inference_error))]
    Inference(#[from] InferenceError),

    #[error("Default implementation synthesis failed")]
    #[diagnostic(code(witness::synthesis_error))]
    Synthesis(#[from] SynthesisError),
}

/// Unification errors
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum UnificationError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    #[diagnostic(
        code(witness::unification::type_mismatch),
        help("The types {expected} and {found} cannot be unified")
    )]
    TypeMismatch { expected: Type, found: Type },

    #[error(
        "Arity mismatch: {type_name} expects {expected_arity} type arguments, found {found_arity}"
    )]
    #[diagnostic(
        code(witness::unification::arity_mismatch),
        help("Ensure all generic type arguments are provided correctly")
    )]
    ArityMismatch {
        type_name: String,
        expected_arity: usize,
        found_arity: usize,
    },

    #[error("Concept mismatch: expected {expected}, found {found}")]
    #[diagnostic(
        code(witness::unification::concept_mismatch),
        help("Different concepts never unify")
    )]
    ConceptMismatch { expected: String, found: String },

    #[error("Occurs check violation: variable {var_name} occurs in {containing_type}")]
    #[diagnostic(
        code(witness::unification::occurs_check),
        help("This would create an infinite type")
    )]
    OccursCheckViolation {
        var_name: String,
        containing_type: Type,
    },

    #[error("Variable {var_name} is bound by an enclosing scope and cannot be substituted with {attempted}")]
    #[diagnostic(
        code(witness::unification::capture_violation),
        help("An instance cannot satisfy a constraint by rebinding a type parameter the caller already fixed")
    )]
    CaptureViolation { var_name: String, attempted: Type },

    #[error("Variable {var_name} is already substituted with {existing}, cannot also substitute {attempted}")]
    #[diagnostic(code(witness::unification::conflicting_substitution))]
    ConflictingSubstitution {
        var_name: String,
        existing: Type,
        attempted: Type,
    },
}

/// Coarse classification of a failed resolution, for callers that only need the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTag {
    NoInstance,
    AmbiguousInstance,
    CyclicDependency,
}

/// Failure to resolve one witness parameter
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("No instance found for {witness}: {}", display_concepts(.required))]
    #[diagnostic(
        code(witness::resolution::no_instance),
        help("Declare or import an instance providing the required concepts")
    )]
    NoInstance {
        witness: String,
        required: Vec<ConceptRef>,
        /// Candidates that matched the constraints but whose own dependencies failed
        rejected: Vec<String>,
    },

    #[error("Ambiguous instance for {witness}: {} all satisfy {}", .candidates.join(", "), display_concepts(.required))]
    #[diagnostic(
        code(witness::resolution::ambiguous_instance),
        help("Remove one of the instances, make one strictly more specific, or mark the general one as overlappable")
    )]
    AmbiguousInstance {
        witness: String,
        required: Vec<ConceptRef>,
        candidates: Vec<String>,
    },

    #[error("Cyclic instance dependency while resolving {witness}: {}", .path.join(" -> "))]
    #[diagnostic(
        code(witness::resolution::cyclic_dependency),
        help("Instances in this chain require each other without a base case")
    )]
    CyclicDependency { witness: String, path: Vec<String> },

    #[error("Instance resolution for {witness} exceeded the depth limit of {limit}")]
    #[diagnostic(
        code(witness::resolution::recursion_limit),
        help("An instance dependency keeps producing larger constraints; this usually means there is no base case")
    )]
    RecursionLimit { witness: String, limit: usize },
}

impl ResolutionError {
    pub fn tag(&self) -> FailureTag {
        match self {
            Self::NoInstance { .. } => FailureTag::NoInstance,
            Self::AmbiguousInstance { .. } => FailureTag::AmbiguousInstance,
            Self::CyclicDependency { .. } | Self::RecursionLimit { .. } => {
                FailureTag::CyclicDependency
            }
        }
    }

    pub fn witness(&self) -> &str {
        match self {
            Self::NoInstance { witness, .. }
            | Self::AmbiguousInstance { witness, .. }
            | Self::CyclicDependency { witness, .. }
            | Self::RecursionLimit { witness, .. } => witness,
        }
    }
}

/// Declaration table errors
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Undefined concept: {concept_name}")]
    #[diagnostic(
        code(witness::registry::undefined_concept),
        help("Declare the concept before referring to it")
    )]
    UndefinedConcept { concept_name: String },

    #[error("Concept {concept_name} is already declared")]
    #[diagnostic(code(witness::registry::duplicate_concept))]
    DuplicateConcept { concept_name: String },

    #[error("Concept {concept_name} expects {expected} type arguments, found {found}")]
    #[diagnostic(code(witness::registry::concept_arity))]
    ConceptArityMismatch {
        concept_name: String,
        expected: usize,
        found: usize,
    },

    #[error("Concept {concept_name} inherits from itself")]
    #[diagnostic(
        code(witness::registry::cyclic_inheritance),
        help("Concept inheritance must form a hierarchy")
    )]
    CyclicInheritance { concept_name: String },

    #[error("Undefined scope #{scope}")]
    #[diagnostic(code(witness::registry::undefined_scope))]
    UndefinedScope { scope: u32 },

    #[error("Undefined instance #{instance}")]
    #[diagnostic(code(witness::registry::undefined_instance))]
    UndefinedInstance { instance: u32 },

    #[error("Instance {instance_name} cannot be declared inside a method")]
    #[diagnostic(
        code(witness::registry::instance_in_method),
        help("Declare instances in a namespace or a type")
    )]
    InstanceInMethodScope { instance_name: String },
}

/// Errors from the witness inference phase driver
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Type parameter {parameter_name} is not fixed and is not a concept witness")]
    #[diagnostic(
        code(witness::inference::unfixed_parameter),
        help("Only witness parameters can be inferred from instances; supply {parameter_name} explicitly")
    )]
    UnfixedOrdinaryParameter { parameter_name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from default-implementation synthesis and member lookup
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Cannot bind default body of {method_name}: {reason}")]
    #[diagnostic(code(witness::synthesis::binding_failed))]
    BindingFailed { method_name: String, reason: String },

    #[error("Member {member_name} is neither implemented by {instance_name} nor defaulted by its concepts")]
    #[diagnostic(
        code(witness::synthesis::missing_member),
        help("Implement {member_name} in the instance or give it a default body in the concept")
    )]
    MissingMember {
        member_name: String,
        instance_name: String,
    },

    #[error("Instance {instance_name} does not provide concept {}", .concept.name())]
    #[diagnostic(code(witness::synthesis::concept_not_provided))]
    ConceptNotProvided {
        concept: ConceptId,
        instance_name: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),
}

/// Comma-separated rendering used by error messages
pub fn display_concepts(concepts: &[ConceptRef]) -> String {
    concepts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
