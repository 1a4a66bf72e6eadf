//! Type system for witness resolution
//!
//! Type expressions, capability references and the substitution machinery shared
//! by the unifier, the candidate collector and the resolution engine.

use crate::error::UnificationError;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type variable identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub u32);

/// Name of a type constructor (e.g. `Int`, `List`, `Array`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub String);

impl TypeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Capability contract ("concept") identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConceptId(pub String);

impl ConceptId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Type expression
///
/// Variable equality is by identity only; the optional name is carried for
/// diagnostics and never participates in comparisons.
#[derive(Debug, Clone)]
pub enum Type {
    /// Constructed types: Int, List<T>, Array<Int>
    Concrete { id: TypeId, args: Vec<Type> },

    /// Unresolved placeholder: T, ?3
    Variable {
        var_id: TypeVarId,
        name: Option<String>,
    },

    /// Tuple type with ordered elements
    Tuple(Vec<Type>),

    /// Function type: (A, B) -> C
    Function {
        params: Vec<Type>,
        return_type: Box<Type>,
    },
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Concrete { id: id1, args: args1 },
                Self::Concrete { id: id2, args: args2 },
            ) => id1 == id2 && args1 == args2,
            (Self::Variable { var_id: v1, .. }, Self::Variable { var_id: v2, .. }) => v1 == v2,
            (Self::Tuple(elems1), Self::Tuple(elems2)) => elems1 == elems2,
            (
                Self::Function {
                    params: params1,
                    return_type: ret1,
                },
                Self::Function {
                    params: params2,
                    return_type: ret2,
                },
            ) => params1 == params2 && ret1 == ret2,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Concrete { id, args } => {
                id.hash(state);
                args.hash(state);
            }
            Self::Variable { var_id, .. } => var_id.hash(state),
            Self::Tuple(elements) => elements.hash(state),
            Self::Function {
                params,
                return_type,
            } => {
                params.hash(state);
                return_type.hash(state);
            }
        }
    }
}

impl Type {
    /// Create a concrete type with no generic arguments
    pub fn concrete(name: impl Into<String>) -> Self {
        Self::Concrete {
            id: TypeId::new(name),
            args: vec![],
        }
    }

    /// Create a generic concrete type (e.g., List<T>)
    pub fn generic_concrete(name: impl Into<String>, args: Vec<Type>) -> Self {
        Self::Concrete {
            id: TypeId::new(name),
            args,
        }
    }

    /// Create an anonymous type variable
    pub fn variable(var_id: TypeVarId) -> Self {
        Self::Variable { var_id, name: None }
    }

    /// Create a named type variable
    pub fn named_variable(var_id: TypeVarId, name: impl Into<String>) -> Self {
        Self::Variable {
            var_id,
            name: Some(name.into()),
        }
    }

    /// Create a tuple type
    pub fn tuple(elements: Vec<Type>) -> Self {
        Self::Tuple(elements)
    }

    /// Create a function type
    pub fn function(params: Vec<Type>, return_type: Type) -> Self {
        Self::Function {
            params,
            return_type: Box::new(return_type),
        }
    }

    /// The variable id if this type is a bare variable
    pub fn as_variable(&self) -> Option<TypeVarId> {
        match self {
            Self::Variable { var_id, .. } => Some(*var_id),
            _ => None,
        }
    }

    /// Check if this type contains the given type variable (for occurs check)
    pub fn contains_var(&self, target_var: TypeVarId) -> bool {
        match self {
            Self::Variable { var_id, .. } => *var_id == target_var,
            Self::Concrete { args, .. } | Self::Tuple(args) => {
                args.iter().any(|arg| arg.contains_var(target_var))
            }
            Self::Function {
                params,
                return_type,
            } => {
                params.iter().any(|param| param.contains_var(target_var))
                    || return_type.contains_var(target_var)
            }
        }
    }

    /// Collect free variables in order of first appearance
    pub fn collect_variables(&self, out: &mut Vec<TypeVarId>) {
        match self {
            Self::Variable { var_id, .. } => {
                if !out.contains(var_id) {
                    out.push(*var_id);
                }
            }
            Self::Concrete { args, .. } | Self::Tuple(args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Self::Function {
                params,
                return_type,
            } => {
                for param in params {
                    param.collect_variables(out);
                }
                return_type.collect_variables(out);
            }
        }
    }

    /// Rebuild the type, replacing every variable via `f`
    pub fn map_variables(&self, f: &mut impl FnMut(TypeVarId, &Option<String>) -> Type) -> Type {
        match self {
            Self::Variable { var_id, name } => f(*var_id, name),
            Self::Concrete { id, args } => Self::Concrete {
                id: id.clone(),
                args: args.iter().map(|arg| arg.map_variables(f)).collect(),
            },
            Self::Tuple(elements) => {
                Self::Tuple(elements.iter().map(|elem| elem.map_variables(f)).collect())
            }
            Self::Function {
                params,
                return_type,
            } => Self::Function {
                params: params.iter().map(|param| param.map_variables(f)).collect(),
                return_type: Box::new(return_type.map_variables(f)),
            },
        }
    }
}

/// A capability constraint: a concept applied to type arguments (`Ord<T>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConceptRef {
    pub concept: ConceptId,
    pub args: Vec<Type>,
}

impl ConceptRef {
    pub fn new(concept: impl Into<String>, args: Vec<Type>) -> Self {
        Self {
            concept: ConceptId::new(concept),
            args,
        }
    }

    pub fn contains_var(&self, target_var: TypeVarId) -> bool {
        self.args.iter().any(|arg| arg.contains_var(target_var))
    }

    pub fn collect_variables(&self, out: &mut Vec<TypeVarId>) {
        for arg in &self.args {
            arg.collect_variables(out);
        }
    }

    pub fn map_variables(
        &self,
        f: &mut impl FnMut(TypeVarId, &Option<String>) -> Type,
    ) -> ConceptRef {
        ConceptRef {
            concept: self.concept.clone(),
            args: self.args.iter().map(|arg| arg.map_variables(f)).collect(),
        }
    }
}

/// How a type parameter gets its argument
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// Fixed by ordinary argument inference
    Ordinary,
    /// Fixed by finding an instance satisfying every listed constraint
    Witness { constraints: Vec<ConceptRef> },
}

/// A declared type parameter of a method, type, instance or carrier
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParameter {
    pub var_id: TypeVarId,
    pub name: String,
    pub kind: ParameterKind,
}

impl TypeParameter {
    pub fn ordinary(var_id: TypeVarId, name: impl Into<String>) -> Self {
        Self {
            var_id,
            name: name.into(),
            kind: ParameterKind::Ordinary,
        }
    }

    pub fn witness(var_id: TypeVarId, name: impl Into<String>, constraints: Vec<ConceptRef>) -> Self {
        Self {
            var_id,
            name: name.into(),
            kind: ParameterKind::Witness { constraints },
        }
    }

    pub fn is_witness(&self) -> bool {
        matches!(self.kind, ParameterKind::Witness { .. })
    }

    /// Declared capability constraints (empty for ordinary parameters)
    pub fn constraints(&self) -> &[ConceptRef] {
        match &self.kind {
            ParameterKind::Witness { constraints } => constraints,
            ParameterKind::Ordinary => &[],
        }
    }

    /// The parameter as a type expression
    pub fn as_type(&self) -> Type {
        Type::named_variable(self.var_id, self.name.clone())
    }
}

/// Variables bound by an enclosing generic scope; unification must never bind them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrozenVariables {
    vars: HashSet<TypeVarId>,
}

impl FrozenVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var_id: TypeVarId) {
        self.vars.insert(var_id);
    }

    pub fn contains(&self, var_id: TypeVarId) -> bool {
        self.vars.contains(&var_id)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeVarId> + '_ {
        self.vars.iter().copied()
    }
}

impl FromIterator<TypeVarId> for FrozenVariables {
    fn from_iter<I: IntoIterator<Item = TypeVarId>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl Extend<TypeVarId> for FrozenVariables {
    fn extend<I: IntoIterator<Item = TypeVarId>>(&mut self, iter: I) {
        self.vars.extend(iter);
    }
}

/// Substitution mapping type variables to types
///
/// Insertion-ordered so that iteration (and therefore anything derived from it)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    mappings: IndexMap<TypeVarId, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping, replacing any previous one
    pub fn insert(&mut self, var_id: TypeVarId, ty: Type) {
        self.mappings.insert(var_id, ty);
    }

    /// Add a mapping, refusing to retarget a variable at a different type
    pub fn bind(&mut self, var_id: TypeVarId, ty: Type) -> Result<(), UnificationError> {
        match self.mappings.get(&var_id) {
            Some(existing) if self.apply(existing) != self.apply(&ty) => {
                Err(UnificationError::ConflictingSubstitution {
                    var_name: format!("?{}", var_id.0),
                    existing: self.apply(existing),
                    attempted: ty,
                })
            }
            Some(_) => Ok(()),
            None => {
                self.mappings.insert(var_id, ty);
                Ok(())
            }
        }
    }

    /// Get the type that a variable maps to
    pub fn get(&self, var_id: TypeVarId) -> Option<&Type> {
        self.mappings.get(&var_id)
    }

    pub fn contains(&self, var_id: TypeVarId) -> bool {
        self.mappings.contains_key(&var_id)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Variables with a mapping, in insertion order
    pub fn variables(&self) -> impl Iterator<Item = TypeVarId> + '_ {
        self.mappings.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeVarId, &Type)> + '_ {
        self.mappings.iter().map(|(var_id, ty)| (*var_id, ty))
    }

    /// Apply this substitution to a type, recursively resolving variables
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Variable { var_id, .. } => match self.get(*var_id) {
                Some(substituted) => self.apply(substituted),
                None => ty.clone(),
            },
            Type::Concrete { id, args } => Type::Concrete {
                id: id.clone(),
                args: args.iter().map(|arg| self.apply(arg)).collect(),
            },
            Type::Tuple(elements) => {
                Type::Tuple(elements.iter().map(|elem| self.apply(elem)).collect())
            }
            Type::Function {
                params,
                return_type,
            } => Type::Function {
                params: params.iter().map(|param| self.apply(param)).collect(),
                return_type: Box::new(self.apply(return_type)),
            },
        }
    }

    /// Apply this substitution to every argument of a capability reference
    pub fn apply_concept(&self, concept_ref: &ConceptRef) -> ConceptRef {
        ConceptRef {
            concept: concept_ref.concept.clone(),
            args: concept_ref.args.iter().map(|arg| self.apply(arg)).collect(),
        }
    }

    /// Whether a variable is still unresolved under this substitution
    pub fn is_unresolved(&self, var_id: TypeVarId) -> bool {
        self.apply(&Type::variable(var_id)).as_variable() == Some(var_id)
    }

    /// Compose this substitution with another (self applied first)
    pub fn compose(&self, other: &Substitution) -> Substitution {
        let mut result = Substitution::new();

        for (&var_id, ty) in &self.mappings {
            result.insert(var_id, other.apply(ty));
        }

        for (&var_id, ty) in &other.mappings {
            if !result.mappings.contains_key(&var_id) {
                result.insert(var_id, ty.clone());
            }
        }

        result
    }
}

/// Type variable generator for creating fresh variables
#[derive(Debug, Clone)]
pub struct TypeVarGenerator {
    next_id: u32,
}

impl TypeVarGenerator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Start handing out ids at `first`
    pub fn starting_at(first: u32) -> Self {
        Self { next_id: first }
    }

    /// Generate a fresh variable id
    pub fn fresh_id(&mut self) -> TypeVarId {
        let var_id = TypeVarId(self.next_id);
        self.next_id += 1;
        var_id
    }

    /// The id the next call to `fresh_id` will return
    pub fn peek(&self) -> u32 {
        self.next_id
    }
}

impl Default for TypeVarGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Type]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

/// Display implementation for types (for error messages)
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete { id, args } => {
                write!(f, "{}", id.name())?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    write_args(f, args)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Self::Variable {
                name: Some(name), ..
            } => write!(f, "{name}"),
            Self::Variable { var_id, .. } => write!(f, "?{}", var_id.0),
            Self::Tuple(elements) => {
                write!(f, "(")?;
                write_args(f, elements)?;
                write!(f, ")")
            }
            Self::Function {
                params,
                return_type,
            } => {
                write!(f, "(")?;
                write_args(f, params)?;
                write!(f, ") -> {return_type}")
            }
        }
    }
}

impl fmt::Display for ConceptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.concept.name())?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            write_args(f, &self.args)?;
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var_id, ty)) in self.mappings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "?{} := {ty}", var_id.0)?;
        }
        write!(f, "}}")
    }
}
