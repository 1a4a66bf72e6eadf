//! Witness resolution engine
//!
//! Given one unresolved witness parameter, finds the unique instance that satisfies
//! all of its capability constraints:
//!
//! 1. Apply the context substitution to the declared constraints and drop the
//!    ones implied by others
//! 2. Keep every candidate whose provided capabilities cover each required one,
//!    accumulating one substitution per candidate
//! 3. Recursively resolve the witness parameters that step 2 left open,
//!    discarding candidates whose dependencies fail or re-enter a goal in flight
//! 4. Pick the single survivor, or the unique most specific one when overlap
//!    is permitted
//!
//! Each query owns its substitutions, fresh-variable supply and in-flight stack;
//! the registry is only read.

use crate::collector::{frozen_variables, Candidate, CandidateCollector, CandidateSet};
use crate::config::{DependencyPolicy, ResolverConfig};
use crate::error::{display_concepts, ResolutionError, WitnessError};
use crate::registry::{InstanceId, Registry, ScopeId};
use crate::types::{
    ConceptRef, FrozenVariables, ParameterKind, Substitution, Type, TypeParameter, TypeVarGenerator,
    TypeVarId,
};
use crate::unification::{instance_of, Unifier};
use std::fmt;

/// A resolved witness term
///
/// Instances that depend on further witnesses carry them as arguments, giving the
/// nested dictionary term the caller elaborates into (`OrdList<Int, OrdInt>`).
#[derive(Debug, Clone, PartialEq)]
pub enum Witness {
    /// The witness supplied by the caller of an enclosing generic
    Ambient { var_id: TypeVarId, name: String },
    Instance {
        instance: InstanceId,
        name: String,
        arguments: Vec<WitnessArgument>,
    },
}

/// Argument for one type parameter of a resolved instance
#[derive(Debug, Clone, PartialEq)]
pub enum WitnessArgument {
    Type(Type),
    Witness(Witness),
}

impl Witness {
    pub fn name(&self) -> &str {
        match self {
            Self::Ambient { name, .. } | Self::Instance { name, .. } => name,
        }
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::Instance { instance, .. } => Some(*instance),
            Self::Ambient { .. } => None,
        }
    }

    /// Witnesses passed directly to this one
    pub fn nested(&self) -> impl Iterator<Item = &Witness> + '_ {
        let arguments: &[WitnessArgument] = match self {
            Self::Instance { arguments, .. } => arguments,
            Self::Ambient { .. } => &[],
        };
        arguments.iter().filter_map(|argument| match argument {
            WitnessArgument::Witness(witness) => Some(witness),
            WitnessArgument::Type(_) => None,
        })
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient { name, .. } => write!(f, "{name}"),
            Self::Instance {
                name, arguments, ..
            } => {
                write!(f, "{name}")?;
                if !arguments.is_empty() {
                    write!(f, "<")?;
                    for (i, argument) in arguments.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        match argument {
                            WitnessArgument::Type(ty) => write!(f, "{ty}")?,
                            WitnessArgument::Witness(witness) => write!(f, "{witness}")?,
                        }
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

/// Successful resolution of one witness parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub witness: Witness,
    /// The context substitution extended with every query variable the chosen
    /// instance determined
    pub substitution: Substitution,
}

pub struct ResolutionEngine<'r> {
    registry: &'r Registry,
    config: ResolverConfig,
}

impl<'r> ResolutionEngine<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_config(registry, ResolverConfig::default())
    }

    pub fn with_config(registry: &'r Registry, config: ResolverConfig) -> Self {
        Self { registry, config }
    }

    /// Resolve `witness` as seen from `scope`
    pub fn resolve(
        &self,
        witness: &TypeParameter,
        scope: ScopeId,
        context: &Substitution,
    ) -> Result<Resolution, WitnessError> {
        let candidates = CandidateCollector::new(self.registry).collect(scope)?;
        let frozen = frozen_variables(self.registry, scope)?;
        Ok(self.resolve_with_candidates(witness, &candidates, context, &frozen)?)
    }

    /// Resolve `witness` against an explicit candidate set
    pub fn resolve_with_candidates(
        &self,
        witness: &TypeParameter,
        candidates: &CandidateSet<'r>,
        context: &Substitution,
        frozen: &FrozenVariables,
    ) -> Result<Resolution, ResolutionError> {
        let mut search = Search {
            registry: self.registry,
            config: &self.config,
            candidates,
            frozen,
            vars: TypeVarGenerator::starting_at(self.fresh_seed(witness, context, frozen)),
            stack: Vec::new(),
        };

        let solved = search.solve(&witness.name, witness.constraints(), context, 0)?;

        let mut query_vars = Vec::new();
        for constraint in witness.constraints() {
            context
                .apply_concept(constraint)
                .collect_variables(&mut query_vars);
        }

        let mut substitution = context.clone();
        for var_id in query_vars {
            if frozen.contains(var_id) {
                continue;
            }
            let ty = solved.substitution.apply(&Type::variable(var_id));
            if ty.as_variable() != Some(var_id) {
                substitution.insert(var_id, ty);
            }
        }

        log::debug!("resolved {} to {}", witness.name, solved.witness);
        Ok(Resolution {
            witness: solved.witness,
            substitution,
        })
    }

    /// First variable id not used by the registry or the query
    fn fresh_seed(
        &self,
        witness: &TypeParameter,
        context: &Substitution,
        frozen: &FrozenVariables,
    ) -> u32 {
        let mut seen = vec![witness.var_id];
        for constraint in witness.constraints() {
            constraint.collect_variables(&mut seen);
        }
        for (var_id, ty) in context.iter() {
            seen.push(var_id);
            ty.collect_variables(&mut seen);
        }
        seen.extend(frozen.iter());

        let query_max = seen.iter().map(|var_id| var_id.0 + 1).max().unwrap_or(0);
        query_max.max(self.registry.var_watermark())
    }
}

struct Solved {
    witness: Witness,
    substitution: Substitution,
}

/// A candidate whose provided capabilities cover the required set
struct Matched<'r> {
    candidate: Candidate<'r>,
    substitution: Substitution,
    /// Provided capability used for each required capability, before substitution
    patterns: Vec<ConceptRef>,
    /// Instance type parameters renamed to fresh variables
    params: Vec<TypeParameter>,
}

struct Survivor<'r> {
    candidate: Candidate<'r>,
    substitution: Substitution,
    patterns: Vec<ConceptRef>,
    witness: Witness,
}

enum Rejection {
    Dependency(ResolutionError),
    UnresolvedDependency,
}

/// A candidate being tried for a goal on the current recursion path
struct InFlight {
    goal: String,
    name: String,
}

struct Search<'a, 'r> {
    registry: &'r Registry,
    config: &'a ResolverConfig,
    candidates: &'a CandidateSet<'r>,
    frozen: &'a FrozenVariables,
    vars: TypeVarGenerator,
    stack: Vec<InFlight>,
}

impl<'a, 'r> Search<'a, 'r> {
    fn solve(
        &mut self,
        label: &str,
        constraints: &[ConceptRef],
        context: &Substitution,
        depth: usize,
    ) -> Result<Solved, ResolutionError> {
        if depth > self.config.max_depth {
            log::debug!("giving up on {label}: depth limit {} reached", self.config.max_depth);
            return Err(ResolutionError::RecursionLimit {
                witness: label.to_string(),
                limit: self.config.max_depth,
            });
        }

        let applied: Vec<ConceptRef> = constraints
            .iter()
            .map(|constraint| context.apply_concept(constraint))
            .collect();
        let required = if self.config.minimize_required {
            self.registry.minimize_required(&applied)
        } else {
            applied
        };
        let goal = self.canonical_goal(&required);
        log::debug!("{}resolving {label}: {goal}", "  ".repeat(depth));

        // Re-entering a goal that is already being solved fails for every candidate
        if let Some(start) = self.stack.iter().position(|entry| entry.goal == goal) {
            let mut path: Vec<String> = self.stack[start..]
                .iter()
                .map(|entry| format!("{} for {}", entry.name, entry.goal))
                .collect();
            path.push(format!("{label} for {goal}"));
            log::debug!("cycle detected: {}", path.join(" -> "));
            return Err(ResolutionError::CyclicDependency {
                witness: label.to_string(),
                path,
            });
        }

        let candidates = self.candidates;
        let mut matched = Vec::new();
        for &candidate in candidates.iter() {
            match self.match_candidate(candidate, &required, context) {
                Some(found) => matched.push(found),
                None => log::trace!("{candidate} does not provide {goal}"),
            }
        }

        if matched.is_empty() {
            return Err(ResolutionError::NoInstance {
                witness: label.to_string(),
                required,
                rejected: Vec::new(),
            });
        }

        let mut survivors = Vec::new();
        let mut rejections = Vec::new();
        for found in matched {
            let name = found.candidate.name();
            match self.resolve_dependencies(found, &goal, depth) {
                Ok(survivor) => survivors.push(survivor),
                Err(rejection) => {
                    log::trace!("{name} rejected for {goal}");
                    rejections.push((name, rejection));
                }
            }
        }

        let chosen = self.choose(label, required, survivors, rejections)?;
        log::debug!("{}{label} := {}", "  ".repeat(depth), chosen.witness);
        Ok(chosen)
    }

    /// Filtering pass for one candidate
    fn match_candidate(
        &mut self,
        candidate: Candidate<'r>,
        required: &[ConceptRef],
        context: &Substitution,
    ) -> Option<Matched<'r>> {
        let (declared, params) = match candidate {
            Candidate::Ambient(param) => (param.constraints().to_vec(), Vec::new()),
            Candidate::Declared(instance) => {
                let mut renaming = Substitution::new();
                for param in &instance.type_params {
                    renaming.insert(
                        param.var_id,
                        Type::named_variable(self.vars.fresh_id(), param.name.clone()),
                    );
                }
                let params = instance
                    .type_params
                    .iter()
                    .map(|param| instantiate_param(param, &renaming))
                    .collect();
                let declared = instance
                    .provides
                    .iter()
                    .map(|concept_ref| renaming.apply_concept(concept_ref))
                    .collect();
                (declared, params)
            }
        };
        let provided = self.registry.expand_provided(&declared);

        let unifier = Unifier::new(self.frozen);
        let mut substitution = context.clone();
        let mut patterns = Vec::with_capacity(required.len());
        for requirement in required {
            let pattern = provided.iter().find(|capability| {
                unifier
                    .try_unify_concepts(capability, requirement, &mut substitution)
                    .is_ok()
            })?;
            patterns.push(pattern.clone());
        }

        Some(Matched {
            candidate,
            substitution,
            patterns,
            params,
        })
    }

    /// Dependency pass for one matched candidate
    fn resolve_dependencies(
        &mut self,
        found: Matched<'r>,
        goal: &str,
        depth: usize,
    ) -> Result<Survivor<'r>, Rejection> {
        let instance = match found.candidate {
            Candidate::Ambient(param) => {
                return Ok(Survivor {
                    candidate: found.candidate,
                    substitution: found.substitution,
                    patterns: found.patterns,
                    witness: Witness::Ambient {
                        var_id: param.var_id,
                        name: param.name.clone(),
                    },
                });
            }
            Candidate::Declared(instance) => instance,
        };

        // Witness parameters already fixed by the filtering pass are not solved again
        let open: Vec<&TypeParameter> = found
            .params
            .iter()
            .filter(|param| param.is_witness() && self.is_open(param, &found.substitution))
            .collect();
        if !open.is_empty() && self.config.dependency_policy == DependencyPolicy::RejectUnresolved {
            return Err(Rejection::UnresolvedDependency);
        }

        self.stack.push(InFlight {
            goal: goal.to_string(),
            name: instance.name.clone(),
        });
        let resolved = self.resolve_params(&open, found.substitution, depth);
        self.stack.pop();
        let (substitution, witnesses) = resolved.map_err(Rejection::Dependency)?;

        let mut witnesses = witnesses.into_iter();
        let arguments = found
            .params
            .iter()
            .map(|param| {
                let solved = open
                    .iter()
                    .any(|dependency| dependency.var_id == param.var_id)
                    .then(|| witnesses.next())
                    .flatten();
                match solved {
                    Some(witness) => WitnessArgument::Witness(witness),
                    None => WitnessArgument::Type(substitution.apply(&param.as_type())),
                }
            })
            .collect();

        Ok(Survivor {
            candidate: found.candidate,
            substitution,
            patterns: found.patterns,
            witness: Witness::Instance {
                instance: instance.id,
                name: instance.name.clone(),
                arguments,
            },
        })
    }

    /// A parameter still standing for itself, or for another free variable
    fn is_open(&self, param: &TypeParameter, substitution: &Substitution) -> bool {
        substitution
            .apply(&param.as_type())
            .as_variable()
            .is_some_and(|var_id| !self.frozen.contains(var_id))
    }

    /// Resolve the open witness parameters of an instance in declaration order
    fn resolve_params(
        &mut self,
        params: &[&TypeParameter],
        mut substitution: Substitution,
        depth: usize,
    ) -> Result<(Substitution, Vec<Witness>), ResolutionError> {
        let mut witnesses = Vec::new();
        for param in params {
            let solved = self.solve(&param.name, param.constraints(), &substitution, depth + 1)?;
            substitution = solved.substitution;
            witnesses.push(solved.witness);
        }
        Ok((substitution, witnesses))
    }

    /// Disambiguation
    fn choose(
        &self,
        label: &str,
        required: Vec<ConceptRef>,
        mut survivors: Vec<Survivor<'r>>,
        rejections: Vec<(&str, Rejection)>,
    ) -> Result<Solved, ResolutionError> {
        if survivors.is_empty() {
            return Err(self.explain_rejections(label, required, rejections));
        }

        if survivors.len() > 1 {
            let Some(winner) = self.most_specific(&survivors) else {
                return Err(ResolutionError::AmbiguousInstance {
                    witness: label.to_string(),
                    required,
                    candidates: survivors
                        .iter()
                        .map(|survivor| survivor.candidate.name().to_string())
                        .collect(),
                });
            };
            survivors.swap(0, winner);
        }

        let winner = survivors.swap_remove(0);
        Ok(Solved {
            witness: winner.witness,
            substitution: winner.substitution,
        })
    }

    /// Index of the unique strictly most specific survivor, if overlap allows it to win
    fn most_specific(&self, survivors: &[Survivor<'r>]) -> Option<usize> {
        let winner = (0..survivors.len()).find(|&i| {
            (0..survivors.len()).all(|j| {
                i == j
                    || (self.at_least_as_specific(&survivors[i], &survivors[j])
                        && !self.at_least_as_specific(&survivors[j], &survivors[i]))
            })
        })?;

        let overlap_permitted = survivors.iter().enumerate().all(|(j, other)| {
            j == winner
                || other.candidate.is_overlappable()
                || survivors[winner].candidate.is_overlappable()
        });
        overlap_permitted.then_some(winner)
    }

    /// `a` applies to no more situations than `b`
    fn at_least_as_specific(&self, a: &Survivor<'r>, b: &Survivor<'r>) -> bool {
        a.patterns
            .iter()
            .zip(b.patterns.iter())
            .all(|(specific, general)| instance_of(specific, general, self.frozen))
    }

    fn explain_rejections(
        &self,
        label: &str,
        required: Vec<ConceptRef>,
        rejections: Vec<(&str, Rejection)>,
    ) -> ResolutionError {
        let limit_hit = rejections.iter().any(|(_, rejection)| {
            matches!(
                rejection,
                Rejection::Dependency(ResolutionError::RecursionLimit { .. })
            )
        });
        if limit_hit {
            return ResolutionError::RecursionLimit {
                witness: label.to_string(),
                limit: self.config.max_depth,
            };
        }

        let cycle = rejections.iter().find_map(|(_, rejection)| match rejection {
            Rejection::Dependency(ResolutionError::CyclicDependency { path, .. }) => {
                Some(path.clone())
            }
            _ => None,
        });
        if let Some(path) = cycle {
            return ResolutionError::CyclicDependency {
                witness: label.to_string(),
                path,
            };
        }

        log::debug!(
            "no instance for {label}: {} (rejected {})",
            display_concepts(&required),
            rejections.len()
        );
        ResolutionError::NoInstance {
            witness: label.to_string(),
            required,
            rejected: rejections
                .into_iter()
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }

    /// Goal text with non-frozen variables renamed by first appearance
    fn canonical_goal(&self, required: &[ConceptRef]) -> String {
        let mut vars = Vec::new();
        for requirement in required {
            requirement.collect_variables(&mut vars);
        }

        let canonical: Vec<ConceptRef> = required
            .iter()
            .map(|requirement| {
                requirement.map_variables(&mut |var_id, _| {
                    if self.frozen.contains(var_id) {
                        return Type::variable(var_id);
                    }
                    let position = vars.iter().position(|seen| *seen == var_id).unwrap_or(0);
                    Type::named_variable(TypeVarId(position as u32), format!("_{position}"))
                })
            })
            .collect();

        display_concepts(&canonical)
    }
}

fn instantiate_param(param: &TypeParameter, renaming: &Substitution) -> TypeParameter {
    let var_id = renaming
        .apply(&Type::variable(param.var_id))
        .as_variable()
        .unwrap_or(param.var_id);
    let kind = match &param.kind {
        ParameterKind::Ordinary => ParameterKind::Ordinary,
        ParameterKind::Witness { constraints } => ParameterKind::Witness {
            constraints: constraints
                .iter()
                .map(|constraint| renaming.apply_concept(constraint))
                .collect(),
        },
    };
    TypeParameter {
        var_id,
        name: param.name.clone(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConceptDeclaration, InstanceDeclaration};
    use pretty_assertions::assert_eq;

    fn ord(ty: Type) -> ConceptRef {
        ConceptRef::new("Ord", vec![ty])
    }

    #[test]
    fn test_single_candidate_resolves() {
        let mut registry = Registry::new();
        let t = registry.type_param("T");
        registry
            .declare_concept(ConceptDeclaration::new("Ord", vec![t]))
            .unwrap();
        let root = registry.root();
        registry
            .declare_instance(root, InstanceDeclaration::new("OrdInt").provides(ord(Type::concrete("Int"))))
            .unwrap();
        let w = registry.witness_param("W", vec![ord(Type::concrete("Int"))]);

        let engine = ResolutionEngine::new(&registry);
        let resolution = engine.resolve(&w, root, &Substitution::new()).unwrap();

        assert_eq!(resolution.witness.to_string(), "OrdInt");
        assert!(resolution.substitution.is_empty());
    }

    #[test]
    fn test_witness_display_nests_arguments() {
        let witness = Witness::Instance {
            instance: InstanceId(1),
            name: "OrdList".to_string(),
            arguments: vec![
                WitnessArgument::Type(Type::concrete("Int")),
                WitnessArgument::Witness(Witness::Instance {
                    instance: InstanceId(0),
                    name: "OrdInt".to_string(),
                    arguments: vec![],
                }),
            ],
        };

        assert_eq!(witness.to_string(), "OrdList<Int, OrdInt>");
        assert_eq!(witness.nested().count(), 1);
    }

    #[test]
    fn test_canonical_goal_ignores_fresh_numbering() {
        let registry = Registry::new();
        let config = ResolverConfig::default();
        let candidates = CandidateSet::new();
        let frozen: FrozenVariables = [TypeVarId(1)].into_iter().collect();
        let search = Search {
            registry: &registry,
            config: &config,
            candidates: &candidates,
            frozen: &frozen,
            vars: TypeVarGenerator::new(),
            stack: Vec::new(),
        };

        let first = search.canonical_goal(&[ord(Type::generic_concrete(
            "Pair",
            vec![Type::variable(TypeVarId(10)), Type::variable(TypeVarId(1))],
        ))]);
        let second = search.canonical_goal(&[ord(Type::generic_concrete(
            "Pair",
            vec![Type::variable(TypeVarId(20)), Type::variable(TypeVarId(1))],
        ))]);

        assert_eq!(first, second);
        assert_eq!(first, "Ord<Pair<_0, ?1>>");
    }
}
