//! Witness inference phase
//!
//! Runs after ordinary argument inference has fixed what it can. If every
//! remaining type parameter of the signature is a witness parameter, each one is
//! resolved in declaration order against candidates collected once from the call
//! site. Bindings learned while resolving one witness are visible to the next.

use crate::collector::{frozen_variables, CandidateCollector};
use crate::config::ResolverConfig;
use crate::error::{InferenceError, ResolutionError};
use crate::registry::{Registry, ScopeId};
use crate::resolution::{Resolution, ResolutionEngine, Witness};
use crate::types::{Substitution, Type, TypeParameter, TypeVarId};
use indexmap::IndexMap;

/// Result of resolving one witness parameter
#[derive(Debug, Clone, PartialEq)]
pub struct WitnessOutcome {
    pub parameter: TypeParameter,
    pub result: Result<Resolution, ResolutionError>,
}

impl WitnessOutcome {
    pub fn is_resolved(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WitnessReport {
    pub outcomes: Vec<WitnessOutcome>,
    /// Fixed arguments plus everything learned from successful resolutions
    pub substitution: Substitution,
}

impl WitnessReport {
    pub fn all_resolved(&self) -> bool {
        self.outcomes.iter().all(WitnessOutcome::is_resolved)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TypeParameter, &ResolutionError)> + '_ {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            Ok(_) => None,
            Err(error) => Some((&outcome.parameter, error)),
        })
    }

    /// Witness for every parameter, or the first failure
    pub fn into_bindings(self) -> Result<IndexMap<TypeVarId, Witness>, ResolutionError> {
        self.outcomes
            .into_iter()
            .map(|outcome| {
                outcome
                    .result
                    .map(|resolution| (outcome.parameter.var_id, resolution.witness))
            })
            .collect()
    }
}

pub struct WitnessInference<'r> {
    registry: &'r Registry,
    engine: ResolutionEngine<'r>,
}

impl<'r> WitnessInference<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_config(registry, ResolverConfig::default())
    }

    pub fn with_config(registry: &'r Registry, config: ResolverConfig) -> Self {
        Self {
            registry,
            engine: ResolutionEngine::with_config(registry, config),
        }
    }

    /// Resolve the unfixed parameters of `signature` at a call site in `scope`
    pub fn infer(
        &self,
        signature: &[TypeParameter],
        fixed: &IndexMap<TypeVarId, Type>,
        scope: ScopeId,
    ) -> Result<WitnessReport, InferenceError> {
        if let Some(param) = signature
            .iter()
            .find(|param| !fixed.contains_key(&param.var_id) && !param.is_witness())
        {
            return Err(InferenceError::UnfixedOrdinaryParameter {
                parameter_name: param.name.clone(),
            });
        }

        let mut substitution = Substitution::new();
        for (&var_id, ty) in fixed {
            substitution.insert(var_id, ty.clone());
        }

        let candidates = CandidateCollector::new(self.registry).collect(scope)?;
        let frozen = frozen_variables(self.registry, scope)?;
        log::debug!(
            "witness phase at scope {scope}: {} candidates, {} frozen variables",
            candidates.len(),
            frozen.len()
        );

        let mut outcomes = Vec::new();
        for param in signature.iter().filter(|param| !fixed.contains_key(&param.var_id)) {
            let result =
                self.engine
                    .resolve_with_candidates(param, &candidates, &substitution, &frozen);
            if let Ok(resolution) = &result {
                substitution = resolution.substitution.clone();
            }
            outcomes.push(WitnessOutcome {
                parameter: param.clone(),
                result,
            });
        }

        Ok(WitnessReport {
            outcomes,
            substitution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConceptDeclaration;
    use crate::types::ConceptRef;

    #[test]
    fn test_unfixed_ordinary_parameter_is_rejected() {
        let mut registry = Registry::new();
        let t = registry.type_param("T");
        registry
            .declare_concept(ConceptDeclaration::new("Ord", vec![t]))
            .unwrap();

        let a = registry.type_param("A");
        let w = registry.witness_param("W", vec![ConceptRef::new("Ord", vec![a.as_type()])]);

        let inference = WitnessInference::new(&registry);
        let result = inference.infer(&[a, w], &IndexMap::new(), registry.root());

        assert_eq!(
            result,
            Err(InferenceError::UnfixedOrdinaryParameter {
                parameter_name: "A".to_string()
            })
        );
    }
}
