//! Default-implementation carriers
//!
//! A concept that gives default bodies to some of its methods gets one synthesized
//! carrier: a zero-size implementation generic over a single witness parameter
//! constrained by the concept itself. Instances that omit an overridable method
//! fall back to the carrier's member.
//!
//! Construction happens in two phases. The shell (identity, name, witness
//! parameter) is built once per concept behind the concept's `OnceCell`; the
//! member list is bound later, on first request, behind a second `OnceCell`. The
//! binder only ever sees the shell, so it can read the carrier's parameter list
//! without re-entering member computation.

use crate::error::{RegistryError, SynthesisError};
use crate::registry::{ConceptFragment, InstanceId, MethodDeclaration, Registry};
use crate::resolution::Witness;
use crate::types::{ConceptId, Type, TypeParameter, TypeVarId};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Identity and parameter list of a carrier; available before any member is bound
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierShell {
    pub concept: ConceptId,
    pub name: String,
    /// The single witness parameter, constrained by the concept being defaulted
    pub witness: TypeParameter,
}

/// A default method realized as a carrier member
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMember {
    pub name: String,
    /// Name of the carrier owning the member
    pub owner: String,
    pub signature: Type,
    pub body: String,
}

/// Turns default-method fragments into bound members
pub trait MemberBinder {
    fn bind(&self, shell: &CarrierShell, method: &MethodDeclaration) -> Result<BoundMember, SynthesisError>;
}

impl<F> MemberBinder for F
where
    F: Fn(&CarrierShell, &MethodDeclaration) -> Result<BoundMember, SynthesisError>,
{
    fn bind(&self, shell: &CarrierShell, method: &MethodDeclaration) -> Result<BoundMember, SynthesisError> {
        self(shell, method)
    }
}

/// Binds a default method as-is, keeping its declared signature
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureBinder;

impl MemberBinder for SignatureBinder {
    fn bind(&self, shell: &CarrierShell, method: &MethodDeclaration) -> Result<BoundMember, SynthesisError> {
        let body = method.default_body.clone().unwrap_or_default();
        if body.trim().is_empty() {
            return Err(SynthesisError::BindingFailed {
                method_name: method.name.clone(),
                reason: "default body is empty".to_string(),
            });
        }

        Ok(BoundMember {
            name: method.name.clone(),
            owner: shell.name.clone(),
            signature: method.signature(),
            body,
        })
    }
}

/// Members of a carrier together with the diagnostics produced while binding them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarrierMembers {
    members: IndexMap<String, BoundMember>,
    diagnostics: Vec<SynthesisError>,
}

impl CarrierMembers {
    pub fn get(&self, name: &str) -> Option<&BoundMember> {
        self.members.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundMember> + '_ {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn diagnostics(&self) -> &[SynthesisError] {
        &self.diagnostics
    }
}

#[derive(Debug)]
pub struct DefaultCarrier {
    shell: CarrierShell,
    defaults: Vec<MethodDeclaration>,
    members: OnceCell<CarrierMembers>,
}

impl DefaultCarrier {
    fn new(shell: CarrierShell, fragments: &[ConceptFragment]) -> Self {
        // Only method declarations with a body become members
        let defaults = fragments
            .iter()
            .filter_map(|fragment| match fragment {
                ConceptFragment::Method(method) if method.has_default() => Some(method.clone()),
                _ => None,
            })
            .collect();

        Self {
            shell,
            defaults,
            members: OnceCell::new(),
        }
    }

    pub fn shell(&self) -> &CarrierShell {
        &self.shell
    }

    pub fn name(&self) -> &str {
        &self.shell.name
    }

    pub fn witness(&self) -> &TypeParameter {
        &self.shell.witness
    }

    /// Whether the member list has been computed
    pub fn is_materialized(&self) -> bool {
        self.members.get().is_some()
    }

    /// Bind the default methods on first request; later calls return the same list
    pub fn members(&self, binder: &dyn MemberBinder) -> &CarrierMembers {
        self.members.get_or_init(|| {
            log::debug!("binding {} default members of {}", self.defaults.len(), self.shell.name);
            let mut bound = CarrierMembers::default();
            for method in &self.defaults {
                match binder.bind(&self.shell, method) {
                    Ok(member) => {
                        bound.members.entry(member.name.clone()).or_insert(member);
                    }
                    Err(error) => {
                        log::debug!("default {} of {} not bound: {error}", method.name, self.shell.name);
                        bound.diagnostics.push(error);
                    }
                }
            }
            bound
        })
    }
}

impl Registry {
    /// The default carrier of `concept`, synthesized on first request
    ///
    /// Returns `None` for concepts without default bodies. Every call for the same
    /// concept returns the same `Arc`, including racing first calls.
    pub fn synthesize_default_carrier(
        &self,
        concept: &ConceptId,
    ) -> Result<Option<Arc<DefaultCarrier>>, RegistryError> {
        let definition = self.concept(concept)?;
        if !definition.has_defaults() {
            return Ok(None);
        }

        let carrier = definition.carrier.get_or_init(|| {
            let shell = CarrierShell {
                concept: definition.id.clone(),
                name: format!("{}.Default", definition.name()),
                witness: TypeParameter::witness(
                    definition.carrier_witness,
                    "__witness",
                    vec![definition.self_reference()],
                ),
            };
            log::debug!("synthesized default carrier {}", shell.name);
            Arc::new(DefaultCarrier::new(shell, &definition.fragments))
        });
        Ok(Some(Arc::clone(carrier)))
    }
}

/// Where a member of a resolved witness comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MemberSource {
    /// The instance implements the member itself
    Instance { instance: InstanceId },
    /// The instance omits the member; the concept's default is used
    Default {
        carrier: Arc<DefaultCarrier>,
        member: BoundMember,
    },
    /// Supplied at runtime by the caller's witness
    Ambient { var_id: TypeVarId },
}

impl PartialEq for DefaultCarrier {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

/// Find `member` of `concept` for a resolved witness
pub fn lookup_member(
    registry: &Registry,
    witness: &Witness,
    concept: &ConceptId,
    member: &str,
    binder: &dyn MemberBinder,
) -> Result<MemberSource, SynthesisError> {
    let instance = match witness {
        Witness::Ambient { var_id, .. } => return Ok(MemberSource::Ambient { var_id: *var_id }),
        Witness::Instance { instance, .. } => registry.instance(*instance)?,
    };

    let provided = registry.expand_provided(&instance.provides);
    if !provided.iter().any(|concept_ref| concept_ref.concept == *concept) {
        return Err(SynthesisError::ConceptNotProvided {
            concept: concept.clone(),
            instance_name: instance.name.clone(),
        });
    }

    if instance.implements(member) {
        return Ok(MemberSource::Instance {
            instance: instance.id,
        });
    }

    let missing = || SynthesisError::MissingMember {
        member_name: member.to_string(),
        instance_name: instance.name.clone(),
    };

    let carrier = registry.synthesize_default_carrier(concept)?.ok_or_else(missing)?;
    let bound = carrier.members(binder).get(member).cloned().ok_or_else(missing)?;

    log::trace!("{} falls back to {}.{}", instance.name, carrier.name(), member);
    Ok(MemberSource::Default {
        carrier,
        member: bound,
    })
}
