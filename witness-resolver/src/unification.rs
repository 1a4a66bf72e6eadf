//! Type unification for witness resolution
//!
//! Structural, first-order unification over [`Type`] with one twist: variables in
//! the frozen set belong to an enclosing generic scope and may never become
//! substitution targets. Unification rules:
//! 1. Apply the current substitution to both sides
//! 2. Identical variables unify trivially
//! 3. A non-frozen variable binds to the other side (with occurs check)
//! 4. A frozen variable facing anything but itself is a capture violation
//! 5. Constructed types unify when constructor and arity agree and all arguments unify
//! 6. Cross-category unification always fails

use crate::error::UnificationError;
use crate::types::{ConceptRef, FrozenVariables, Substitution, Type, TypeVarId};

/// Result type for unification operations
pub type UnificationResult<T = ()> = Result<T, UnificationError>;

/// Unifier parameterised by the frozen variables of the query site
#[derive(Debug, Clone, Copy)]
pub struct Unifier<'a> {
    frozen: &'a FrozenVariables,
}

impl<'a> Unifier<'a> {
    pub fn new(frozen: &'a FrozenVariables) -> Self {
        Self { frozen }
    }

    /// Unify two types, extending `subst` in place
    ///
    /// On failure `subst` may hold partial bindings; use [`Unifier::try_unify`]
    /// when the caller needs all-or-nothing behaviour.
    pub fn unify(
        &self,
        provided: &Type,
        required: &Type,
        subst: &mut Substitution,
    ) -> UnificationResult {
        let provided = subst.apply(provided);
        let required = subst.apply(required);

        match (&provided, &required) {
            (Type::Variable { var_id: a, .. }, Type::Variable { var_id: b, .. }) if a == b => Ok(()),

            (Type::Variable { var_id, .. }, _) if !self.frozen.contains(*var_id) => {
                self.bind_variable(*var_id, &provided, &required, subst)
            }
            (_, Type::Variable { var_id, .. }) if !self.frozen.contains(*var_id) => {
                self.bind_variable(*var_id, &required, &provided, subst)
            }

            // Whatever is left facing a variable faces a frozen one
            (Type::Variable { .. }, _) => Err(UnificationError::CaptureViolation {
                var_name: provided.to_string(),
                attempted: required.clone(),
            }),
            (_, Type::Variable { .. }) => Err(UnificationError::CaptureViolation {
                var_name: required.to_string(),
                attempted: provided.clone(),
            }),

            (
                Type::Concrete {
                    id: id1,
                    args: args1,
                },
                Type::Concrete {
                    id: id2,
                    args: args2,
                },
            ) => {
                if id1 != id2 {
                    return Err(UnificationError::TypeMismatch {
                        expected: required.clone(),
                        found: provided.clone(),
                    });
                }

                if args1.len() != args2.len() {
                    return Err(UnificationError::ArityMismatch {
                        type_name: id1.name().to_string(),
                        expected_arity: args2.len(),
                        found_arity: args1.len(),
                    });
                }

                for (arg1, arg2) in args1.iter().zip(args2.iter()) {
                    self.unify(arg1, arg2, subst)?;
                }

                Ok(())
            }

            (Type::Tuple(elems1), Type::Tuple(elems2)) => {
                if elems1.len() != elems2.len() {
                    return Err(UnificationError::TypeMismatch {
                        expected: required.clone(),
                        found: provided.clone(),
                    });
                }

                for (elem1, elem2) in elems1.iter().zip(elems2.iter()) {
                    self.unify(elem1, elem2, subst)?;
                }

                Ok(())
            }

            (
                Type::Function {
                    params: params1,
                    return_type: ret1,
                },
                Type::Function {
                    params: params2,
                    return_type: ret2,
                },
            ) => {
                if params1.len() != params2.len() {
                    return Err(UnificationError::TypeMismatch {
                        expected: required.clone(),
                        found: provided.clone(),
                    });
                }

                for (param1, param2) in params1.iter().zip(params2.iter()) {
                    self.unify(param1, param2, subst)?;
                }

                self.unify(ret1, ret2, subst)
            }

            _ => Err(UnificationError::TypeMismatch {
                expected: required.clone(),
                found: provided.clone(),
            }),
        }
    }

    /// Unify two capability references argument-wise
    pub fn unify_concepts(
        &self,
        provided: &ConceptRef,
        required: &ConceptRef,
        subst: &mut Substitution,
    ) -> UnificationResult {
        if provided.concept != required.concept {
            return Err(UnificationError::ConceptMismatch {
                expected: required.to_string(),
                found: provided.to_string(),
            });
        }

        if provided.args.len() != required.args.len() {
            return Err(UnificationError::ArityMismatch {
                type_name: provided.concept.name().to_string(),
                expected_arity: required.args.len(),
                found_arity: provided.args.len(),
            });
        }

        for (arg1, arg2) in provided.args.iter().zip(required.args.iter()) {
            self.unify(arg1, arg2, subst)?;
        }

        Ok(())
    }

    /// All-or-nothing unification: `subst` is only extended on success
    pub fn try_unify(
        &self,
        provided: &Type,
        required: &Type,
        subst: &mut Substitution,
    ) -> UnificationResult {
        let mut trial = subst.clone();
        self.unify(provided, required, &mut trial)?;
        *subst = trial;
        Ok(())
    }

    /// All-or-nothing unification of capability references
    pub fn try_unify_concepts(
        &self,
        provided: &ConceptRef,
        required: &ConceptRef,
        subst: &mut Substitution,
    ) -> UnificationResult {
        let mut trial = subst.clone();
        self.unify_concepts(provided, required, &mut trial)?;
        *subst = trial;
        Ok(())
    }

    fn bind_variable(
        &self,
        var_id: TypeVarId,
        variable: &Type,
        ty: &Type,
        subst: &mut Substitution,
    ) -> UnificationResult {
        if ty.contains_var(var_id) {
            return Err(UnificationError::OccursCheckViolation {
                var_name: variable.to_string(),
                containing_type: ty.clone(),
            });
        }

        log::trace!("binding {variable} := {ty}");
        subst.bind(var_id, ty.clone())
    }
}

/// Boolean form of unification used by the resolution engine
///
/// Returns `true` and extends `subst` when `provided` and `required` unify without
/// binding any frozen variable; leaves `subst` untouched otherwise.
pub fn unify(
    provided: &Type,
    required: &Type,
    frozen: &FrozenVariables,
    subst: &mut Substitution,
) -> bool {
    Unifier::new(frozen).try_unify(provided, required, subst).is_ok()
}

/// One-way matching: does `general` cover `specific`?
///
/// Only the variables of `general` may be bound; every variable of `specific`
/// (and everything in `frozen`) is treated as rigid.
pub fn instance_of(specific: &ConceptRef, general: &ConceptRef, frozen: &FrozenVariables) -> bool {
    let mut rigid = frozen.clone();
    let mut specific_vars = Vec::new();
    specific.collect_variables(&mut specific_vars);
    rigid.extend(specific_vars);

    let mut subst = Substitution::new();
    Unifier::new(&rigid)
        .unify_concepts(general, specific, &mut subst)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(id: u32, name: &str) -> Type {
        Type::named_variable(TypeVarId(id), name)
    }

    fn list(arg: Type) -> Type {
        Type::generic_concrete("List", vec![arg])
    }

    #[test]
    fn test_exact_match_unification() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        assert!(unify(&Type::concrete("Int"), &Type::concrete("Int"), &frozen, &mut subst));
        assert!(subst.is_empty());
    }

    #[test]
    fn test_variable_binds_to_concrete() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        assert!(unify(&list(var(0, "T")), &list(Type::concrete("Int")), &frozen, &mut subst));
        assert_eq!(subst.apply(&var(0, "T")), Type::concrete("Int"));
    }

    #[test]
    fn test_frozen_variable_is_never_bound() {
        let frozen: FrozenVariables = [TypeVarId(0)].into_iter().collect();
        let mut subst = Substitution::new();

        let result = Unifier::new(&frozen).unify(&var(0, "A"), &Type::concrete("Int"), &mut subst);

        assert!(matches!(result, Err(UnificationError::CaptureViolation { .. })));
        assert!(subst.is_empty());
    }

    #[test]
    fn test_frozen_variable_unifies_with_itself_and_free_variables() {
        let frozen: FrozenVariables = [TypeVarId(0)].into_iter().collect();
        let mut subst = Substitution::new();

        assert!(unify(&var(0, "A"), &var(0, "A"), &frozen, &mut subst));
        assert!(unify(&var(1, "T"), &var(0, "A"), &frozen, &mut subst));
        assert_eq!(subst.apply(&var(1, "T")), var(0, "A"));
        assert!(!subst.contains(TypeVarId(0)));
    }

    #[test]
    fn test_shared_substitution_pins_later_constraints() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        assert!(unify(&var(0, "T"), &Type::concrete("Int"), &frozen, &mut subst));
        assert!(!unify(&var(0, "T"), &Type::concrete("Bool"), &frozen, &mut subst));
        assert!(unify(&var(0, "T"), &Type::concrete("Int"), &frozen, &mut subst));
    }

    #[test]
    fn test_failed_unification_leaves_substitution_untouched() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        let provided = Type::tuple(vec![var(0, "T"), Type::concrete("Int")]);
        let required = Type::tuple(vec![Type::concrete("Bool"), Type::concrete("String")]);

        assert!(!unify(&provided, &required, &frozen, &mut subst));
        assert!(subst.is_empty());
    }

    #[test]
    fn test_occurs_check() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        let result = Unifier::new(&frozen).unify(&var(0, "T"), &list(var(0, "T")), &mut subst);

        assert!(matches!(
            result,
            Err(UnificationError::OccursCheckViolation { .. })
        ));
    }

    #[test]
    fn test_arity_mismatch_error() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        let result = Unifier::new(&frozen).unify(
            &Type::generic_concrete("Map", vec![Type::concrete("Int")]),
            &Type::generic_concrete("Map", vec![Type::concrete("Int"), Type::concrete("Int")]),
            &mut subst,
        );

        assert_eq!(
            result,
            Err(UnificationError::ArityMismatch {
                type_name: "Map".to_string(),
                expected_arity: 2,
                found_arity: 1,
            })
        );
    }

    #[test]
    fn test_function_unification() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        let provided = Type::function(vec![var(0, "A")], Type::concrete("Bool"));
        let required = Type::function(vec![Type::concrete("Int")], var(1, "R"));

        assert!(unify(&provided, &required, &frozen, &mut subst));
        assert_eq!(subst.apply(&var(0, "A")), Type::concrete("Int"));
        assert_eq!(subst.apply(&var(1, "R")), Type::concrete("Bool"));
    }

    #[test]
    fn test_concepts_must_match_by_name() {
        let frozen = FrozenVariables::new();
        let mut subst = Substitution::new();

        let show = ConceptRef::new("Show", vec![var(0, "T")]);
        let ord = ConceptRef::new("Ord", vec![Type::concrete("Int")]);

        let result = Unifier::new(&frozen).try_unify_concepts(&show, &ord, &mut subst);
        assert!(matches!(result, Err(UnificationError::ConceptMismatch { .. })));
    }

    #[test]
    fn test_instance_of_is_one_way() {
        let frozen = FrozenVariables::new();

        let general = ConceptRef::new("Where", vec![var(0, "T")]);
        let specific = ConceptRef::new("Where", vec![Type::generic_concrete("Array", vec![var(1, "E")])]);

        assert!(instance_of(&specific, &general, &frozen));
        assert!(!instance_of(&general, &specific, &frozen));
    }
}
