//! Tests for specificity ordering between overlapping candidates

use crate::collector::{CandidateCollector, CandidateSet};
use crate::error::{FailureTag, ResolutionError};
use crate::registry::{ConceptDeclaration, InstanceDeclaration, Registry};
use crate::resolution::{Resolution, ResolutionEngine, Witness};
use crate::types::{ConceptRef, FrozenVariables, Substitution, Type, TypeParameter};
use pretty_assertions::assert_eq;

fn where_(ty: Type) -> ConceptRef {
    ConceptRef::new("Where", vec![ty])
}

fn enumerable(ty: Type) -> ConceptRef {
    ConceptRef::new("Enumerable", vec![ty])
}

fn array(ty: Type) -> Type {
    Type::generic_concrete("Array", vec![ty])
}

/// A generic `Where` over anything enumerable and a `Where` specialised for arrays
fn create_where_registry(generic_overlappable: bool, array_overlappable: bool) -> Registry {
    let mut registry = Registry::new();
    let t = registry.type_param("T");
    registry
        .declare_concept(ConceptDeclaration::new("Enumerable", vec![t]))
        .unwrap();
    let t = registry.type_param("T");
    registry
        .declare_concept(ConceptDeclaration::new("Where", vec![t]))
        .unwrap();
    let root = registry.root();

    for container in ["Array", "List"] {
        let e = registry.type_param("E");
        registry
            .declare_instance(
                root,
                InstanceDeclaration::new(format!("Enumerable{container}"))
                    .with_type_params(vec![e.clone()])
                    .provides(enumerable(Type::generic_concrete(container, vec![e.as_type()]))),
            )
            .unwrap();
    }

    let t = registry.type_param("T");
    let source = registry.witness_param("Source", vec![enumerable(t.as_type())]);
    let mut generic = InstanceDeclaration::new("WhereEnumerable")
        .with_type_params(vec![t.clone(), source])
        .provides(where_(t.as_type()));
    if generic_overlappable {
        generic = generic.overlappable();
    }
    registry.declare_instance(root, generic).unwrap();

    let e = registry.type_param("E");
    let mut specialised = InstanceDeclaration::new("WhereArray")
        .with_type_params(vec![e.clone()])
        .provides(where_(array(e.as_type())));
    if array_overlappable {
        specialised = specialised.overlappable();
    }
    registry.declare_instance(root, specialised).unwrap();

    registry
}

fn resolve_in_order(
    registry: &Registry,
    witness: &TypeParameter,
    reversed: bool,
) -> Result<Resolution, ResolutionError> {
    let collected = CandidateCollector::new(registry)
        .collect(registry.root())
        .unwrap();
    let candidates: CandidateSet<'_> = if reversed {
        collected.iter().rev().copied().collect()
    } else {
        collected
    };

    ResolutionEngine::new(registry).resolve_with_candidates(
        witness,
        &candidates,
        &Substitution::new(),
        &FrozenVariables::new(),
    )
}

#[test]
fn test_array_specialisation_wins() {
    let mut registry = create_where_registry(false, true);
    let w = registry.witness_param("W", vec![where_(array(Type::concrete("Int")))]);

    for reversed in [false, true] {
        let resolution = resolve_in_order(&registry, &w, reversed).unwrap();
        assert_eq!(resolution.witness.to_string(), "WhereArray<Int>");
    }
}

#[test]
fn test_more_specific_wins_when_both_overlappable() {
    let mut registry = create_where_registry(true, true);
    let w = registry.witness_param("W", vec![where_(array(Type::concrete("Int")))]);

    for reversed in [false, true] {
        let resolution = resolve_in_order(&registry, &w, reversed).unwrap();
        assert_eq!(resolution.witness.to_string(), "WhereArray<Int>");
    }
}

#[test]
fn test_overlap_without_permission_is_ambiguous() {
    let mut registry = create_where_registry(false, false);
    let w = registry.witness_param("W", vec![where_(array(Type::concrete("Int")))]);

    let error = resolve_in_order(&registry, &w, false).unwrap_err();

    assert_eq!(error.tag(), FailureTag::AmbiguousInstance);
    match error {
        ResolutionError::AmbiguousInstance { mut candidates, .. } => {
            candidates.sort();
            assert_eq!(candidates, vec!["WhereArray", "WhereEnumerable"]);
        }
        other => panic!("expected AmbiguousInstance, got {other:?}"),
    }
}

#[test]
fn test_generic_instance_used_when_specialisation_does_not_apply() {
    let mut registry = create_where_registry(false, true);
    let list = Type::generic_concrete("List", vec![Type::concrete("Int")]);
    let w = registry.witness_param("W", vec![where_(list)]);

    let resolution = resolve_in_order(&registry, &w, false).unwrap();

    assert_eq!(
        resolution.witness.to_string(),
        "WhereEnumerable<List<Int>, EnumerableList<Int>>"
    );
}

#[test]
fn test_ambient_witness_beats_overlappable_generic_instance() {
    let mut registry = Registry::new();
    let t = registry.type_param("T");
    registry
        .declare_concept(ConceptDeclaration::new("Show", vec![t]))
        .unwrap();
    let root = registry.root();

    let t = registry.type_param("T");
    registry
        .declare_instance(
            root,
            InstanceDeclaration::new("ShowAny")
                .with_type_params(vec![t.clone()])
                .provides(ConceptRef::new("Show", vec![t.as_type()]))
                .overlappable(),
        )
        .unwrap();

    let a = registry.type_param("A");
    let show_a = registry.witness_param("ShowA", vec![ConceptRef::new("Show", vec![a.as_type()])]);
    let method = registry
        .declare_method_scope(root, "describe", vec![a.clone(), show_a.clone()])
        .unwrap();

    let w = registry.witness_param("W", vec![ConceptRef::new("Show", vec![a.as_type()])]);
    let resolution = ResolutionEngine::new(&registry)
        .resolve(&w, method, &Substitution::new())
        .unwrap();

    assert_eq!(
        resolution.witness,
        Witness::Ambient {
            var_id: show_a.var_id,
            name: "ShowA".to_string(),
        }
    );
}
