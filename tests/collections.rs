//! Tests for linked lists and weighted mixes on armed objects.

use std::sync::Arc;

use approx::assert_relative_eq;

use impact_flow::{
    units, AttrValue, ClassSpec, EngineError, ExplainableValue, LinkedObjects, ModelGraph,
    ObjectId, Quantity, WeightedMix,
};

// ============================================================================
// Fixture classes
// ============================================================================

fn device_class() -> Arc<ClassSpec> {
    ClassSpec::builder("Device", 1).build()
}

/// A usage pattern with a device list and a derived device count.
fn pattern_class() -> Arc<ClassSpec> {
    ClassSpec::builder("UsagePattern", 2)
        .calculated("device_count", |graph, id| {
            let count = graph.list(id, "devices")?.len() as f64;
            Ok(ExplainableValue::from_quantity(
                Quantity::dimensionless(count),
                "device count",
            ))
        })
        .build()
}

/// A usage pattern blending device powers by mix weight.
fn blend_class() -> Arc<ClassSpec> {
    ClassSpec::builder("UsagePattern", 2)
        .calculated("blended_power", |graph, id| {
            let entries: Vec<(ObjectId, f64)> =
                graph.mix(id, "devices")?.entries().to_vec();
            let mut terms = Vec::new();
            for (device, weight) in entries {
                let power = graph.value(&device, "power")?;
                let weight =
                    ExplainableValue::from_quantity(Quantity::dimensionless(weight), "share");
                terms.push(power.multiply(&weight)?);
            }
            ExplainableValue::sum(&terms, "blended power")
        })
        .build()
}

fn watts(magnitude: f64, label: &str) -> AttrValue {
    AttrValue::Value(ExplainableValue::from_quantity(
        Quantity::new(magnitude, units::watt()),
        label,
    ))
}

// ============================================================================
// Linked lists
// ============================================================================

#[test]
fn armed_list_append_recomputes_the_owner() {
    let mut graph = ModelGraph::new();
    let laptop = graph.add_object(device_class(), "laptop", vec![]).unwrap();
    let phone = graph.add_object(device_class(), "phone", vec![]).unwrap();
    let pattern = graph
        .add_object(
            pattern_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::List(LinkedObjects::new(vec![laptop.clone()])),
            )],
        )
        .unwrap();
    assert_eq!(
        graph.value(&pattern, "device_count").unwrap().quantity().unwrap().magnitude,
        1.0
    );

    graph.list_append(&pattern, "devices", phone.clone()).unwrap();
    assert_eq!(graph.list(&pattern, "devices").unwrap().len(), 2);
    assert_eq!(
        graph.value(&pattern, "device_count").unwrap().quantity().unwrap().magnitude,
        2.0
    );

    graph.list_remove(&pattern, "devices", &laptop).unwrap();
    assert_eq!(graph.list(&pattern, "devices").unwrap().items(), &[phone]);
    assert_eq!(
        graph.value(&pattern, "device_count").unwrap().quantity().unwrap().magnitude,
        1.0
    );
}

#[test]
fn list_edits_past_the_end_are_errors() {
    let mut graph = ModelGraph::new();
    let laptop = graph.add_object(device_class(), "laptop", vec![]).unwrap();
    let phone = graph.add_object(device_class(), "phone", vec![]).unwrap();
    let pattern = graph
        .add_object(
            pattern_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::List(LinkedObjects::new(vec![laptop.clone()])),
            )],
        )
        .unwrap();

    let err = graph
        .list_set(&pattern, "devices", 5, phone.clone())
        .unwrap_err();
    assert!(matches!(err, EngineError::IndexOutOfRange { index: 5, len: 1, .. }));
    let err = graph
        .list_insert(&pattern, "devices", 2, phone)
        .unwrap_err();
    assert!(matches!(err, EngineError::IndexOutOfRange { index: 2, .. }));

    // The rejected edits left the list alone.
    assert_eq!(graph.list(&pattern, "devices").unwrap().items(), &[laptop]);
}

#[test]
fn list_membership_keeps_back_links_current() {
    let mut graph = ModelGraph::new();
    let laptop = graph.add_object(device_class(), "laptop", vec![]).unwrap();
    let pattern = graph
        .add_object(
            pattern_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::List(LinkedObjects::new(vec![laptop.clone()])),
            )],
        )
        .unwrap();

    assert!(graph
        .object(&laptop)
        .unwrap()
        .containers()
        .contains(&(pattern.clone(), "devices".into())));

    graph.list_clear(&pattern, "devices").unwrap();
    assert!(graph.object(&laptop).unwrap().containers().is_empty());
}

#[test]
fn self_delete_refuses_while_listed_then_succeeds() {
    let mut graph = ModelGraph::new();
    let laptop = graph.add_object(device_class(), "the-laptop", vec![]).unwrap();
    let pattern = graph
        .add_object(
            pattern_class(),
            "the-pattern",
            vec![(
                "devices".into(),
                AttrValue::List(LinkedObjects::new(vec![laptop.clone()])),
            )],
        )
        .unwrap();

    let err = graph.self_delete(&laptop).unwrap_err();
    match err {
        EngineError::StillReferenced { by, .. } => {
            assert!(by.contains("the-pattern"), "unexpected container: {by}")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    graph.list_remove(&pattern, "devices", &laptop).unwrap();
    graph.self_delete(&laptop).unwrap();
    assert!(graph.object(&laptop).is_err());
}

// ============================================================================
// Weighted mixes
// ============================================================================

#[test]
fn mix_weights_must_sum_to_one() {
    let mut graph = ModelGraph::new();
    let laptop = graph
        .add_object(device_class(), "laptop", vec![("power".into(), watts(50.0, "laptop power"))])
        .unwrap();
    let phone = graph
        .add_object(device_class(), "phone", vec![("power".into(), watts(5.0, "phone power"))])
        .unwrap();
    let pattern = graph
        .add_object(
            blend_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::Mix(
                    WeightedMix::new(
                        vec![(laptop.clone(), 0.6), (phone.clone(), 0.4)],
                        "devices",
                    )
                    .unwrap(),
                ),
            )],
        )
        .unwrap();

    let err = graph
        .mix_set_weights(&pattern, "devices", vec![(laptop, 0.6), (phone, 0.6)])
        .unwrap_err();
    assert!(matches!(err, EngineError::NonUnitWeights { total, .. } if (total - 1.2).abs() < 1e-9));
}

#[test]
fn weight_only_change_recomputes_the_blend() {
    let mut graph = ModelGraph::new();
    let laptop = graph
        .add_object(device_class(), "laptop", vec![("power".into(), watts(50.0, "laptop power"))])
        .unwrap();
    let phone = graph
        .add_object(device_class(), "phone", vec![("power".into(), watts(10.0, "phone power"))])
        .unwrap();
    let pattern = graph
        .add_object(
            blend_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::Mix(
                    WeightedMix::new(
                        vec![(laptop.clone(), 0.5), (phone.clone(), 0.5)],
                        "devices",
                    )
                    .unwrap(),
                ),
            )],
        )
        .unwrap();
    assert_eq!(
        graph.value(&pattern, "blended_power").unwrap().quantity().unwrap().magnitude,
        30.0
    );

    graph
        .mix_set_weights(
            &pattern,
            "devices",
            vec![(laptop.clone(), 0.9), (phone.clone(), 0.1)],
        )
        .unwrap();
    assert_eq!(graph.mix(&pattern, "devices").unwrap().weight(&laptop), Some(0.9));
    assert_relative_eq!(
        graph.value(&pattern, "blended_power").unwrap().quantity().unwrap().magnitude,
        46.0
    );
}

#[test]
fn key_set_change_replaces_membership_and_back_links() {
    let mut graph = ModelGraph::new();
    let laptop = graph
        .add_object(device_class(), "laptop", vec![("power".into(), watts(50.0, "laptop power"))])
        .unwrap();
    let phone = graph
        .add_object(device_class(), "phone", vec![("power".into(), watts(10.0, "phone power"))])
        .unwrap();
    let tablet = graph
        .add_object(device_class(), "tablet", vec![("power".into(), watts(20.0, "tablet power"))])
        .unwrap();
    let pattern = graph
        .add_object(
            blend_class(),
            "pattern",
            vec![(
                "devices".into(),
                AttrValue::Mix(
                    WeightedMix::new(
                        vec![(laptop.clone(), 0.5), (phone.clone(), 0.5)],
                        "devices",
                    )
                    .unwrap(),
                ),
            )],
        )
        .unwrap();

    graph
        .mix_set_weights(
            &pattern,
            "devices",
            vec![(laptop.clone(), 0.5), (tablet.clone(), 0.5)],
        )
        .unwrap();

    assert!(graph.object(&phone).unwrap().containers().is_empty());
    assert!(!graph.object(&tablet).unwrap().containers().is_empty());
    assert_eq!(
        graph.value(&pattern, "blended_power").unwrap().quantity().unwrap().magnitude,
        35.0
    );
}

#[test]
fn frozen_mix_rejects_in_place_mutation() {
    let mix = WeightedMix::new(vec![(ObjectId::from_raw("laptop-1"), 1.0)], "devices").unwrap();
    assert!(matches!(mix.clear(), Err(EngineError::FrozenMix { .. })));
    assert!(matches!(
        mix.remove(&ObjectId::from_raw("laptop-1")),
        Err(EngineError::FrozenMix { .. })
    ));
}
