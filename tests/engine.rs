//! End-to-end tests for the update engine on a small footprint model.

use std::sync::Arc;

use impact_flow::{
    units, AttrValue, ClassSpec, EngineError, ExplainableValue, ModelGraph, ObjectId, Quantity,
    Source,
};

// ============================================================================
// Fixture classes
// ============================================================================

/// Leaf entity: a job with an input load and a reference to a server.
fn job_class() -> Arc<ClassSpec> {
    ClassSpec::builder("Job", 1)
        .dependents(|graph, id| match graph.reference(id, "server") {
            Ok(Some(server)) => vec![server.clone()],
            _ => Vec::new(),
        })
        .build()
}

/// Aggregate: a server whose total load sums the loads of every job that
/// points at it.
fn server_class() -> Arc<ClassSpec> {
    ClassSpec::builder("Server", 2)
        .calculated("total_load", |graph, id| {
            let job_ids: Vec<ObjectId> = graph
                .objects()
                .filter(|o| o.attr("server").and_then(|a| a.as_ref_target()) == Some(id))
                .map(|o| o.id().clone())
                .collect();
            let mut loads = Vec::new();
            for job in &job_ids {
                loads.push(graph.value(job, "load")?.clone());
            }
            ExplainableValue::sum(&loads, "total load")
        })
        .build()
}

fn kwh(magnitude: f64, label: &str) -> AttrValue {
    AttrValue::Value(
        ExplainableValue::from_quantity(Quantity::new(magnitude, units::kilowatt_hour()), label)
            .with_source(Source::hypothesis()),
    )
}

// ============================================================================
// Scalar updates
// ============================================================================

#[test]
fn scalar_update_round_trip() {
    let server = ClassSpec::builder("Server", 1)
        .calculated("yearly_footprint", |graph, id| {
            let fabrication = graph.value(id, "fabrication")?;
            let lifespan = graph.value(id, "lifespan")?;
            fabrication.divide(lifespan)
        })
        .build();

    let mut graph = ModelGraph::new();
    let id = graph
        .add_object(
            server,
            "server-1",
            vec![
                (
                    "fabrication".into(),
                    AttrValue::Value(ExplainableValue::from_quantity(
                        Quantity::new(600.0, units::kilogram()),
                        "fabrication footprint",
                    )),
                ),
                (
                    "lifespan".into(),
                    AttrValue::Value(ExplainableValue::from_quantity(
                        Quantity::new(6.0, units::year()),
                        "lifespan",
                    )),
                ),
            ],
        )
        .unwrap();

    let footprint = graph.value(&id, "yearly_footprint").unwrap();
    assert_eq!(footprint.quantity().unwrap().magnitude, 100.0);

    graph
        .set_value(
            &id,
            "fabrication",
            ExplainableValue::from_quantity(
                Quantity::new(1200.0, units::kilogram()),
                "fabrication footprint",
            ),
        )
        .unwrap();
    assert_eq!(
        graph
            .value(&id, "yearly_footprint")
            .unwrap()
            .quantity()
            .unwrap()
            .magnitude,
        200.0
    );

    // Setting the original value back restores the original footprint.
    graph
        .set_value(
            &id,
            "fabrication",
            ExplainableValue::from_quantity(
                Quantity::new(600.0, units::kilogram()),
                "fabrication footprint",
            ),
        )
        .unwrap();
    assert_eq!(
        graph
            .value(&id, "yearly_footprint")
            .unwrap()
            .quantity()
            .unwrap()
            .magnitude,
        100.0
    );
}

#[test]
fn derived_value_explains_its_computation() {
    let server = ClassSpec::builder("Server", 1)
        .calculated("yearly_footprint", |graph, id| {
            let fabrication = graph.value(id, "fabrication")?;
            let lifespan = graph.value(id, "lifespan")?;
            Ok(fabrication.divide(lifespan)?.with_label("yearly footprint"))
        })
        .build();

    let mut graph = ModelGraph::new();
    let id = graph
        .add_object(
            server,
            "server-1",
            vec![
                (
                    "fabrication".into(),
                    AttrValue::Value(ExplainableValue::from_quantity(
                        Quantity::new(600.0, units::kilogram()),
                        "fabrication footprint",
                    )),
                ),
                (
                    "lifespan".into(),
                    AttrValue::Value(ExplainableValue::from_quantity(
                        Quantity::new(6.0, units::year()),
                        "lifespan",
                    )),
                ),
            ],
        )
        .unwrap();

    let text = graph.value(&id, "yearly_footprint").unwrap().explain();
    assert!(text.contains("yearly footprint ="));
    assert!(text.contains("fabrication footprint (600 kg)"));
    assert!(text.contains("lifespan (6 yr)"));
}

// ============================================================================
// Reference swaps
// ============================================================================

#[test]
fn reference_swap_resets_the_old_branch() {
    let mut graph = ModelGraph::new();
    let server_1 = graph
        .add_object(server_class(), "server-1", vec![])
        .unwrap();
    let server_2 = graph
        .add_object(server_class(), "server-2", vec![])
        .unwrap();
    let job = graph
        .add_object(
            job_class(),
            "job",
            vec![
                ("load".into(), kwh(12.0, "job load")),
                ("server".into(), AttrValue::reference(None)),
            ],
        )
        .unwrap();

    // Linking the job is a tracked reference change; the server's aggregate
    // picks the load up.
    graph
        .set_reference(&job, "server", Some(server_1.clone()))
        .unwrap();
    assert_eq!(
        graph
            .value(&server_1, "total_load")
            .unwrap()
            .quantity()
            .unwrap()
            .magnitude,
        12.0
    );

    // Repointing the job recomputes both branches: the new server picks the
    // load up, and the old server's total resets to the empty identity.
    graph
        .set_reference(&job, "server", Some(server_2.clone()))
        .unwrap();
    assert_eq!(
        graph
            .value(&server_2, "total_load")
            .unwrap()
            .quantity()
            .unwrap()
            .magnitude,
        12.0
    );
    assert!(graph.value(&server_1, "total_load").unwrap().payload().is_empty());
}

#[test]
fn repointing_to_the_same_target_is_a_noop() {
    let mut graph = ModelGraph::new();
    let server = graph.add_object(server_class(), "server", vec![]).unwrap();
    let job = graph
        .add_object(
            job_class(),
            "job",
            vec![
                ("load".into(), kwh(10.0, "job load")),
                ("server".into(), AttrValue::reference(None)),
            ],
        )
        .unwrap();
    graph.set_reference(&job, "server", Some(server.clone())).unwrap();

    let before = graph.value(&server, "total_load").unwrap().clone();
    graph.set_reference(&job, "server", Some(server.clone())).unwrap();
    assert_eq!(graph.value(&server, "total_load").unwrap(), &before);
    assert_eq!(before.quantity().unwrap().magnitude, 10.0);
}

// ============================================================================
// Canonical recomputation order
// ============================================================================

#[test]
fn aggregates_recompute_after_their_inputs() {
    // job.load_kwh doubles the input; server.total reads job.load_kwh. A
    // change to the input must recompute the job before the server, or the
    // server reads a stale value with no error signal.
    let job = ClassSpec::builder("Job", 1)
        .calculated("load_kwh", |graph, id| {
            let input = graph.value(id, "input")?;
            let two = ExplainableValue::from_quantity(Quantity::dimensionless(2.0), "two");
            input.multiply(&two)
        })
        .build();

    let mut graph = ModelGraph::new();
    let job_id = graph
        .add_object(job, "job", vec![("input".into(), kwh(5.0, "input"))])
        .unwrap();

    let job_for_closure = job_id.clone();
    let server = ClassSpec::builder("Server", 2)
        .calculated("total", move |graph, _| {
            Ok(graph.value(&job_for_closure, "load_kwh")?.detached())
        })
        .build();
    let server_id = graph.add_object(server, "server", vec![]).unwrap();

    graph
        .set_value(
            &job_id,
            "input",
            ExplainableValue::from_quantity(Quantity::new(7.0, units::kilowatt_hour()), "input"),
        )
        .unwrap();

    assert_eq!(
        graph.value(&job_id, "load_kwh").unwrap().quantity().unwrap().magnitude,
        14.0
    );
    assert_eq!(
        graph.value(&server_id, "total").unwrap().quantity().unwrap().magnitude,
        14.0
    );
}

#[test]
fn sibling_derivations_recompute_in_declaration_order() {
    // "combined" reads both the input and its sibling "scaled", so it must
    // recompute after "scaled". The names sort the other way round
    // lexicographically, which is exactly the order the raw dependency walk
    // discovers them in.
    let job = ClassSpec::builder("Job", 1)
        .calculated("scaled", |graph, id| {
            let input = graph.value(id, "input")?;
            let two = ExplainableValue::from_quantity(Quantity::dimensionless(2.0), "two");
            input.multiply(&two)
        })
        .calculated("combined", |graph, id| {
            let input = graph.value(id, "input")?;
            let scaled = graph.value(id, "scaled")?;
            input.add(scaled)
        })
        .build();

    let mut graph = ModelGraph::new();
    let id = graph
        .add_object(job, "job", vec![("input".into(), kwh(10.0, "input"))])
        .unwrap();
    assert_eq!(
        graph.value(&id, "combined").unwrap().quantity().unwrap().magnitude,
        30.0
    );

    graph
        .set_value(
            &id,
            "input",
            ExplainableValue::from_quantity(Quantity::new(20.0, units::kilowatt_hour()), "input"),
        )
        .unwrap();
    assert_eq!(
        graph.value(&id, "scaled").unwrap().quantity().unwrap().magnitude,
        40.0
    );
    assert_eq!(
        graph.value(&id, "combined").unwrap().quantity().unwrap().magnitude,
        60.0
    );
}

// ============================================================================
// Recompute failures
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("no datasheet for '{0}'")]
struct MissingDatasheet(&'static str);

#[test]
fn failing_recompute_carries_the_domain_error() {
    let server = ClassSpec::builder("Server", 1)
        .calculated("fabrication", |_, _| {
            Err(EngineError::recompute(MissingDatasheet("rack server")))
        })
        .build();

    let mut graph = ModelGraph::new();
    let err = graph.add_object(server, "server", vec![]).unwrap_err();
    assert!(matches!(err, EngineError::Recompute(_)));
    let inner = err.downcast_ref::<MissingDatasheet>().unwrap();
    assert_eq!(inner.0, "rack server");
}

// ============================================================================
// Type discipline
// ============================================================================

#[test]
fn armed_assignment_must_match_the_previous_kind() {
    let mut graph = ModelGraph::new();
    let job = graph
        .add_object(
            job_class(),
            "job",
            vec![("server".into(), AttrValue::reference(None))],
        )
        .unwrap();

    // "server" holds a reference; assigning a scalar value there is refused.
    let err = graph
        .set_value(
            &job,
            "server",
            ExplainableValue::from_quantity(Quantity::dimensionless(1.0), "oops"),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { .. }));
}
