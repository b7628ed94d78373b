use std::path::{Path, PathBuf};

use pn_reach::analysis::reachability_graph;
use pn_reach::export::{Exporter, StateIdScheme};
use pn_reach::net::{NetError, ParseError, read_net};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn order_process_interleaves_parallel_branches() {
    let parsed = read_net(fixture("order_process.pnml")).unwrap();
    let net = &parsed.net;
    assert_eq!(net.places_len(), 6);
    assert_eq!(net.transitions_len(), 4);

    let join = net.transition_id("t_join").unwrap();
    assert_eq!(net.transitions()[join].label, None);
    let end = net.place_id("end").unwrap();
    assert_eq!(parsed.final_marking.as_ref().unwrap().tokens(end), 1);

    let graph = reachability_graph(net, &parsed.initial_marking).unwrap();
    assert_eq!(graph.state_count(), 6);
    assert_eq!(graph.edge_count(), 6);
    assert_eq!(graph.deadlocks().len(), 1);

    let last = graph.deadlocks()[0];
    assert_eq!(graph.state(last).unwrap().marking, *parsed.final_marking.as_ref().unwrap());

    let export = Exporter::new(net)
        .with_scheme(StateIdScheme::Marking)
        .export(&graph)
        .unwrap();
    let ids = export.states.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "start:1",
            "p_pay:1_p_ship:1",
            "p_paid:1_p_ship:1",
            "p_pay:1_p_shipped:1",
            "p_paid:1_p_shipped:1",
            "end:1",
        ]
    );
    let labels = export.transitions.iter().map(|t| t.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["Register order", "Pay", "Ship", "Ship", "Pay", "t_join"]);
}

#[test]
fn nested_pages_are_flattened() {
    let parsed = read_net(fixture("producer_consumer.pnml")).unwrap();
    let graph = reachability_graph(&parsed.net, &parsed.initial_marking).unwrap();
    assert_eq!(graph.state_count(), 3);
    assert_eq!(graph.edge_count(), 4);
    assert!(graph.deadlocks().is_empty());
    assert!(parsed.final_marking.is_none());
}

#[test]
fn json_and_pnml_describe_the_same_kind_of_net() {
    let parsed = read_net(fixture("two_step.json")).unwrap();
    let graph = reachability_graph(&parsed.net, &parsed.initial_marking).unwrap();
    let export = Exporter::new(&parsed.net).export(&graph).unwrap();
    assert_eq!(export.transitions[0].label, "step");
    assert!(export.states[1].is_terminal);
}

#[test]
fn dangling_arc_is_a_malformed_net() {
    let err = read_net(fixture("broken_arc.pnml")).unwrap_err();
    match err {
        ParseError::Net(NetError::UnknownNode { missing, .. }) => assert_eq!(missing, "t_missing"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_extension_is_rejected() {
    assert!(matches!(
        read_net(fixture("model.txt")),
        Err(ParseError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        read_net(fixture("missing.pnml")),
        Err(ParseError::Io(_))
    ));
}
