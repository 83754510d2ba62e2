// crates/scriptnodes/tests/flow_test.rs

use scriptcore::{
    ActivationId, DefinitionError, ExecutionEvent, NodeId, NodeSpec, ScriptError, ScriptGraph,
};
use scriptnodes::flow::{BRANCH_FALSE, BRANCH_TRUE};
use scriptnodes::{data, flow, time};
use scriptruntime::{RuntimeConfig, ScriptInstance, ScriptRuntime, TraceEntry, TraceOutcome};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DT: f64 = 0.25;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn runtime() -> ScriptRuntime {
    ScriptRuntime::with_registry(
        Arc::new(scriptnodes::standard_registry()),
        RuntimeConfig {
            record_trace: true,
            ..RuntimeConfig::default()
        },
    )
}

fn id(n: u128) -> NodeId {
    Uuid::from_u128(n)
}

fn deliveries<'a>(instance: &'a ScriptInstance, node: NodeId) -> Vec<&'a TraceEntry> {
    instance.trace().iter().filter(|e| e.node == node).collect()
}

/// Start forks into two branches and a stop. Branch A sees true, branch B
/// sees false; A's true output and B's false output meet in a merge-all
/// that leads to a final stop.
fn fork_join_graph() -> ScriptGraph {
    let mut graph = ScriptGraph::new("fork join");
    graph.id = id(100);

    let start = graph.add_node(NodeSpec::with_id(flow::START, id(1)));
    let fork = graph.add_node(NodeSpec::with_id(flow::FORK, id(2)));
    let branch_a = graph.add_node(NodeSpec::with_id(flow::BRANCH, id(3)).with_name("A"));
    let branch_b = graph.add_node(NodeSpec::with_id(flow::BRANCH, id(4)).with_name("B"));
    let stop_c = graph.add_node(NodeSpec::with_id(flow::STOP, id(5)).with_name("C"));
    let join = graph.add_node(NodeSpec::with_id(flow::MERGE_ALL, id(6)));
    let stop_d = graph.add_node(NodeSpec::with_id(flow::STOP, id(7)).with_name("D"));
    let yes = graph.add_node(NodeSpec::with_id(data::LITERAL, id(8)).with_config("value", true));
    let no = graph.add_node(NodeSpec::with_id(data::LITERAL, id(9)).with_config("value", false));

    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, branch_a, 0);
    graph.connect(fork, 2, branch_b, 0);
    graph.connect(fork, 3, stop_c, 0);
    graph.connect(yes, 0, branch_a, 1);
    graph.connect(no, 0, branch_b, 1);
    graph.connect(branch_a, 2 + BRANCH_TRUE, join, 0);
    graph.connect(branch_b, 2 + BRANCH_FALSE, join, 1);
    graph.connect(join, 3, stop_d, 0);
    graph
}

#[test]
fn test_fork_join_runs_to_completion() {
    init_tracing();

    let runtime = runtime();
    let mut events = runtime.subscribe_events();
    let mut instance = runtime.instantiate_graph(&fork_join_graph()).unwrap();
    instance.start().unwrap();

    let ticks = instance.run_until_idle(DT, 100);
    assert!(instance.is_finished());
    assert_eq!(ticks, 5);

    // A and B both fired into the join, C ended its lineage
    assert_eq!(deliveries(&instance, id(3))[0].outputs.to_vec(), vec![BRANCH_TRUE]);
    assert_eq!(deliveries(&instance, id(4))[0].outputs.to_vec(), vec![BRANCH_FALSE]);
    assert_eq!(deliveries(&instance, id(5)).len(), 1);

    let join: Vec<TraceOutcome> = deliveries(&instance, id(6))
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(join, vec![TraceOutcome::Waiting, TraceOutcome::Done]);

    let stop_d = deliveries(&instance, id(7));
    assert_eq!(stop_d.len(), 1, "Final stop is reached exactly once");
    assert_eq!(stop_d[0].tick, 5);

    assert!(instance
        .trace()
        .iter()
        .all(|e| e.activation == ActivationId(1)));
    assert!(instance.stalled_joins().is_empty());

    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::InstanceFinished { ticks: 5, .. } = event {
            finished = true;
        }
    }
    assert!(finished, "Finish event should be published");
}

#[test]
fn test_identical_runs_produce_identical_traces() {
    let run = || {
        let mut instance = runtime().instantiate_graph(&fork_join_graph()).unwrap();
        instance.start().unwrap();
        instance.run_until_idle(DT, 100);
        serde_json::to_vec(instance.trace()).unwrap()
    };

    let first = run();
    let second = run();
    assert!(!first.is_empty());
    assert_eq!(first, second, "Same graph and inputs give the same trace");
}

#[test]
fn test_merge_one_fires_once_per_activation() {
    let mut graph = ScriptGraph::new("first wins");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let fork = graph.add_node(NodeSpec::new(flow::FORK));
    let merge = graph.add_node(NodeSpec::new(flow::MERGE_ONE));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, merge, 0);
    graph.connect(fork, 2, merge, 1);
    graph.connect(fork, 3, merge, 0);
    graph.connect(merge, 2, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.start().unwrap();
    instance.run_until_idle(DT, 20);
    assert!(instance.is_finished());

    let outcomes: Vec<TraceOutcome> = deliveries(&instance, merge)
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(
        outcomes,
        vec![
            TraceOutcome::Latched,
            TraceOutcome::Absorbed,
            TraceOutcome::Absorbed
        ]
    );
    assert_eq!(deliveries(&instance, stop).len(), 1);
}

#[test]
fn test_merge_one_fires_again_for_new_activation() {
    let mut graph = ScriptGraph::new("retrigger");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let merge = graph.add_node(NodeSpec::new(flow::MERGE_ONE));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, merge, 0);
    graph.connect(merge, 2, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    let first = instance.trigger(start).unwrap();
    let second = instance.trigger(start).unwrap();
    instance.run_until_idle(DT, 20);

    let stops: Vec<ActivationId> = deliveries(&instance, stop)
        .iter()
        .map(|e| e.activation)
        .collect();
    assert_eq!(stops, vec![first, second]);
}

#[test]
fn test_merge_all_keeps_activations_apart() {
    init_tracing();

    let mut graph = ScriptGraph::new("isolated joins");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let fork = graph.add_node(NodeSpec::new(flow::FORK));
    let gate = graph.add_node(NodeSpec::new(flow::BRANCH));
    let open = graph.add_node(NodeSpec::new(data::VARIABLE).with_config("name", "open"));
    let join = graph.add_node(NodeSpec::new(flow::MERGE_ALL));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, join, 0);
    graph.connect(fork, 2, gate, 0);
    graph.connect(open, 0, gate, 1);
    graph.connect(gate, 2 + BRANCH_TRUE, join, 1);
    graph.connect(join, 3, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.set_variable("open", false);
    let closed = instance.trigger(start).unwrap();
    instance.run_until_idle(DT, 20);

    assert!(instance.is_finished());
    assert!(deliveries(&instance, stop).is_empty());
    let stalled = instance.stalled_joins();
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].node, join);
    assert_eq!(stalled[0].activation, closed);
    assert_eq!(stalled[0].arrived.to_vec(), vec![0]);

    instance.set_variable("open", true);
    let opened = instance.trigger(start).unwrap();
    instance.run_until_idle(DT, 20);

    let stops = deliveries(&instance, stop);
    assert_eq!(stops.len(), 1, "Arrivals from the stalled activation never count");
    assert_eq!(stops[0].activation, opened);
    assert_eq!(instance.stalled_joins().len(), 1);
}

#[test]
fn test_loop_iterations_are_fresh_activations() {
    let mut graph = ScriptGraph::new("loop");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let merge = graph.add_node(NodeSpec::new(flow::MERGE_ONE));
    let pause = graph.add_node(NodeSpec::new(time::WAIT).with_config("seconds", 0.0));
    let again = graph.add_node(NodeSpec::new(flow::BRANCH));
    let flag = graph.add_node(NodeSpec::new(data::VARIABLE).with_config("name", "again"));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, merge, 0);
    graph.connect(merge, 2, pause, 0);
    graph.connect(pause, 1, again, 0);
    graph.connect(flag, 0, again, 1);
    graph.connect(again, 2 + BRANCH_TRUE, merge, 1);
    graph.connect(again, 2 + BRANCH_FALSE, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.set_variable("again", true);
    instance.start().unwrap();
    instance.run_until_idle(DT, 12);
    assert!(!instance.is_finished(), "Loop keeps running while the flag is set");

    instance.set_variable("again", false);
    instance.run_until_idle(DT, 12);
    assert!(instance.is_finished());

    let passes = deliveries(&instance, merge);
    assert!(passes.len() >= 4);
    assert!(
        passes.iter().all(|e| e.outcome == TraceOutcome::Latched),
        "A loop never runs into its own latch"
    );
    assert!(passes
        .windows(2)
        .all(|pair| pair[0].activation < pair[1].activation));
    assert_eq!(deliveries(&instance, stop).len(), 1);
}

#[test]
fn test_wait_spans_ticks() {
    let mut graph = ScriptGraph::new("wait");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let pause = graph.add_node(NodeSpec::new(time::WAIT).with_config("seconds", 0.5));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, pause, 0);
    graph.connect(pause, 1, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.start().unwrap();

    assert_eq!(instance.run_until_idle(DT, 20), 4);
    let outcomes: Vec<TraceOutcome> = deliveries(&instance, pause)
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, vec![TraceOutcome::Executing, TraceOutcome::Done]);
}

#[test]
fn test_abort_stops_a_waiting_graph() {
    let mut graph = ScriptGraph::new("abort");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let pause = graph.add_node(NodeSpec::new(time::WAIT).with_config("seconds", 60.0));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, pause, 0);
    graph.connect(pause, 1, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.start().unwrap();
    instance.run_until_idle(DT, 5);
    assert_eq!(instance.live_tokens(), 1);

    instance.abort();
    instance.run_until_idle(DT, 5);
    assert!(deliveries(&instance, stop).is_empty());
    assert!(matches!(
        instance.trigger(start),
        Err(ScriptError::InstanceAborted)
    ));
}

#[test]
fn test_invalid_node_config_rejects_graph() {
    let mut graph = ScriptGraph::new("bad literal");
    let literal = graph.add_node(NodeSpec::new(data::LITERAL));

    match runtime().instantiate_graph(&graph) {
        Err(ScriptError::Definition(DefinitionError::InvalidConfig { node, .. })) => {
            assert_eq!(node, literal)
        }
        Err(other) => panic!("Expected InvalidConfig, got {}", other),
        Ok(_) => panic!("Graph should not compile"),
    }
}

#[test]
fn test_forked_tokens_on_one_wait_time_independently() {
    let mut graph = ScriptGraph::new("shared wait");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let fork = graph.add_node(NodeSpec::new(flow::FORK));
    let pause = graph.add_node(NodeSpec::new(time::WAIT).with_config("seconds", 1.0));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, pause, 0);
    graph.connect(fork, 2, pause, 0);
    graph.connect(pause, 1, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    instance.start().unwrap();
    instance.run_until_idle(DT, 20);
    assert!(instance.is_finished());

    let first_seen: Vec<u64> = deliveries(&instance, pause)
        .iter()
        .filter(|e| e.tick == 3)
        .map(|e| e.seq)
        .collect();
    assert_eq!(first_seen.len(), 2, "Both forked tokens reach the wait together");

    let fired: Vec<(u64, u64)> = deliveries(&instance, pause)
        .iter()
        .filter(|e| e.outcome == TraceOutcome::Done)
        .map(|e| (e.seq, e.tick))
        .collect();
    assert_eq!(
        fired,
        vec![(first_seen[0], 6), (first_seen[1], 6)],
        "Each token waits the full second on its own"
    );

    let stops: Vec<u64> = deliveries(&instance, stop).iter().map(|e| e.tick).collect();
    assert_eq!(stops, vec![7, 7]);
}

#[test]
fn test_merge_all_resets_between_activations() {
    let mut graph = ScriptGraph::new("join twice");
    let start = graph.add_node(NodeSpec::new(flow::START));
    let fork = graph.add_node(NodeSpec::new(flow::FORK));
    let pause = graph.add_node(NodeSpec::new(time::WAIT).with_config("seconds", 0.5));
    let join = graph.add_node(NodeSpec::new(flow::MERGE_ALL));
    let stop = graph.add_node(NodeSpec::new(flow::STOP));
    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, join, 0);
    graph.connect(fork, 2, pause, 0);
    graph.connect(pause, 1, join, 1);
    graph.connect(join, 3, stop, 0);

    let mut instance = runtime().instantiate_graph(&graph).unwrap();
    let first = instance.trigger(start).unwrap();
    instance.run_until_idle(DT, 20);
    assert!(instance.is_finished());
    assert!(instance.waiting_joins().is_empty(), "Counter is released after firing");

    let second = instance.trigger(start).unwrap();
    instance.tick(DT);
    instance.tick(DT);
    instance.tick(DT);
    let waiting = instance.waiting_joins();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].activation, second);
    assert_eq!(waiting[0].arrived.to_vec(), vec![0], "Counting starts over");

    instance.run_until_idle(DT, 20);
    assert!(instance.is_finished());
    assert!(instance.waiting_joins().is_empty());
    assert!(instance.stalled_joins().is_empty());

    let fired: Vec<ActivationId> = deliveries(&instance, stop)
        .iter()
        .map(|e| e.activation)
        .collect();
    assert_eq!(fired, vec![first, second], "One firing per activation");

    let outcomes: Vec<TraceOutcome> = deliveries(&instance, join)
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(
        outcomes,
        vec![
            TraceOutcome::Waiting,
            TraceOutcome::Done,
            TraceOutcome::Waiting,
            TraceOutcome::Done
        ]
    );
}
