//! Control protocol tests
//!
//! The scheduler is exercised directly where ordering must be exact, and
//! through a live `FlowEngine` where the threading itself is under test.

use std::time::Duration;

use flow_simulator_core::{
    ControlMessage, EngineEvent, FlowEngine, FlowLink, FlowNode, GraphDefinition, NodeCategory,
    Scheduler, SchedulerState, SimulationConfig, SimulationResult, Uncertainty,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(30);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

fn graph() -> GraphDefinition {
    GraphDefinition {
        nodes: vec![
            FlowNode::new("revenue", "Revenue", NodeCategory::Income, 1000.0),
            FlowNode::new("cost", "Cost", NodeCategory::Expense, 600.0),
            FlowNode::new("profit", "Profit", NodeCategory::Equity, 400.0),
        ],
        links: vec![
            FlowLink::new(0, 1, 600.0, "spend").with_uncertainty(Uncertainty::Normal { std_dev: 0.2 }),
            FlowLink::new(0, 2, 400.0, "retain").with_uncertainty(Uncertainty::Normal { std_dev: 0.3 }),
        ],
    }
}

fn config(iterations: u64) -> SimulationConfig {
    SimulationConfig {
        iterations,
        seed: 31337,
        ..Default::default()
    }
}

fn start(iterations: u64) -> ControlMessage {
    ControlMessage::StartSimulation {
        config: config(iterations),
        initial_graph: graph(),
    }
}

/// Drive a scheduler until it leaves `Running`, collecting events
fn drain(scheduler: &mut Scheduler) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while scheduler.is_running() {
        events.extend(scheduler.run_batch());
    }
    events
}

fn final_result(events: &[EngineEvent]) -> SimulationResult {
    events
        .iter()
        .find_map(|event| match event {
            EngineEvent::SimulationComplete { results, .. } => Some(results.clone()),
            _ => None,
        })
        .expect("run did not complete")
}

fn assert_same_statistics(a: &SimulationResult, b: &SimulationResult) {
    assert_eq!(a.iterations_completed, b.iterations_completed);
    assert_eq!(a.confidence_interval, b.confidence_interval);
    assert_eq!(a.risk_metrics, b.risk_metrics);
    assert_eq!(a.optimal_path, b.optimal_path);
    assert_eq!(a.expected_value, b.expected_value);
}

fn next_event(engine: &FlowEngine) -> EngineEvent {
    engine
        .recv_timeout(EVENT_TIMEOUT)
        .unwrap()
        .expect("timed out waiting for engine event")
}

fn wait_for(engine: &FlowEngine, tag: &str) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(engine);
        let done = event.tag() == tag;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Events that arrive within `QUIET_PERIOD`
fn trailing_events(engine: &FlowEngine) -> Vec<EngineEvent> {
    let mut trailing = Vec::new();
    while let Some(event) = engine.recv_timeout(QUIET_PERIOD).unwrap() {
        trailing.push(event);
    }
    trailing
}

// ============================================================================
// Scheduler (synchronous)
// ============================================================================

#[test]
fn test_start_while_running_rejected_and_run_unaffected() {
    let mut scheduler = Scheduler::new();
    scheduler.handle(start(400));
    scheduler.run_batch();

    let events = scheduler.handle(start(50));
    assert!(matches!(events.as_slice(), [EngineEvent::SimulationError { .. }]));
    assert_eq!(scheduler.state(), SchedulerState::Running);

    let result = final_result(&drain(&mut scheduler));
    assert_eq!(result.iterations_completed, 400);
}

#[test]
fn test_start_while_paused_rejected() {
    let mut scheduler = Scheduler::new();
    scheduler.handle(start(400));
    scheduler.handle(ControlMessage::PauseSimulation);

    let events = scheduler.handle(start(50));
    assert!(matches!(events.as_slice(), [EngineEvent::SimulationError { .. }]));
    assert_eq!(scheduler.state(), SchedulerState::Paused);
}

#[test]
fn test_pause_resume_leaves_statistics_unchanged() {
    let mut straight = Scheduler::new();
    straight.handle(start(1_000));
    let expected = final_result(&drain(&mut straight));

    let mut interrupted = Scheduler::new();
    interrupted.handle(start(1_000));
    let mut events = Vec::new();
    while interrupted.is_running() {
        events.extend(interrupted.run_batch());
        if interrupted.is_running() {
            assert_eq!(interrupted.handle(ControlMessage::PauseSimulation), vec![EngineEvent::SimulationPaused]);
            assert!(interrupted.run_batch().is_empty());
            assert_eq!(interrupted.handle(ControlMessage::ResumeSimulation), vec![EngineEvent::SimulationResumed]);
        }
    }

    assert_same_statistics(&expected, &final_result(&events));
}

#[test]
fn test_stepping_matches_straight_run() {
    let mut straight = Scheduler::new();
    straight.handle(start(1_000));
    let expected = final_result(&drain(&mut straight));

    let mut stepped = Scheduler::new();
    stepped.handle(start(1_000));
    stepped.handle(ControlMessage::PauseSimulation);

    let events = stepped.handle(ControlMessage::StepSimulation { steps: 300 });
    assert!(matches!(
        events.as_slice(),
        [EngineEvent::SimulationUpdate { progress, .. }] if progress.iterations_completed == 300
    ));
    assert_eq!(stepped.state(), SchedulerState::Paused);

    let events = stepped.handle(ControlMessage::StepSimulation { steps: 700 });
    assert_eq!(stepped.state(), SchedulerState::Completed);
    assert_same_statistics(&expected, &final_result(&events));
}

#[test]
fn test_step_while_running_rejected() {
    let mut scheduler = Scheduler::new();
    scheduler.handle(start(400));

    let events = scheduler.handle(ControlMessage::StepSimulation { steps: 10 });
    assert!(matches!(events.as_slice(), [EngineEvent::SimulationError { .. }]));
    assert_eq!(scheduler.state(), SchedulerState::Running);
}

#[test]
fn test_resume_while_running_rejected() {
    let mut scheduler = Scheduler::new();
    scheduler.handle(start(400));

    let events = scheduler.handle(ControlMessage::ResumeSimulation);
    assert!(matches!(events.as_slice(), [EngineEvent::SimulationError { .. }]));
    assert_eq!(scheduler.state(), SchedulerState::Running);
}

#[test]
fn test_stop_from_paused() {
    let mut scheduler = Scheduler::new();
    scheduler.handle(start(400));
    scheduler.handle(ControlMessage::PauseSimulation);

    assert_eq!(scheduler.handle(ControlMessage::StopSimulation), vec![EngineEvent::SimulationStopped]);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(scheduler.run_batch().is_empty());
}

#[test]
fn test_config_error_does_not_start() {
    let mut scheduler = Scheduler::new();
    let events = scheduler.handle(ControlMessage::StartSimulation {
        config: SimulationConfig {
            exploration_parameter: -1.0,
            ..config(100)
        },
        initial_graph: graph(),
    });

    assert!(matches!(events.as_slice(), [EngineEvent::SimulationError { .. }]));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_runtime_failure_enters_errored() {
    let mut overflowing = graph();
    overflowing.links[1] = FlowLink::new(0, 2, 1.0e300, "retain").with_uncertainty(Uncertainty::Normal { std_dev: 1.0e300 });

    let mut scheduler = Scheduler::new();
    scheduler.handle(ControlMessage::StartSimulation {
        config: config(1_000),
        initial_graph: overflowing,
    });
    let events = drain(&mut scheduler);

    assert_eq!(scheduler.state(), SchedulerState::Errored);
    assert!(matches!(events.last(), Some(EngineEvent::SimulationError { .. })));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SimulationComplete { .. })));

    // Recovery requires a fresh start
    assert!(scheduler.handle(start(10)).is_empty());
    assert_eq!(scheduler.state(), SchedulerState::Running);
}

// ============================================================================
// FlowEngine (threaded)
// ============================================================================

#[test]
fn test_engine_runs_to_completion() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000), graph()).unwrap();

    let events = wait_for(&engine, "SIMULATION_COMPLETE");
    let updates = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::SimulationUpdate { .. }))
        .count();
    assert_eq!(updates, 9);
    assert_eq!(final_result(&events).iterations_completed, 1_000);
}

#[test]
fn test_engine_graph_error_at_start() {
    let engine = FlowEngine::spawn().unwrap();
    let mut broken = graph();
    broken.links.push(FlowLink::new(2, 5, 1.0, "dangling"));
    engine.start(config(100), broken).unwrap();

    let EngineEvent::SimulationError { message } = next_event(&engine) else {
        panic!("expected SIMULATION_ERROR");
    };
    assert!(message.contains("node index 5"), "unexpected message: {}", message);

    // Still idle, so a valid start goes through
    engine.start(config(100), graph()).unwrap();
    wait_for(&engine, "SIMULATION_COMPLETE");
}

#[test]
fn test_engine_stop_emits_exactly_one_stopped() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    wait_for(&engine, "SIMULATION_UPDATE");

    engine.stop().unwrap();
    wait_for(&engine, "SIMULATION_STOPPED");

    let trailing = trailing_events(&engine);
    assert!(trailing.is_empty(), "events after stop: {:?}", trailing.iter().map(EngineEvent::tag).collect::<Vec<_>>());
}

#[test]
fn test_engine_stop_immediately_after_start() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    engine.stop().unwrap();

    let events = wait_for(&engine, "SIMULATION_STOPPED");
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SimulationError { .. })));
    assert!(trailing_events(&engine).is_empty());
}

#[test]
fn test_engine_second_stop_is_protocol_error() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    engine.stop().unwrap();
    engine.stop().unwrap();

    wait_for(&engine, "SIMULATION_STOPPED");
    assert!(matches!(next_event(&engine), EngineEvent::SimulationError { .. }));
    assert!(trailing_events(&engine).is_empty());
}

#[test]
fn test_engine_start_while_running_keeps_original_run() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    engine.start(config(10), graph()).unwrap();

    let events = wait_for(&engine, "SIMULATION_ERROR");
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SimulationComplete { .. })));

    // Original run is still going: it keeps reporting against its own budget
    let EngineEvent::SimulationUpdate { progress, .. } = wait_for(&engine, "SIMULATION_UPDATE").pop().unwrap() else {
        unreachable!();
    };
    assert_eq!(progress.total_iterations, 1_000_000);

    engine.stop().unwrap();
    wait_for(&engine, "SIMULATION_STOPPED");
}

#[test]
fn test_engine_pause_resume_matches_uninterrupted() {
    let straight = FlowEngine::spawn().unwrap();
    straight.start(config(100_000), graph()).unwrap();
    let expected = final_result(&wait_for(&straight, "SIMULATION_COMPLETE"));

    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(100_000), graph()).unwrap();
    engine.pause().unwrap();
    wait_for(&engine, "SIMULATION_PAUSED");
    assert!(trailing_events(&engine).is_empty());

    engine.resume().unwrap();
    let events = wait_for(&engine, "SIMULATION_COMPLETE");
    assert_eq!(events.first().map(EngineEvent::tag), Some("SIMULATION_RESUMED"));
    assert_same_statistics(&expected, &final_result(&events));
}

#[test]
fn test_engine_step_emits_update() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    engine.pause().unwrap();
    wait_for(&engine, "SIMULATION_PAUSED");

    let before = trailing_events(&engine);
    assert!(before.is_empty());

    engine.step(0).unwrap();
    assert!(matches!(next_event(&engine), EngineEvent::SimulationError { .. }));

    engine.step(5).unwrap();
    let EngineEvent::SimulationUpdate { progress, .. } = next_event(&engine) else {
        panic!("expected SIMULATION_UPDATE after step");
    };
    engine.step(5).unwrap();
    let EngineEvent::SimulationUpdate { progress: after, .. } = next_event(&engine) else {
        panic!("expected SIMULATION_UPDATE after step");
    };
    assert_eq!(after.iterations_completed, progress.iterations_completed + 5);

    engine.stop().unwrap();
    wait_for(&engine, "SIMULATION_STOPPED");
}

#[test]
fn test_drop_joins_running_engine() {
    let engine = FlowEngine::spawn().unwrap();
    engine.start(config(1_000_000), graph()).unwrap();
    wait_for(&engine, "SIMULATION_UPDATE");
    drop(engine);
}
