//! Integration tests for the Orchestrator iteration loop
//!
//! These tests run complete simulations against small graphs whose optimal
//! answer is known in closed form.

use std::time::Duration;

use flow_simulator_core::{
    build_graph, orchestrator::compute_config_hash, FlowGraph, FlowLink, FlowNode, NodeCategory,
    Orchestrator, RiskTolerance, Scenario, SimulationConfig, SimulationError, Uncertainty,
};

/// Revenue -> Cost and Revenue -> Profit with zero-variance descriptors
fn revenue_cost_profit() -> FlowGraph {
    let flat = Uncertainty::Normal { std_dev: 0.0 };
    build_graph(
        vec![
            FlowNode::new("revenue", "Revenue", NodeCategory::Income, 1000.0),
            FlowNode::new("cost", "Cost", NodeCategory::Expense, 600.0),
            FlowNode::new("profit", "Profit", NodeCategory::Equity, 400.0),
        ],
        vec![
            FlowLink::new(0, 1, 600.0, "spend").with_uncertainty(flat.clone()),
            FlowLink::new(0, 2, 400.0, "retain").with_uncertainty(flat),
        ],
    )
    .unwrap()
}

fn example_config() -> SimulationConfig {
    SimulationConfig {
        iterations: 1_000,
        exploration_parameter: 1.41,
        scenarios: vec![Scenario::Baseline],
        ..Default::default()
    }
}

#[test]
fn test_three_node_example_finds_nominal_optimum() {
    let mut orch = Orchestrator::new(example_config(), revenue_cost_profit()).unwrap();
    assert_eq!(orch.run_batch(1_000).unwrap(), 1_000);

    let result = orch.result();
    assert_eq!(result.iterations_completed, 1_000);
    assert_eq!(result.expected_value, 400.0);
    assert!(result.convergence_achieved);

    assert_eq!(result.optimal_path.len(), 1);
    let step = &result.optimal_path[0];
    assert_eq!(step.from, "revenue");
    assert_eq!(step.to, "profit");
    assert_eq!(step.action, "retain: Revenue -> Profit");
    assert_eq!(step.expected_value, 400.0);
    assert!(step.confidence > 0.9 && step.confidence <= 1.0);

    // Both arms of revenue plus the single root arm
    assert_eq!(result.arms_visited, 3);
}

#[test]
fn test_isolated_node_does_not_capture_optimal_path() {
    let graph = build_graph(
        vec![
            FlowNode::new("revenue", "Revenue", NodeCategory::Income, 1000.0),
            FlowNode::new("cost", "Cost", NodeCategory::Expense, 600.0),
            FlowNode::new("tax", "Tax", NodeCategory::Expense, 200.0),
            FlowNode::new("notes", "Notes", NodeCategory::Asset, 0.0),
        ],
        vec![FlowLink::new(0, 1, 600.0, "cost"), FlowLink::new(0, 2, 200.0, "tax")],
    )
    .unwrap();
    let mut orch = Orchestrator::new(example_config(), graph).unwrap();
    orch.run_batch(1_000).unwrap();

    let result = orch.result();
    assert_eq!(result.optimal_path.len(), 1);
    assert_eq!(result.optimal_path[0].from, "revenue");
    assert_eq!(result.optimal_path[0].to, "tax");
    assert_eq!(result.expected_value, -200.0);
    assert_eq!(result.arms_visited, 3);
}

#[test]
fn test_snapshot_marks_best_path_and_means() {
    let mut orch = Orchestrator::new(example_config(), revenue_cost_profit()).unwrap();

    let before = orch.snapshot();
    assert!(before.nodes.iter().all(|n| n.predicted_value.is_none()));
    assert!(before.links.iter().all(|l| !l.enhanced));

    orch.run_batch(200).unwrap();
    let snapshot = orch.snapshot();

    assert_eq!(snapshot.links[0].value, 600.0);
    assert_eq!(snapshot.links[1].value, 400.0);
    assert!(!snapshot.links[0].enhanced);
    assert!(snapshot.links[1].enhanced);

    assert_eq!(snapshot.nodes[0].predicted_value, Some(1000.0));
    assert_eq!(snapshot.nodes[1].predicted_value, Some(600.0));
    assert_eq!(snapshot.nodes[2].predicted_value, Some(400.0));
}

#[test]
fn test_batch_clamped_to_budget() {
    let config = SimulationConfig {
        iterations: 150,
        ..example_config()
    };
    let mut orch = Orchestrator::new(config, revenue_cost_profit()).unwrap();

    assert_eq!(orch.run_batch(100).unwrap(), 100);
    assert_eq!(orch.remaining(), 50);
    assert_eq!(orch.run_batch(100).unwrap(), 50);
    assert!(orch.is_complete());
    assert_eq!(orch.run_batch(100).unwrap(), 0);

    let err = orch.run_iteration().unwrap_err();
    assert!(matches!(err, SimulationError::InvariantViolation(_)));
}

#[test]
fn test_progress_reports_counts_and_eta() {
    let mut orch = Orchestrator::new(example_config(), revenue_cost_profit()).unwrap();

    let initial = orch.progress(Duration::ZERO);
    assert_eq!(initial.iterations_completed, 0);
    assert_eq!(initial.confidence_interval, None);

    orch.run_batch(250).unwrap();
    let progress = orch.progress(Duration::from_millis(500));
    assert_eq!(progress.run_id, orch.run_id());
    assert_eq!(progress.iterations_completed, 250);
    assert_eq!(progress.total_iterations, 1_000);
    assert_eq!(progress.elapsed_ms, 500);
    assert_eq!(progress.estimated_remaining_ms, 1_500);
    assert!(progress.confidence_interval.is_some());
}

#[test]
fn test_config_hash_tracks_inputs() {
    let graph = revenue_cost_profit();
    let base = compute_config_hash(&example_config(), &graph).unwrap();

    assert_eq!(base.len(), 64);
    assert_eq!(base, compute_config_hash(&example_config(), &graph).unwrap());

    let reseeded = SimulationConfig {
        seed: 7,
        ..example_config()
    };
    assert_ne!(base, compute_config_hash(&reseeded, &graph).unwrap());

    let orch = Orchestrator::new(example_config(), graph).unwrap();
    assert_eq!(orch.result().config_hash, base);
}

#[test]
fn test_empty_result_before_first_iteration() {
    let orch = Orchestrator::new(example_config(), revenue_cost_profit()).unwrap();
    let result = orch.result();

    assert!(result.optimal_path.is_empty());
    assert_eq!(result.expected_value, 0.0);
    assert_eq!(result.confidence_interval, None);
    assert!(!result.convergence_achieved);
}

#[test]
fn test_multi_scenario_run_with_uncertainty() {
    let graph = build_graph(
        vec![
            FlowNode::new("salary", "Salary", NodeCategory::Income, 4000.0),
            FlowNode::new("checking", "Checking", NodeCategory::Asset, 0.0),
            FlowNode::new("loan", "Loan", NodeCategory::Liability, 0.0),
            FlowNode::new("stocks", "Stocks", NodeCategory::Investment, 0.0),
        ],
        vec![
            FlowLink::new(0, 1, 4000.0, "deposit").with_uncertainty(Uncertainty::Normal { std_dev: 0.1 }),
            FlowLink::new(1, 2, 900.0, "repay").with_uncertainty(Uncertainty::Uniform { low: 0.0, high: 0.2 }),
            FlowLink::new(1, 3, 900.0, "invest").with_uncertainty(Uncertainty::LogNormal { sigma: 0.5 }),
        ],
    )
    .unwrap();
    let config = SimulationConfig {
        iterations: 2_000,
        time_horizon_months: 36,
        scenarios: vec![Scenario::Baseline, Scenario::Recession, Scenario::Growth],
        risk_tolerance: RiskTolerance::Aggressive,
        ..Default::default()
    };

    let mut orch = Orchestrator::new(config, graph).unwrap();
    orch.run_batch(2_000).unwrap();
    let result = orch.result();

    assert!(result.expected_value.is_finite());
    assert!(result.risk_metrics.volatility > 0.0);
    assert!(result.risk_metrics.max_drawdown >= 0.0);
    assert_eq!(result.optimal_path.first().map(|s| s.from.as_str()), Some("salary"));
    // Investing beats repaying a liability on average
    assert_eq!(result.optimal_path.last().map(|s| s.to.as_str()), Some("stocks"));
}
