//! Simulated scenarios driven through the tracker.

use sim::{Scenario, ScenarioKind};
use tracker_core::{AssociationStrategy, ScanProcessor, TrackStore, TrackerConfig};

fn track_scenario(kind: ScenarioKind, strategy: AssociationStrategy, seed: u64) {
    let scenario = Scenario::build(kind, seed);
    let log = scenario.run();
    let config = TrackerConfig {
        association: strategy,
        measurement_noise: scenario.sensor.noise,
        ..Default::default()
    };
    let mut processor = ScanProcessor::new(config).unwrap();
    let mut store = TrackStore::new();
    for scan in &log.scans {
        processor.process_scan(&mut store, scan).unwrap();
    }

    let truth = log.ground_truth.last().unwrap();
    for target in &truth.targets {
        let p = &target.state;
        let nearest = store
            .tracks()
            .iter()
            .filter(|t| t.confirmed_once)
            .map(|t| {
                let q = t.position();
                ((q[0] - p[0]).powi(2) + (q[1] - p[1]).powi(2) + (q[2] - p[2]).powi(2)).sqrt()
            })
            .fold(f64::INFINITY, f64::min);
        assert!(
            nearest < 1_000.0,
            "{strategy:?}: target {} has no established track (nearest {nearest:.0} m)",
            target.id
        );
    }
}

#[test]
fn simple_scenario_optimal_assignment() {
    track_scenario(ScenarioKind::Simple, AssociationStrategy::OptimalAssignment, 7);
}

#[test]
fn simple_scenario_probabilistic() {
    track_scenario(ScenarioKind::Simple, AssociationStrategy::ProbabilisticJoint, 7);
}
