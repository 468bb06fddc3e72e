//! Integration tests for the vibrations sweep
//!
//! Every test runs the full procedure against the simulated machine and inspects the
//! shared event log: motion, recording and velocity-limit events all land in one ordered
//! stream, so ordering guarantees can be checked directly.

use std::sync::Arc;
use std::time::Duration;

use vibration_profile::error::SweepError;
use vibration_profile::hardware::capabilities::{AxisHint, Point, VelocityLimits};
use vibration_profile::hardware::mock::{
    EventLog, MachineEvent, MockAccelerometer, MockAnalysisPipeline, MockToolhead,
    MockToolheadConfig,
};
use vibration_profile::hardware::{Machine, SensorRegistry};
use vibration_profile::procedures::kinematics::KinematicsFamily;
use vibration_profile::procedures::synchronizer::SETTLE_DELAY;
use vibration_profile::procedures::{ProcedureState, SweepConfig, VibrationsProfile};

const EPS: f64 = 1e-9;

struct Rig {
    log: EventLog,
    toolhead: Arc<MockToolhead>,
    pipeline: MockAnalysisPipeline,
    machine: Machine,
}

fn rig(config: MockToolheadConfig, sensors: &[(&str, &[AxisHint])]) -> Rig {
    let log = EventLog::new();
    let toolhead = Arc::new(MockToolhead::with_log(config, log.clone()));

    let mut registry = SensorRegistry::new();
    for (id, axes) in sensors {
        registry
            .register(Arc::new(MockAccelerometer::new(*id, log.clone())), axes)
            .unwrap();
    }

    let machine = Machine::new(toolhead.clone(), Arc::new(registry));
    let pipeline = MockAnalysisPipeline::new(log.clone());
    Rig {
        log,
        toolhead,
        pipeline,
        machine,
    }
}

fn default_rig() -> Rig {
    rig(
        MockToolheadConfig::default(),
        &[("adxl345", &[AxisHint::A, AxisHint::B, AxisHint::Combined])],
    )
}

/// Speeds 2, 6 and 10 mm/s: one pass each
fn small_sweep() -> SweepConfig {
    SweepConfig {
        size: 50.0,
        max_speed: 10.0,
        speed_increment: 4.0,
        ..Default::default()
    }
}

fn original_limits() -> VelocityLimits {
    MockToolheadConfig::default().limits
}

fn count(events: &[MachineEvent], pred: impl Fn(&MachineEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[tokio::test]
async fn test_cartesian_sweep_end_to_end() {
    let rig = default_rig();
    let (mut procedure, progress) = VibrationsProfile::new(small_sweep());

    let report = procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    assert_eq!(report.kinematics, KinematicsFamily::Cartesian);
    assert_eq!(report.angles, vec![0.0, 90.0]);
    assert_eq!(report.speeds_per_angle, 3);
    assert_eq!(report.recordings, 6);
    assert_eq!(report.restored_limits, original_limits());
    assert_eq!(procedure.state(), ProcedureState::Completed);
    assert_eq!(progress.borrow().state, ProcedureState::Completed);
    assert!((progress.borrow().overall_progress - 1.0).abs() < EPS);

    let captured = rig.pipeline.captured().await;
    assert!(captured.completed);
    assert_eq!(captured.kinematics, Some(KinematicsFamily::Cartesian));
    assert_eq!(captured.accel, Some(3000));

    let measurements = captured.measurements.unwrap();
    assert_eq!(
        measurements.names(),
        vec![
            "vib_an0_00sp2_00",
            "vib_an0_00sp6_00",
            "vib_an0_00sp10_00",
            "vib_an90_00sp2_00",
            "vib_an90_00sp6_00",
            "vib_an90_00sp10_00",
        ]
    );
    assert!(measurements.iter().all(|r| r.append_time));
    assert!(measurements.iter().all(|r| !r.samples.is_empty()));
    assert_eq!(report.total_samples, measurements.total_samples());

    assert_eq!(rig.toolhead.current_limits().await, original_limits());
}

#[tokio::test]
async fn test_event_ordering() {
    let rig = default_rig();
    let config = small_sweep();
    let (mut procedure, _progress) = VibrationsProfile::new(config.clone());
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    let events = rig.log.snapshot();

    // Test limits go in before anything moves
    assert_eq!(
        events[0],
        MachineEvent::LimitsSet(VelocityLimits {
            max_accel: 3000.0,
            corner_velocity: 5.0,
            cruise_ratio: Some(0.0),
        })
    );

    // Approach: raise Z slowly, park near the center, dwell
    assert_eq!(
        events[1],
        MachineEvent::Move {
            target: Point::new(0.0, 0.0, config.z_height),
            feedrate: config.travel_speed / 10.0,
        }
    );
    assert_eq!(
        events[2],
        MachineEvent::Move {
            target: Point::new(135.0, 135.0, config.z_height),
            feedrate: config.travel_speed,
        }
    );
    assert_eq!(events[3], MachineEvent::Dwell(Duration::from_millis(500)));

    // Each sample: positioning move, start, test moves only, stop, settle, drain
    let mut open: Option<usize> = None;
    for (i, event) in events.iter().enumerate() {
        match event {
            MachineEvent::RecordingStarted { append_time, .. } => {
                assert!(open.is_none(), "recording started while another was open");
                assert!(*append_time);
                assert!(matches!(
                    events[i - 1],
                    MachineEvent::Move { feedrate, .. } if feedrate == config.travel_speed
                ));
                open = Some(i);
            }
            MachineEvent::RecordingStopped { .. } => {
                let start = open.take().expect("stop without start");
                assert!(events[start + 1..i].iter().all(|e| matches!(
                    e,
                    MachineEvent::Move { feedrate, .. } if *feedrate < config.travel_speed
                )));
                assert_eq!(events[i + 1], MachineEvent::Dwell(SETTLE_DELAY));
                assert_eq!(events[i + 2], MachineEvent::Idle);
            }
            _ => {}
        }
    }
    assert!(open.is_none());

    // Restore, drain, then hand off
    let tail = &events[events.len() - 5..];
    assert_eq!(tail[0], MachineEvent::LimitsSet(original_limits()));
    assert_eq!(tail[1], MachineEvent::Idle);
    assert_eq!(tail[2], MachineEvent::PipelineConfigured);
    assert_eq!(tail[3], MachineEvent::PipelineSubmitted(6));
    assert_eq!(tail[4], MachineEvent::PipelineCompleted);

    assert_eq!(
        count(&events, |e| matches!(e, MachineEvent::LimitsSet(_))),
        2
    );
}

#[tokio::test]
async fn test_segments_follow_speed_profile() {
    let rig = default_rig();
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    let events = rig.log.snapshot();
    let start = events
        .iter()
        .position(|e| matches!(e, MachineEvent::RecordingStarted { .. }))
        .unwrap();

    // Angle 0, speed 2: factor 0.216, half length 25 * 0.216 = 5.4
    let MachineEvent::Move { target: from, .. } = events[start - 1] else {
        panic!("expected the positioning move before the first recording");
    };
    let MachineEvent::Move { target: to, feedrate } = events[start + 1] else {
        panic!("expected a test move after the first recording started");
    };
    assert!((from.x - 144.6).abs() < EPS);
    assert!((from.y - 150.0).abs() < EPS);
    assert!((to.x - 155.4).abs() < EPS);
    assert!((to.y - 150.0).abs() < EPS);
    assert_eq!(feedrate, 2.0);
}

#[tokio::test]
async fn test_repetitions_at_high_speed() {
    let rig = default_rig();
    let config = SweepConfig {
        size: 100.0,
        max_speed: 250.0,
        speed_increment: 124.0,
        ..Default::default()
    };
    let (mut procedure, _progress) = VibrationsProfile::new(config);
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    // Speeds 2, 126, 250: 1, 1 and 3 passes, 2 moves per pass
    let events = rig.log.snapshot();
    let mut moves_per_recording = Vec::new();
    let mut current = None;
    for event in &events {
        match event {
            MachineEvent::RecordingStarted { .. } => current = Some(0),
            MachineEvent::Move { .. } => {
                if let Some(n) = current.as_mut() {
                    *n += 1;
                }
            }
            MachineEvent::RecordingStopped { .. } => {
                moves_per_recording.push(current.take().unwrap());
            }
            _ => {}
        }
    }
    assert_eq!(moves_per_recording, vec![2, 2, 6, 2, 2, 6]);
}

#[tokio::test]
async fn test_corexy_uses_diagonal_angles_and_combined_sensor() {
    let rig = rig(
        MockToolheadConfig {
            kinematics: "corexy".into(),
            ..Default::default()
        },
        &[("toolhead_adxl", &[AxisHint::Combined])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());

    let report = procedure.run(&rig.machine, &rig.pipeline).await.unwrap();
    assert_eq!(report.angles, vec![45.0, 135.0]);

    let measurements = rig.pipeline.captured().await.measurements.unwrap();
    assert_eq!(measurements.names()[0], "vib_an45_00sp2_00");
    assert_eq!(measurements.names()[3], "vib_an135_00sp2_00");

    let events = rig.log.snapshot();
    assert!(events.iter().all(|e| match e {
        MachineEvent::RecordingStarted { sensor, .. } => sensor == "toolhead_adxl",
        _ => true,
    }));
}

#[tokio::test]
async fn test_explicit_chip_is_used_for_every_angle() {
    let rig = rig(
        MockToolheadConfig::default(),
        &[
            ("bed", &[AxisHint::B]),
            ("toolhead", &[AxisHint::A, AxisHint::Combined]),
        ],
    );
    let config = SweepConfig {
        accel_chip: Some("bed".into()),
        ..small_sweep()
    };
    let (mut procedure, _progress) = VibrationsProfile::new(config);
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    let sensors: Vec<String> = rig
        .log
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            MachineEvent::RecordingStarted { sensor, .. } => Some(sensor),
            _ => None,
        })
        .collect();
    assert_eq!(sensors.len(), 6);
    assert!(sensors.iter().all(|s| s == "bed"));
}

#[tokio::test]
async fn test_sensors_resolved_per_angle() {
    let rig = rig(
        MockToolheadConfig::default(),
        &[("x_chip", &[AxisHint::A]), ("y_chip", &[AxisHint::B])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    let sensors: Vec<String> = rig
        .log
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            MachineEvent::RecordingStarted { sensor, .. } => Some(sensor),
            _ => None,
        })
        .collect();
    assert_eq!(
        sensors,
        vec!["x_chip", "x_chip", "x_chip", "y_chip", "y_chip", "y_chip"]
    );
}

#[tokio::test]
async fn test_machine_without_cruise_ratio() {
    let limits = VelocityLimits {
        max_accel: 5000.0,
        corner_velocity: 8.0,
        cruise_ratio: None,
    };
    let rig = rig(
        MockToolheadConfig {
            limits,
            ..Default::default()
        },
        &[("adxl345", &[AxisHint::A, AxisHint::B])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());
    procedure.run(&rig.machine, &rig.pipeline).await.unwrap();

    let writes = rig.toolhead.limit_writes().await;
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.cruise_ratio.is_none()));
    assert_eq!(writes[0].max_accel, 3000.0);
    assert_eq!(writes[1], limits);
    assert_eq!(rig.toolhead.current_limits().await, limits);
}

#[tokio::test]
async fn test_unsupported_kinematics_touches_nothing() {
    let rig = rig(
        MockToolheadConfig {
            kinematics: "delta".into(),
            ..Default::default()
        },
        &[("adxl345", &[AxisHint::Combined])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::UnsupportedKinematics(ref k) if k == "delta"));
    assert!(rig.log.is_empty());
    assert!(rig.toolhead.limit_writes().await.is_empty());
    assert_eq!(procedure.state(), ProcedureState::Failed);
}

#[tokio::test]
async fn test_missing_input_shaper_touches_nothing() {
    let rig = rig(
        MockToolheadConfig {
            input_shaper: false,
            ..Default::default()
        },
        &[("adxl345", &[AxisHint::A, AxisHint::B])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::MissingPrerequisite(_)));
    assert!(rig.log.is_empty());
}

#[tokio::test]
async fn test_travel_too_short_touches_nothing() {
    let rig = default_rig();
    let config = SweepConfig {
        size: 50.0,
        max_speed: 13000.0,
        ..Default::default()
    };
    let (mut procedure, _progress) = VibrationsProfile::new(config);

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::InsufficientTravelDistance { .. }));
    assert!(err.is_validation());
    assert!(rig.log.is_empty());
}

#[tokio::test]
async fn test_sensor_not_found_restores_limits() {
    let rig = rig(MockToolheadConfig::default(), &[]);
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::SensorNotFound(_)));

    let events = rig.log.snapshot();
    assert_eq!(
        count(&events, |e| matches!(e, MachineEvent::RecordingStarted { .. })),
        0
    );
    assert_eq!(
        events.last(),
        Some(&MachineEvent::LimitsSet(original_limits()))
    );
    assert_eq!(rig.toolhead.current_limits().await, original_limits());
    assert!(rig.pipeline.captured().await.kinematics.is_none());
}

#[tokio::test]
async fn test_explicit_chip_not_attached() {
    let rig = default_rig();
    let config = SweepConfig {
        accel_chip: Some("lis2dw".into()),
        ..small_sweep()
    };
    let (mut procedure, _progress) = VibrationsProfile::new(config);

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert_eq!(err.to_string(), "Accelerometer [lis2dw] not found!");
    assert_eq!(rig.toolhead.current_limits().await, original_limits());
}

#[tokio::test]
async fn test_motion_failure_mid_recording() {
    // Moves: 2 approach, then per sample 1 positioning + 2 test moves.
    // Move 7 is the first test move of the second sample.
    let rig = rig(
        MockToolheadConfig {
            fail_on_move: Some(7),
            ..Default::default()
        },
        &[("adxl345", &[AxisHint::A, AxisHint::B])],
    );
    let (mut procedure, progress) = VibrationsProfile::new(small_sweep());

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::Hardware(_)));

    let events = rig.log.snapshot();
    let starts = count(&events, |e| matches!(e, MachineEvent::RecordingStarted { .. }));
    let stops = count(&events, |e| matches!(e, MachineEvent::RecordingStopped { .. }));
    assert_eq!(starts, 2);
    assert_eq!(stops, 2);

    assert_eq!(
        events.last(),
        Some(&MachineEvent::LimitsSet(original_limits()))
    );
    assert_eq!(rig.toolhead.current_limits().await, original_limits());
    assert!(!rig.pipeline.captured().await.completed);
    assert_eq!(progress.borrow().state, ProcedureState::Failed);
}

#[tokio::test]
async fn test_second_sweep_on_busy_machine() {
    let rig = default_rig();
    let _held = rig.machine.try_lock_sweep().unwrap();

    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());
    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();

    assert!(matches!(err, SweepError::MachineBusy));
    assert!(rig.toolhead.limit_writes().await.is_empty());
    assert_eq!(rig.toolhead.moves_issued().await, 0);
}

#[tokio::test]
async fn test_machine_released_after_sweep() {
    let rig = default_rig();

    let (mut first, _progress) = VibrationsProfile::new(small_sweep());
    first.run(&rig.machine, &rig.pipeline).await.unwrap();
    assert!(!rig.machine.is_busy());

    let pipeline = MockAnalysisPipeline::new(EventLog::new());
    let (mut second, _progress) = VibrationsProfile::new(small_sweep());
    assert!(second.run(&rig.machine, &pipeline).await.is_ok());
}

#[tokio::test]
async fn test_sensor_refusing_to_start_aborts_before_test_moves() {
    let log = EventLog::new();
    let toolhead = Arc::new(MockToolhead::with_log(
        MockToolheadConfig::default(),
        log.clone(),
    ));
    let mut registry = SensorRegistry::new();
    registry
        .register(
            Arc::new(MockAccelerometer::failing("adxl345", log.clone())),
            &[AxisHint::A, AxisHint::B],
        )
        .unwrap();
    let machine = Machine::new(toolhead.clone(), Arc::new(registry));
    let pipeline = MockAnalysisPipeline::new(log.clone());

    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());
    let err = procedure.run(&machine, &pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::Hardware(_)));

    // Approach plus the first positioning move, nothing at test speed
    assert_eq!(toolhead.moves_issued().await, 3);
    assert_eq!(toolhead.current_limits().await, original_limits());
    assert!(!machine.is_busy());
}

#[tokio::test]
async fn test_failed_restore_fails_the_sweep_before_handoff() {
    let rig = rig(
        MockToolheadConfig {
            fail_on_limit_write: Some(2),
            ..Default::default()
        },
        &[("adxl345", &[AxisHint::A, AxisHint::B])],
    );
    let (mut procedure, _progress) = VibrationsProfile::new(small_sweep());

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(matches!(err, SweepError::Hardware(_)));
    assert!(err.to_string().contains("write #2"));

    // All six recordings were taken, but nothing reached the pipeline
    let events = rig.log.snapshot();
    assert_eq!(
        count(&events, |e| matches!(e, MachineEvent::RecordingStopped { .. })),
        6
    );
    assert_eq!(rig.toolhead.limit_write_attempts().await, 2);
    let captured = rig.pipeline.captured().await;
    assert!(captured.kinematics.is_none());
    assert!(!captured.completed);
    assert_eq!(procedure.state(), ProcedureState::Failed);
}

#[tokio::test]
async fn test_non_finite_size_touches_nothing() {
    let rig = default_rig();
    let config = SweepConfig {
        size: f64::INFINITY,
        ..small_sweep()
    };
    let (mut procedure, _progress) = VibrationsProfile::new(config);

    let err = procedure.run(&rig.machine, &rig.pipeline).await.unwrap_err();
    assert!(err.is_validation());
    assert!(rig.log.is_empty());
    assert_eq!(rig.toolhead.limit_write_attempts().await, 0);
}
