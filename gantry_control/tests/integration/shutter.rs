//! Pre/post shutter delays and cancellation inside a delay.

use super::{Rig, engine};
use gantry_common::config::EngineConfig;
use gantry_common::protocol::deserialize;
use gantry_control::{Pose, PoseSet, Project, WorkPhase};
use std::time::{Duration, Instant};

fn shutter_project() -> Project {
    let pose = |position: &str| {
        Pose::new(
            deserialize(position).unwrap(),
            vec![deserialize(">1C0").unwrap()],
        )
    };
    Project {
        devices: vec![1],
        pose_sets: vec![
            PoseSet::new(vec![pose(">1G0X1")]),
            PoseSet::new(vec![pose(">1G0X2")]),
        ],
        ..Project::default()
    }
}

/// Time from acknowledging device 1 until the next write.
fn gap_after_ack(rig: &Rig) -> (String, Duration) {
    let acked = Instant::now();
    rig.report_idle(&[1]);
    let line = rig.next_write();
    (line, acked.elapsed())
}

#[test]
fn pre_shutter_delay_runs_once_per_job() {
    let delay = Duration::from_millis(400);
    let rig = Rig::connected_with(
        shutter_project(),
        EngineConfig {
            pre_shutter_delay_ms: 400,
            ..engine()
        },
    );
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90");

    let (line, first) = gap_after_ack(&rig);
    assert_eq!(line, ">1G0X1\r>1C0");
    assert!(first >= delay, "first shutter sent after {first:?}");

    let (line, second) = gap_after_ack(&rig);
    assert_eq!(line, ">1G0X2\r>1C0");
    assert!(second < delay, "second shutter delayed {second:?}");

    let (line, _) = gap_after_ack(&rig);
    assert_eq!(line, ">1M18");
    rig.report_idle(&[1]);
    assert!(o.wait_until_idle(super::TIMEOUT));
}

#[test]
fn post_shutter_delay_precedes_next_send() {
    let delay = Duration::from_millis(300);
    let rig = Rig::connected_with(
        shutter_project(),
        EngineConfig {
            post_shutter_delay_ms: 300,
            ..engine()
        },
    );
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90");

    let (line, first) = gap_after_ack(&rig);
    assert_eq!(line, ">1G0X1\r>1C0");
    assert!(first < delay, "nothing armed yet, waited {first:?}");

    let (line, second) = gap_after_ack(&rig);
    assert_eq!(line, ">1G0X2\r>1C0");
    assert!(second >= delay, "sent after {second:?}");

    // The footer also waits out the delay armed by the last shutter.
    let (line, footer) = gap_after_ack(&rig);
    assert_eq!(line, ">1M18");
    assert!(footer >= delay, "footer sent after {footer:?}");
    rig.report_idle(&[1]);
    assert!(o.wait_until_idle(super::TIMEOUT));
}

#[test]
fn cancel_interrupts_a_shutter_delay() {
    let rig = Rig::connected_with(
        shutter_project(),
        EngineConfig {
            pre_shutter_delay_ms: 30_000,
            ..engine()
        },
    );
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90");
    rig.report_idle(&[1]);
    std::thread::sleep(Duration::from_millis(50));

    let cancelled = Instant::now();
    o.cancel();
    assert!(cancelled.elapsed() < Duration::from_secs(1));
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(o.remaining_batch().is_empty());

    // Only the status query follows; the shutter run was never sent.
    assert_eq!(rig.next_write(), ">1M120");
    assert!(rig.no_write_within(Duration::from_millis(50)));
}
