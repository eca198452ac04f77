//! Connection lifecycle, preconditions, pause/resume/cancel and jogging.

use super::{Rig, wait_for};
use gantry_common::protocol::deserialize;
use gantry_control::{EngineError, Host, Pose, PoseSet, Project, WorkPhase, WorkType};
use gantry_hal::TransportError;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn project() -> Project {
    let pose = |line: &str| Pose::new(deserialize(line).unwrap(), Vec::new());
    Project {
        devices: vec![1, 2],
        homing_sequence: ">1G28\r>2G28".to_string(),
        pose_sets: vec![
            PoseSet::new(vec![pose(">1G0X1"), pose(">2G0X1")]),
            PoseSet::new(vec![pose(">1G0X2"), pose(">2G0X2")]),
        ],
        ready_positions: vec![deserialize(">1G0X0").unwrap(), deserialize(">2G0X0").unwrap()],
    }
}

#[test]
fn connect_twice_opens_once() {
    let rig = Rig::connected(project());
    rig.orchestrator.connect().unwrap();
    assert_eq!(rig.port.opens.load(Ordering::SeqCst), 1);
    assert!(rig.orchestrator.is_connected());

    rig.orchestrator.disconnect();
    assert!(!rig.orchestrator.is_connected());
    assert!(!rig.orchestrator.is_clear_to_send());
}

#[test]
fn start_requires_connection() {
    let rig = Rig::disconnected(project(), Host::default());
    assert!(matches!(
        rig.orchestrator.start_imaging(),
        Err(EngineError::NotConnected)
    ));
    assert_eq!(rig.orchestrator.phase(), WorkPhase::Idle);
    assert!(matches!(
        rig.orchestrator.query_status(),
        Err(EngineError::NotConnected)
    ));
}

#[test]
fn start_while_busy_is_rejected() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");

    let before = o.remaining_batch();
    assert!(matches!(o.start_homing(), Err(EngineError::Busy)));
    assert!(matches!(o.start_imaging(), Err(EngineError::Busy)));
    assert!(matches!(o.open_project(project()), Err(EngineError::Busy)));
    assert_eq!(o.remaining_batch(), before);
    assert_eq!(o.work_type(), Some(WorkType::Imaging));
    o.cancel();
}

#[test]
fn pause_and_resume_keep_the_batch() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    assert!(matches!(o.pause(), Err(EngineError::NotRunning)));

    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");
    o.pause().unwrap();
    assert_eq!(o.phase(), WorkPhase::Paused);
    assert!(matches!(o.pause(), Err(EngineError::NotRunning)));

    let paused = o.remaining_batch();
    assert_eq!(paused.len(), 3);
    rig.report_idle(&[1, 2]);
    assert!(wait_for(|| o.is_clear_to_send()));
    assert!(rig.no_write_within(Duration::from_millis(100)));
    assert_eq!(o.remaining_batch(), paused);

    o.resume().unwrap();
    assert!(matches!(o.resume(), Err(EngineError::NotPaused)));
    assert_eq!(rig.next_write(), ">1G0X1\r>2G0X1");
    assert_eq!(o.remaining_batch(), paused[1..].to_vec());
    o.cancel();
}

#[test]
fn cancel_discards_and_queries() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");

    o.cancel();
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(o.remaining_batch().is_empty());
    assert_eq!(o.current_pose_set(), None);
    assert!(!o.registry().device(1).unwrap().is_writing_serial);
    assert_eq!(rig.next_write(), ">1M120\r>2M120");

    // Nothing active: no query.
    o.cancel();
    assert!(rig.no_write_within(Duration::from_millis(50)));
}

#[test]
fn motion_jobs_require_homing() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;

    match o.start_set_ready() {
        Err(EngineError::NotHomed(ids)) => assert_eq!(ids, vec![1, 2]),
        other => panic!("expected NotHomed, got {other:?}"),
    }
    assert!(matches!(
        o.jog(&[deserialize(">1G0X5").unwrap()]),
        Err(EngineError::NotHomed(_))
    ));
    assert_eq!(o.phase(), WorkPhase::Idle);

    o.start_homing().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");
    rig.report_idle(&[1, 2]);
    assert_eq!(rig.next_write(), ">1G28\r>2G28");
    rig.report_idle(&[1, 2]);
    assert_eq!(rig.next_write(), ">1M18\r>2M18");
    rig.report_idle(&[1, 2]);
    assert!(o.wait_until_idle(super::TIMEOUT));
    assert!(o.registry().device(2).unwrap().is_homed);

    o.start_set_ready().unwrap();
    assert_eq!(rig.next_write(), ">1G0X0\r>2G0X0");
    o.cancel();
}

#[test]
fn empty_jobs_are_rejected() {
    let rig = Rig::connected(Project::with_devices([1]));
    assert!(matches!(
        rig.orchestrator.start_imaging(),
        Err(EngineError::EmptyBatch(WorkType::Imaging))
    ));
    assert!(matches!(
        rig.orchestrator.jog(&[]),
        Err(EngineError::EmptyBatch(WorkType::Jogging))
    ));
}

#[test]
fn jogs_queue_into_the_running_job() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.registry().mark_homed(&[1, 2]);

    o.jog(&[deserialize(">1G0X5").unwrap()]).unwrap();
    assert_eq!(o.work_type(), Some(WorkType::Jogging));
    assert_eq!(rig.next_write(), ">1G90\r>2G90");

    o.jog(&[deserialize(">2G0Y3").unwrap()]).unwrap();
    rig.report_idle(&[1, 2]);
    assert_eq!(rig.next_write(), ">2G0Y3");
    rig.report_idle(&[2]);
    assert_eq!(rig.next_write(), ">1G0X5");
    rig.report_idle(&[1]);

    // Jogging has no footer.
    assert!(o.wait_until_idle(super::TIMEOUT));
    assert!(rig.no_write_within(Duration::from_millis(50)));
    assert!(wait_for(|| rig.events.finished.load(Ordering::SeqCst) == 1));
}

#[test]
fn send_immediate_bypasses_the_handshake() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");
    assert!(!o.is_clear_to_send());

    o.send_immediate(&[deserialize(">1M120").unwrap()]).unwrap();
    assert_eq!(rig.next_write(), ">1M120");
    o.unlock().unwrap();
    assert_eq!(rig.next_write(), ">1M511\r>2M511");
    assert!(!o.is_clear_to_send());
    o.cancel();
}

#[test]
fn disconnect_ends_the_job() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    rig.next_write();

    o.disconnect();
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(matches!(o.resume(), Err(EngineError::NotConnected)));
    assert_eq!(rig.events.faulted.load(Ordering::SeqCst), 0);
}

#[test]
fn selecting_an_unknown_port_keeps_the_link() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");

    assert!(matches!(
        o.select_port("/dev/gantry-missing"),
        Err(EngineError::Transport(TransportError::PortNotFound(_)))
    ));
    assert!(o.is_connected());
    assert_eq!(o.ports().selected().as_deref(), Some(super::PORT));
    assert_eq!(o.work_type(), Some(WorkType::Imaging));

    rig.report_idle(&[1, 2]);
    assert_eq!(rig.next_write(), ">1G0X1\r>2G0X1");
    o.cancel();
}
