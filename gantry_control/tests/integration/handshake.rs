//! Listener behaviour: clear-to-send, report folding, lock handling and
//! connect-time recovery.

use super::{Rig, wait_for};
use gantry_common::device::DeviceStatus;
use gantry_common::protocol::deserialize;
use gantry_control::{Host, Pose, PoseSet, Project, WorkPhase};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

fn project() -> Project {
    let pose = |line: &str| Pose::new(deserialize(line).unwrap(), Vec::new());
    Project {
        devices: vec![1, 2],
        pose_sets: vec![PoseSet::new(vec![pose(">1G0X1"), pose(">2G0X1")])],
        ..Project::default()
    }
}

#[test]
fn clear_to_send_waits_for_every_device() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();

    assert_eq!(rig.next_write(), ">1G90\r>2G90");
    assert!(!o.is_clear_to_send());
    rig.inject("<id:1,ssf:0>");
    rig.inject("<id:2,ssf:1>");
    thread::sleep(Duration::from_millis(50));
    assert!(!o.is_clear_to_send(), "device 2 is still moving");

    rig.inject("<id:2,ssf:0>");
    assert_eq!(rig.next_write(), ">1G0X1\r>2G0X1");
    o.cancel();
}

#[test]
fn report_line_updates_device() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    rig.next_write();
    assert!(o.registry().device(2).unwrap().is_writing_serial);
    assert_eq!(o.registry().device(2).unwrap().status(), DeviceStatus::Busy);

    rig.inject("<id:2,ssf:0,pos:10.0,20.0,0.0,0.0,0.0>");
    assert!(wait_for(|| {
        let device = o.registry().device(2).unwrap();
        device.status() == DeviceStatus::Idle && !device.is_writing_serial
    }));
    let device = o.registry().device(2).unwrap();
    let position = device.last_response.unwrap().position.unwrap();
    assert_eq!(position.x, 10.0);
    assert_eq!(position.y, 20.0);
    o.cancel();
}

#[test]
fn unknown_devices_and_text_are_ignored() {
    let rig = Rig::connected(project());
    rig.inject("<id:9,ssf:0>");
    rig.inject("garbage <id:");
    rig.inject("<id:1,ssf:0>");
    assert!(wait_for(|| rig.orchestrator.is_clear_to_send()));
    assert!(rig.orchestrator.registry().device(9).is_none());
    assert_eq!(rig.orchestrator.registry().len(), 2);
}

#[test]
fn lock_mid_job_faults_once() {
    let rig = Rig::connected(project());
    let o = &rig.orchestrator;
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90\r>2G90");

    rig.inject("<id:1,ssf:128>");
    assert!(wait_for(|| rig.events.faulted.load(Ordering::SeqCst) == 1));
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(o.remaining_batch().is_empty());

    rig.inject("<id:1,ssf:128>");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.events.faulted.load(Ordering::SeqCst), 1);
    assert_eq!(rig.events.finished.load(Ordering::SeqCst), 0);
    assert_eq!(o.stats().jobs_faulted, 1);
    // Past the grace window: no automatic unlock.
    assert!(rig.no_write_within(Duration::from_millis(50)));
}

#[test]
fn locked_report_within_grace_is_unlocked() {
    let rig = Rig::disconnected(project(), Host::default());
    rig.orchestrator.connect().unwrap();
    rig.inject("<id:1,ssf:0>");
    rig.inject("<id:2,ssf:128>");
    assert_eq!(rig.next_write(), ">1M511\r>2M511");

    // Only once.
    rig.inject("<id:2,ssf:128>");
    assert!(rig.no_write_within(Duration::from_millis(50)));

    rig.inject("<id:2,ssf:0>");
    assert!(wait_for(|| rig.orchestrator.is_clear_to_send()));
    assert!(!rig.orchestrator.registry().any_locked());
}

#[test]
fn silent_devices_are_queried_after_grace() {
    let rig = Rig::disconnected(project(), Host::default());
    rig.orchestrator.connect().unwrap();
    rig.inject("<id:1,ssf:0>");
    assert_eq!(rig.next_write(), ">2M120");
    assert!(rig.no_write_within(Duration::from_millis(super::GRACE_MS)));
}

#[test]
fn machine_idle_fires_on_transition() {
    let rig = Rig::connected(project());
    assert!(wait_for(|| rig.events.idle.load(Ordering::SeqCst) == 1));

    rig.inject("<id:1,ssf:1>");
    rig.inject("<id:1,ssf:0>");
    assert!(wait_for(|| rig.events.idle.load(Ordering::SeqCst) == 2));
}
