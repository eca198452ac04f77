//! End to end against the loopback rig emulator.

use super::{JobEvents, TIMEOUT, engine, transport, wait_for};
use gantry_common::config::EmulatorConfig;
use gantry_common::consts::LOOPBACK_PORT_NAME;
use gantry_common::protocol::deserialize;
use gantry_control::{Host, Orchestrator, Pose, PoseSet, Project, WorkPhase};
use gantry_hal::PortManager;
use gantry_hal::drivers::loopback::LoopbackDriver;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn rig(emulator: EmulatorConfig) -> (Orchestrator, Arc<LoopbackDriver>, Arc<JobEvents>) {
    let driver = Arc::new(LoopbackDriver::new(&emulator));
    let ports = Arc::new(PortManager::new(transport()));
    ports.register(driver.clone()).unwrap();

    let orchestrator = Orchestrator::with_engine(engine(), ports, Host::default());
    let events = Arc::new(JobEvents::default());
    orchestrator.events().register_job_listener(events.clone());

    let pose = |position: &str, payload: &str| {
        Pose::new(
            deserialize(position).unwrap(),
            vec![deserialize(payload).unwrap()],
        )
    };
    orchestrator
        .open_project(Project {
            devices: emulator.devices.clone(),
            homing_sequence: String::new(),
            pose_sets: vec![
                PoseSet::new(vec![pose(">1G0X10Y5", ">1C0"), pose(">2G0Z3", ">2C0")]),
                PoseSet::new(vec![pose(">1G0X20", ">1C1")]),
            ],
            ready_positions: vec![deserialize(">1G0X1").unwrap(), deserialize(">2G0X1").unwrap()],
        })
        .unwrap();
    orchestrator.select_port(LOOPBACK_PORT_NAME).unwrap();
    orchestrator.connect().unwrap();
    assert!(wait_for(|| orchestrator.is_clear_to_send()));
    (orchestrator, driver, events)
}

#[test]
fn home_ready_image_jog() {
    let (o, driver, events) = rig(EmulatorConfig::default());

    o.start_homing().unwrap();
    assert!(o.wait_until_idle(TIMEOUT));
    assert!(o.registry().device(1).unwrap().is_homed);
    assert!(driver.emulator().lock().gantry(2).unwrap().homed);

    o.start_set_ready().unwrap();
    assert!(o.wait_until_idle(TIMEOUT));
    assert_eq!(driver.emulator().lock().gantry(2).unwrap().position.x, 1.0);

    o.start_imaging().unwrap();
    assert!(o.wait_until_idle(TIMEOUT));
    let gantry = driver.emulator().lock().gantry(1).unwrap().clone();
    assert_eq!(gantry.position.x, 20.0);
    assert_eq!(gantry.position.y, 5.0);
    assert!(!gantry.engaged);
    assert_eq!(events.imaged.load(Ordering::SeqCst), 2);

    o.jog(&[deserialize(">2G0Y7").unwrap()]).unwrap();
    assert!(o.wait_until_idle(TIMEOUT));
    assert_eq!(driver.emulator().lock().gantry(2).unwrap().position.y, 7.0);

    assert!(wait_for(|| events.finished.load(Ordering::SeqCst) == 4));
    assert_eq!(events.faulted.load(Ordering::SeqCst), 0);
    assert_eq!(o.phase(), WorkPhase::Idle);
}

#[test]
fn locked_rig_is_unlocked_on_connect() {
    let emulator = EmulatorConfig {
        start_locked: true,
        ..EmulatorConfig::default()
    };
    let (o, driver, _events) = rig(emulator);
    assert!(wait_for(|| !o.registry().any_locked()));
    assert!(!driver.emulator().lock().gantry(1).unwrap().locked);
    assert!(!driver.emulator().lock().gantry(2).unwrap().locked);
}

#[test]
fn reconnect_keeps_homed_devices() {
    let (o, _driver, _events) = rig(EmulatorConfig::default());
    o.start_homing().unwrap();
    assert!(o.wait_until_idle(TIMEOUT));

    o.disconnect();
    o.connect().unwrap();
    let device = o.registry().device(1).unwrap();
    assert!(device.is_homed);
    assert!(!device.is_absolute);
    assert!(wait_for(|| o.is_clear_to_send()));

    // Homed devices may move straight away; the header re-sends G90.
    o.start_set_ready().unwrap();
    assert!(o.wait_until_idle(TIMEOUT));
}
