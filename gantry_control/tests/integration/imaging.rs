//! Imaging jobs against the scripted rig.

use super::{Rig, wait_for};
use gantry_common::protocol::deserialize;
use gantry_control::{
    ActivityLog, CameraControl, Host, Pose, PoseSet, Project, WorkPhase, WorkType,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn pose(position: &str, payload: &[&str]) -> Pose {
    Pose::new(
        deserialize(position).unwrap(),
        payload.iter().map(|l| deserialize(l).unwrap()).collect(),
    )
}

fn single_pose_project() -> Project {
    Project {
        devices: vec![1, 2],
        pose_sets: vec![PoseSet::new(vec![pose(">1G0X10", &[">1C0"])])],
        ..Project::default()
    }
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    next_record: Mutex<u64>,
}

impl CameraControl for Recorder {
    fn connect(&self, device: u32) -> bool {
        self.calls.lock().push(format!("connect {device}"));
        true
    }

    fn take_picture(&self, device: u32, autofocus: bool) {
        self.calls.lock().push(format!("picture {device} {autofocus}"));
    }

    fn focus(&self, device: u32, hold: Duration) {
        self.calls.lock().push(format!("focus {device} {}", hold.as_secs()));
    }
}

impl ActivityLog for Recorder {
    fn start_pose(&self, device: u32, source: &str, session_id: u64) -> u64 {
        self.calls
            .lock()
            .push(format!("start {device} {source} {session_id}"));
        let mut next = self.next_record.lock();
        *next += 1;
        *next
    }

    fn end_pose(&self, device: u32) -> Option<u64> {
        self.calls.lock().push(format!("end {device}"));
        None
    }
}

#[test]
fn two_device_single_pose_job() {
    let rig = Rig::connected(single_pose_project());
    let o = &rig.orchestrator;

    o.start_imaging().unwrap();
    assert_eq!(o.work_type(), Some(WorkType::Imaging));
    assert_eq!(o.batch_offsets(), Some((1, 2)));

    assert_eq!(rig.next_write(), ">1G90\r>2G90");
    assert!(!o.is_clear_to_send());
    rig.report_idle(&[1, 2]);

    assert_eq!(rig.next_write(), ">1G0X10\r>1C0");
    assert!(!o.is_clear_to_send());
    assert_eq!(o.current_pose_set(), Some(0));
    assert!(o.imaged_pose_sets().is_empty());
    rig.report_idle(&[1]);

    assert_eq!(rig.next_write(), ">1M18\r>2M18");
    assert!(!o.is_clear_to_send());
    assert_eq!(o.imaged_pose_sets(), vec![0]);
    assert_eq!(o.current_pose_set(), None);
    rig.report_idle(&[1, 2]);

    assert!(o.wait_until_idle(super::TIMEOUT));
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(o.imaged_pose_sets().is_empty());
    assert_eq!(o.batch_offsets(), None);
    assert!(wait_for(|| rig.events.finished.load(Ordering::SeqCst) == 1));
    assert_eq!(rig.events.imaged.load(Ordering::SeqCst), 1);
    assert_eq!(rig.events.faulted.load(Ordering::SeqCst), 0);
    assert_eq!(o.stats().serial_writes, 3);
}

#[test]
fn absolute_mode_is_remembered_between_jobs() {
    let rig = Rig::connected(single_pose_project());
    let o = &rig.orchestrator;

    o.start_imaging().unwrap();
    for _ in 0..3 {
        rig.next_write();
        rig.report_idle(&[1, 2]);
    }
    assert!(o.wait_until_idle(super::TIMEOUT));
    assert!(o.registry().device(1).unwrap().is_absolute);

    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G0X10\r>1C0");
    o.cancel();
}

#[test]
fn camera_runs_go_to_the_host() {
    let recorder = Arc::new(Recorder::default());
    let host = Host {
        camera: recorder.clone(),
        activity: recorder.clone(),
        session_id: 7,
    };
    let project = Project {
        devices: vec![1],
        pose_sets: vec![PoseSet::new(vec![pose(">1G0X5", &[">1E0S1"])])],
        ..Project::default()
    };
    let rig = Rig::with_host(project, host);
    let o = &rig.orchestrator;

    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90");
    rig.report_idle(&[1]);
    assert_eq!(rig.next_write(), ">1G0X5");
    rig.report_idle(&[1]);
    // Camera run, then the footer.
    assert_eq!(rig.next_write(), ">1M18");
    rig.report_idle(&[1]);
    assert!(o.wait_until_idle(super::TIMEOUT));

    let calls = recorder.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            "start 1 >1G0X5\r>1E0S1 7".to_string(),
            "picture 1 true".to_string(),
            "end 1".to_string(),
        ]
    );
    assert_eq!(o.stats().camera_actions, 1);
}

#[test]
fn body_covers_every_pose_row() {
    let project = Project {
        devices: vec![1, 2],
        pose_sets: vec![
            PoseSet::new(vec![
                pose(">1G0X1", &[]),
                pose(">2G0X1", &[]),
                pose(">1G0X2", &[]),
            ]),
            PoseSet::new(vec![pose(">2G0X3", &[])]),
        ],
        ..Project::default()
    };
    let rig = Rig::connected(project);
    let o = &rig.orchestrator;

    o.start_imaging().unwrap();
    let expected = [
        ">1G90\r>2G90",
        ">1G0X1\r>2G0X1",
        ">1G0X2",
        ">2G0X3",
        ">1M18\r>2M18",
    ];
    for line in expected {
        assert_eq!(rig.next_write(), line);
        rig.report_idle(&[1, 2]);
    }
    assert!(o.wait_until_idle(super::TIMEOUT));
    assert!(wait_for(|| rig.events.imaged.load(Ordering::SeqCst) == 2));
}

struct CrashingCamera;

impl CameraControl for CrashingCamera {
    fn connect(&self, _device: u32) -> bool {
        true
    }

    fn take_picture(&self, _device: u32, _autofocus: bool) {
        panic!("camera SDK crashed");
    }

    fn focus(&self, _device: u32, _hold: Duration) {}
}

#[test]
fn camera_panic_faults_the_job() {
    let host = Host {
        camera: Arc::new(CrashingCamera),
        ..Host::default()
    };
    let project = Project {
        devices: vec![1],
        pose_sets: vec![PoseSet::new(vec![pose(">1G0X5", &[">1E0S1"])])],
        ..Project::default()
    };
    let rig = Rig::with_host(project, host);
    let o = &rig.orchestrator;

    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G90");
    rig.report_idle(&[1]);
    assert_eq!(rig.next_write(), ">1G0X5");
    rig.report_idle(&[1]);

    assert!(wait_for(|| rig.events.faulted.load(Ordering::SeqCst) == 1));
    assert_eq!(o.phase(), WorkPhase::Idle);
    assert!(o.remaining_batch().is_empty());
    assert!(!o.registry().device(1).unwrap().is_writing_camera);
    assert_eq!(o.stats().jobs_faulted, 1);
    assert_eq!(rig.events.finished.load(Ordering::SeqCst), 0);

    // The engine takes new work.
    o.start_imaging().unwrap();
    assert_eq!(rig.next_write(), ">1G0X5");
    o.cancel();
}
