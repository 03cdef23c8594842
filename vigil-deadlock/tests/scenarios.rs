use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use vigil_deadlock::{monitor, DetectorConfig, HazardKind, RunStatus};

fn named<F: FnOnce() + Send + 'static>(name: &str, f: F) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .unwrap()
}

#[test]
fn crossed_acquisition_is_a_circular_wait_and_a_deadlock() {
    let report = monitor(
        |d| {
            let l1 = Arc::new(d.mutex("L1", ()));
            let l2 = Arc::new(d.mutex("L2", ()));
            let barrier = Arc::new(Barrier::new(2));

            let a = {
                let (l1, l2, barrier) = (l1.clone(), l2.clone(), barrier.clone());
                named("A", move || {
                    let _first = l1.lock();
                    barrier.wait();
                    let _second = l2.lock();
                })
            };
            let b = named("B", move || {
                let _first = l2.lock();
                barrier.wait();
                let _second = l1.lock();
            });
            let _ = a.join();
            let _ = b.join();
        },
        Duration::from_millis(500),
    );

    assert_eq!(report.status, RunStatus::TimedOut);
    assert!(report.deadlocked);
    assert!(!report.is_clean());

    let cycles: Vec<_> = report.hazards_of(HazardKind::CircularWait).collect();
    assert_eq!(cycles.len(), 1);
    let mut threads = cycles[0].threads.clone();
    threads.sort();
    assert_eq!(threads, vec!["A", "B"]);
    let mut locks = cycles[0].locks.clone();
    locks.sort();
    assert_eq!(locks, vec!["L1", "L2"]);
}

#[test]
fn consistent_ordering_is_clean() {
    let report = monitor(
        |d| {
            let l1 = Arc::new(d.mutex("L1", 0u32));
            let l2 = Arc::new(d.mutex("L2", 0u32));
            for name in ["A", "B"] {
                let (l1, l2) = (l1.clone(), l2.clone());
                named(name, move || {
                    let mut x = l1.lock();
                    let mut y = l2.lock();
                    *x += 1;
                    *y += 1;
                })
                .join()
                .unwrap();
            }
            assert_eq!(*l1.lock(), 2);
        },
        Duration::from_secs(5),
    );

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.hazards.is_empty());
    assert!(report.is_clean());
    assert!(report.events.len() >= 12);
}

#[test]
fn inversion_without_overlap_is_still_reported() {
    let report = monitor(
        |d| {
            let l1 = Arc::new(d.mutex("L1", ()));
            let l2 = Arc::new(d.mutex("L2", ()));
            {
                let (l1, l2) = (l1.clone(), l2.clone());
                named("A", move || {
                    let _x = l1.lock();
                    let _y = l2.lock();
                })
                .join()
                .unwrap();
            }
            named("B", move || {
                let _y = l2.lock();
                let _x = l1.lock();
            })
            .join()
            .unwrap();
        },
        Duration::from_secs(5),
    );

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.deadlocked);
    assert!(!report.is_clean());
    let inversions: Vec<_> = report.hazards_of(HazardKind::OrderingInversion).collect();
    assert_eq!(inversions.len(), 1);
    assert_eq!(inversions[0].threads, vec!["B", "A"]);
    assert!(inversions[0].message.contains("reverse order"));
    assert_eq!(report.hazards_of(HazardKind::CircularWait).count(), 0);
}

#[test]
fn panic_keeps_recorded_hazards() {
    let report = DetectorConfig::default().monitor(|d| {
        let l1 = Arc::new(d.mutex("L1", ()));
        let l2 = Arc::new(d.mutex("L2", ()));
        {
            let _x = l1.lock();
            let _y = l2.lock();
        }
        {
            let (l1, l2) = (l1.clone(), l2.clone());
            let _ = named("worker", move || {
                let _y = l2.lock();
                let _x = l1.lock();
            })
            .join();
        }
        panic!("boom after locking");
    });

    assert_eq!(
        report.status,
        RunStatus::Panicked {
            message: "boom after locking".to_string()
        }
    );
    assert_eq!(report.hazards.len(), 1);
    assert!(!report.is_clean());
}

#[test]
fn report_serializes_with_status_tag() {
    let report = monitor(|_| {}, Duration::from_secs(1));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["deadlocked"], false);
    assert!(json["hazards"].as_array().unwrap().is_empty());
    assert!(report.to_string().starts_with("No deadlocks detected"));
}

#[cfg(unix)]
#[test]
fn external_program_hang_is_a_deadlock() {
    let cfg = DetectorConfig::default().with_timeout(Duration::from_millis(200));
    let hung = cfg
        .monitor_process("sh", &["-c".to_string(), "sleep 30".to_string()])
        .unwrap();
    assert_eq!(hung.status, RunStatus::TimedOut);
    assert!(hung.deadlocked);

    let ok = DetectorConfig::default()
        .monitor_process("sh", &["-c".to_string(), "echo done".to_string()])
        .unwrap();
    assert!(ok.is_clean());
    assert_eq!(ok.output.as_deref(), Some("done\n"));

    let failed = DetectorConfig::default()
        .monitor_process("sh", &["-c".to_string(), "exit 2".to_string()])
        .unwrap();
    assert_eq!(failed.status, RunStatus::Failed { exit_code: Some(2) });
    assert!(!failed.deadlocked);
}
