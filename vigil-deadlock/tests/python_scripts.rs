#![cfg(unix)]

use std::fs;
use std::process::Command;
use std::time::Duration;

use vigil_deadlock::{DetectorConfig, HazardKind, RunStatus};

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

const CROSSED: &str = r#"
import threading

l1 = threading.Lock()
l2 = threading.Lock()
both_hold_one = threading.Barrier(2)

def first():
    with l1:
        both_hold_one.wait()
        with l2:
            pass

def second():
    with l2:
        both_hold_one.wait()
        with l1:
            pass

a = threading.Thread(target=first, name="A")
b = threading.Thread(target=second, name="B")
a.start(); b.start()
a.join(); b.join()
"#;

const INVERTED: &str = r#"
import threading

l1 = threading.Lock()
l2 = threading.Lock()

def forward():
    with l1:
        with l2:
            pass

def backward():
    with l2:
        with l1:
            pass

for name, body in (("A", forward), ("B", backward)):
    t = threading.Thread(target=body, name=name)
    t.start()
    t.join()
print("finished")
"#;

const ORDERED: &str = r#"
import threading

l1 = threading.Lock()
l2 = threading.RLock()
done = threading.Event()

def work():
    with l1:
        with l2:
            with l2:
                pass

for name in ("A", "B"):
    t = threading.Thread(target=work, name=name)
    t.start()
    t.join()
done.set()
done.wait()
"#;

#[test]
fn crossed_locks_in_a_script_are_a_circular_wait() {
    if !python_available() {
        return;
    }
    let cfg = DetectorConfig::default().with_timeout(Duration::from_secs(2));
    let report = cfg.monitor_python_source(CROSSED).unwrap();

    assert_eq!(report.status, RunStatus::TimedOut);
    assert!(report.deadlocked);
    let cycles: Vec<_> = report.hazards_of(HazardKind::CircularWait).collect();
    assert_eq!(cycles.len(), 1);
    let mut threads = cycles[0].threads.clone();
    threads.sort();
    assert_eq!(threads, vec!["A", "B"]);
    let mut locks = cycles[0].locks.clone();
    locks.sort();
    assert_eq!(locks, vec!["Lock#1", "Lock#2"]);
}

#[test]
fn reversed_order_in_a_script_is_an_inversion() {
    if !python_available() {
        return;
    }
    let report = DetectorConfig::default().monitor_python_source(INVERTED).unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.deadlocked);
    assert!(!report.is_clean());
    let inversions: Vec<_> = report.hazards_of(HazardKind::OrderingInversion).collect();
    assert_eq!(inversions.len(), 1);
    assert_eq!(inversions[0].threads, vec!["B", "A"]);
    assert_eq!(inversions[0].locks, vec!["Lock#2", "Lock#1"]);
    let output = report.output.as_deref().unwrap();
    assert!(output.contains("finished"));
    assert!(!output.contains(vigil_deadlock::HAZARD_MARKER));
}

#[test]
fn consistent_order_in_a_script_is_clean() {
    if !python_available() {
        return;
    }
    let report = DetectorConfig::default().monitor_python_source(ORDERED).unwrap();
    assert!(report.is_clean(), "{report}");
}

#[test]
fn script_arguments_and_failures_are_passed_through() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("args.py");
    fs::write(&script, "import sys\nprint(sys.argv[1:])\nsys.exit(3)\n").unwrap();

    let report = DetectorConfig::default()
        .monitor_python(&script, &["-x".to_string(), "7".to_string()])
        .unwrap();
    assert_eq!(report.status, RunStatus::Failed { exit_code: Some(3) });
    assert!(report.output.as_deref().unwrap().contains("['-x', '7']"));
}
