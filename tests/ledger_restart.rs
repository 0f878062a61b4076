use std::fs;
use tempfile::tempdir;
use usdz_converter::infrastructure::ledger::processed::ProcessedLedger;

#[test]
fn entries_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("processed.txt");

    {
        let mut ledger = ProcessedLedger::load(&path).unwrap();
        ledger.record("staging/floor-plan/demo.usdz").unwrap();
        ledger.record("staging/floor-plan/kitchen.usdz").unwrap();
    }

    let mut reloaded = ProcessedLedger::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.contains("staging/floor-plan/demo.usdz"));
    assert!(reloaded.contains("staging/floor-plan/kitchen.usdz"));

    reloaded.record("staging/floor-plan/bath.usdz").unwrap();

    let third = ProcessedLedger::load(&path).unwrap();
    assert_eq!(third.len(), 3);
}

#[test]
fn log_written_by_an_older_process_is_honoured() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("processed.txt");
    // Two processes appended the same key before either restarted.
    fs::write(&path, "models/a.usdz\nmodels/a.usdz\nmodels/b.usdz\n").unwrap();

    let ledger = ProcessedLedger::load(&path).unwrap();

    assert_eq!(ledger.len(), 2);
    assert!(ledger.contains("models/a.usdz"));
    assert!(!ledger.contains("models/c.usdz"));
}
