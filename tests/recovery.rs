use std::path::PathBuf;
use std::time::Duration;

use ulid::Ulid;

use bedq::config::Config;
use bedq::engine::Issue;
use bedq::model::*;
use bedq::runtime::Runtime;
use bedq::wal::Wal;

// ── Test infrastructure ──────────────────────────────────────

fn test_config() -> Config {
    let dir = std::env::temp_dir().join(format!("bedq_int_test_{}", Ulid::new()));
    Config {
        data_dir: dir,
        compact_threshold: 1_000_000,
        compact_interval: Duration::from_secs(3600),
        metrics_port: None,
        seed_path: None,
    }
}

fn write_seed(config: &Config, json: &str) -> PathBuf {
    std::fs::create_dir_all(&config.data_dir).unwrap();
    let path = config.data_dir.join("seed.json");
    std::fs::write(&path, json).unwrap();
    path
}

async fn add_bed(rt: &Runtime, id: &str, ward: &str) -> SupplyOutcome {
    let out = rt
        .engine
        .on_bed_available(Bed::new(id, ward, "General"))
        .await
        .unwrap();
    rt.commit(&out.events).await.unwrap();
    out
}

async fn admit(rt: &Runtime, id: &str) -> AdmissionOutcome {
    let out = rt
        .engine
        .request_admission(Patient::new(id).with_name(id), &BedFilter::any())
        .await
        .unwrap();
    rt.commit(&out.events).await.unwrap();
    out
}

async fn release(rt: &Runtime, bed_id: &str) -> SupplyOutcome {
    let out = rt.engine.on_bed_released(bed_id).await.unwrap();
    rt.commit(&out.events).await.unwrap();
    out
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn reopen_restores_committed_state() {
    let config = test_config();
    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.report.is_clean());

    add_bed(&rt, "A", "1").await;
    add_bed(&rt, "B", "2").await;
    for id in ["P1", "P2", "P3", "P4"] {
        admit(&rt, id).await;
    }
    release(&rt, "A").await; // P1 out, P3 in
    let withdrawn = rt.engine.discharge("P4").await.unwrap();
    rt.commit(&withdrawn.events).await.unwrap();

    let before = rt.engine.snapshot().await;
    rt.shutdown();

    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.report.is_clean(), "{:?}", rt.report.issues);
    assert_eq!(rt.engine.snapshot().await, before);
    assert_eq!(rt.engine.occupant("A").await.unwrap().patient_id, "P3");
    assert_eq!(rt.engine.occupant("B").await.unwrap().patient_id, "P2");
    assert!(rt.engine.get_patient("P1").await.is_none());
    assert!(rt.engine.get_patient("P4").await.is_none());
    rt.engine.check_invariants().await.unwrap();

    // Revisions keep climbing across restarts.
    let out = add_bed(&rt, "C", "1").await;
    assert!(out.events[0].revision() > before.revision);
}

#[tokio::test]
async fn waiting_order_survives_restart() {
    let config = test_config();
    let rt = Runtime::open(&config).await.unwrap();
    for id in ["P1", "P2", "P3"] {
        admit(&rt, id).await;
    }
    rt.shutdown();

    let rt = Runtime::open(&config).await.unwrap();
    let order: Vec<_> = rt
        .engine
        .waiting()
        .await
        .into_iter()
        .map(|p| p.patient_id)
        .collect();
    assert_eq!(order, ["P1", "P2", "P3"]);

    let out = add_bed(&rt, "A", "1").await;
    assert_eq!(out.allocated_patient.unwrap().patient_id, "P1");
}

#[tokio::test]
async fn seed_export_is_reconciled_and_checkpointed() {
    let mut config = test_config();
    let seed = write_seed(
        &config,
        r#"{
            "beds": [
                {"bedId": "A", "wardNumber": "1", "type": "ICU", "status": "OCCUPIED"},
                {"bedId": "B", "wardNumber": "1", "type": "ICU", "status": "FREE"}
            ],
            "patients": [
                {"patientId": "late", "status": "ADMITTED", "assignedBedId": "A", "requestedAt": 200},
                {"patientId": "early", "status": "ADMITTED", "assignedBedId": "A", "requestedAt": 100},
                {"patientId": "done", "status": "DISCHARGED", "assignedBedId": "B", "requestedAt": 50}
            ]
        }"#,
    );
    config.seed_path = Some(seed);

    let rt = Runtime::open(&config).await.unwrap();
    assert_eq!(
        rt.report.issues,
        [Issue::SharedBed {
            bed_id: "A".into(),
            kept: "early".into(),
            displaced: "late".into(),
        }]
    );
    // The displaced patient was re-queued, then seated in the free bed.
    assert_eq!(rt.engine.occupant("A").await.unwrap().patient_id, "early");
    assert_eq!(rt.engine.occupant("B").await.unwrap().patient_id, "late");
    assert_eq!(rt.engine.queue_len().await, 0);
    let before = rt.engine.snapshot().await;
    rt.shutdown();

    // The journal now holds the checkpoint; the seed is not read again.
    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.report.is_clean(), "{:?}", rt.report.issues);
    assert_eq!(rt.engine.snapshot().await, before);
}

#[tokio::test]
async fn withdrawn_seed_patient_stays_gone_after_restart() {
    let mut config = test_config();
    let seed = write_seed(
        &config,
        r#"{"beds": [], "patients": [{"patientId": "P-1", "status": "WAITING", "requestedAt": 100}]}"#,
    );
    config.seed_path = Some(seed);

    let rt = Runtime::open(&config).await.unwrap();
    assert_eq!(rt.engine.queue_len().await, 1);
    let out = rt.engine.discharge("P-1").await.unwrap();
    rt.commit(&out.events).await.unwrap();
    rt.shutdown();

    // The journal folds to an empty ward, but it exists; the seed stays unread.
    let rt = Runtime::open(&config).await.unwrap();
    assert_eq!(rt.engine.queue_len().await, 0);
    assert!(rt.engine.get_patient("P-1").await.is_none());
    assert_eq!(rt.engine.census().await, Census::default());
}

#[tokio::test]
async fn empty_seed_is_still_checkpointed() {
    let mut config = test_config();
    let seed = write_seed(&config, r#"{"beds": [], "patients": []}"#);
    config.seed_path = Some(seed.clone());

    let rt = Runtime::open(&config).await.unwrap();
    rt.shutdown();
    assert!(!Wal::replay(&config.journal_path()).unwrap().is_empty());

    // A seed that appears later is ignored: the journal already exists.
    std::fs::write(
        &seed,
        r#"{"beds": [{"bedId": "A", "wardNumber": "1", "type": "ICU", "status": "FREE"}], "patients": []}"#,
    )
    .unwrap();
    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.engine.list_beds().await.is_empty());
}

#[tokio::test]
async fn compaction_keeps_later_commits() {
    let config = test_config();
    let rt = Runtime::open(&config).await.unwrap();
    add_bed(&rt, "A", "1").await;
    for i in 0..10 {
        admit(&rt, &format!("P{i}")).await;
    }
    for _ in 0..5 {
        release(&rt, "A").await;
    }

    rt.compact().await.unwrap();
    let compacted = Wal::replay(&config.journal_path()).unwrap();
    // Bed A, its occupant, four waiting patients, checkpoint marker.
    assert_eq!(compacted.len(), 7);

    admit(&rt, "after").await;
    release(&rt, "A").await;
    let before = rt.engine.snapshot().await;
    rt.shutdown();

    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.report.is_clean(), "{:?}", rt.report.issues);
    assert_eq!(rt.engine.snapshot().await, before);
    assert_eq!(rt.engine.queue_position("after").await, Some(3));
}

#[tokio::test]
async fn uncommitted_decision_is_not_replayed() {
    let config = test_config();
    let rt = Runtime::open(&config).await.unwrap();
    add_bed(&rt, "A", "1").await;
    // Decided in memory but never written through.
    rt.engine
        .request_admission(Patient::new("lost"), &BedFilter::any())
        .await
        .unwrap();
    rt.shutdown();

    let rt = Runtime::open(&config).await.unwrap();
    assert!(rt.engine.get_patient("lost").await.is_none());
    assert_eq!(rt.engine.get_bed("A").await.unwrap().status, BedStatus::Free);
    rt.engine.check_invariants().await.unwrap();
}
