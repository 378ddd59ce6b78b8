//! Tests for the mutation processor.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::model::{ChampionshipId, ClassId, NewParticipant, Participant, ParticipantId};

const WORKER: &str = "test-worker";

fn key() -> ClassKey {
    ClassKey::new(ChampionshipId(1), ClassId(100))
}

fn enroll(store: &Store, key: ClassKey, name: &str, average: Decimal) -> Participant {
    store
        .registry()
        .enroll(&NewParticipant::new(key, name, average))
        .unwrap()
}

fn initial(key: ClassKey) -> Mutation {
    Mutation::Initial {
        championship: key.championship,
        class: Some(key.class),
    }
}

fn qualified_ranks(store: &Store, key: ClassKey) -> Vec<(String, u32)> {
    let registry = store.registry();
    let limit = registry.cut_limit(key).unwrap();
    registry
        .get_ordered(key)
        .unwrap()
        .into_iter()
        .map(|p| {
            let rank = p.qualified_rank(limit);
            (p.name, rank)
        })
        .collect()
}

/// Scenario A fixture: four participants, cut of two, positioned.
fn scenario_a(store: &Store, processor: &MutationProcessor) -> Vec<Participant> {
    store.registry().set_cut_limit(key(), 2).unwrap();
    let participants = vec![
        enroll(store, key(), "A", dec!(9.0)),
        enroll(store, key(), "B", dec!(8.0)),
        enroll(store, key(), "C", dec!(7.0)),
        enroll(store, key(), "D", dec!(6.0)),
    ];
    store.ledger().append(&initial(key()), "system").unwrap();
    processor.scan_once().unwrap();
    participants
}

fn ranks(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
    pairs.iter().map(|(n, r)| ((*n).to_string(), *r)).collect()
}

#[test]
fn test_scan_applies_and_advances_checkpoint() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    store.registry().set_cut_limit(key(), 2).unwrap();
    enroll(&store, key(), "B", dec!(8.0));
    enroll(&store, key(), "A", dec!(9.0));
    enroll(&store, key(), "C", dec!(7.0));
    let seq_id = store.ledger().append(&initial(key()), "system").unwrap();

    let report = processor.scan_once().unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.head, seq_id);
    assert_eq!(processor.checkpoint(), seq_id);
    assert_eq!(store.checkpoints().load_or_genesis(WORKER).unwrap(), seq_id);
    assert!(store.ledger().read_one(seq_id).unwrap().processed);
    assert_eq!(
        qualified_ranks(&store, key()),
        ranks(&[("A", 1), ("B", 2), ("C", 0)])
    );
}

#[test]
fn test_scenarios_through_the_ledger() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);
    assert_eq!(
        qualified_ranks(&store, key()),
        ranks(&[("A", 1), ("B", 2), ("C", 0), ("D", 0)])
    );

    store
        .ledger()
        .append(
            &Mutation::Withdrawn {
                participant: participants[0].id,
            },
            "secretary",
        )
        .unwrap();
    processor.scan_once().unwrap();
    assert_eq!(
        qualified_ranks(&store, key()),
        ranks(&[("A", 0), ("B", 1), ("C", 2), ("D", 0)])
    );

    store
        .ledger()
        .append(
            &Mutation::CutChanged {
                championship: key().championship,
                class: key().class,
                old_limit: 2,
                new_limit: 3,
            },
            "organiser",
        )
        .unwrap();
    processor.scan_once().unwrap();
    assert_eq!(store.registry().cut_limit(key()).unwrap(), 3);
    assert_eq!(
        qualified_ranks(&store, key()),
        ranks(&[("A", 0), ("B", 1), ("C", 2), ("D", 3)])
    );

    let a = store.registry().get(participants[0].id).unwrap();
    assert!(a.logbook.contains("Withdrawn at the request of secretary"));
    let c = store.registry().get(participants[2].id).unwrap();
    assert!(c.logbook.contains("Promoted from the waiting list"));
}

#[test]
fn test_processed_record_is_skipped() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);

    let seq_id = store
        .ledger()
        .append(
            &Mutation::Withdrawn {
                participant: participants[0].id,
            },
            "secretary",
        )
        .unwrap();
    store.ledger().mark_processed(seq_id).unwrap();

    let report = processor.scan_once().unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, 0);
    assert!(!store.registry().get(participants[0].id).unwrap().withdrawn);
}

#[test]
fn test_reapplying_is_a_no_op() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);
    let seq_id = store
        .ledger()
        .append(
            &Mutation::Withdrawn {
                participant: participants[0].id,
            },
            "secretary",
        )
        .unwrap();

    assert_eq!(processor.apply(seq_id).unwrap(), ApplyStatus::Applied { issues: 0 });
    let before = store.registry().get_ordered(key()).unwrap();
    assert_eq!(processor.apply(seq_id).unwrap(), ApplyStatus::AlreadyProcessed);
    assert_eq!(store.registry().get_ordered(key()).unwrap(), before);
}

#[test]
fn test_missing_participant_is_marked_processed() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let seq_id = store
        .ledger()
        .append(
            &Mutation::Registered {
                participant: ParticipantId(404),
            },
            "secretary",
        )
        .unwrap();

    let report = processor.scan_once().unwrap();

    assert_eq!(report.missing, 1);
    assert_eq!(processor.checkpoint(), seq_id);
    assert!(store.ledger().read_one(seq_id).unwrap().processed);
}

#[test]
fn test_missing_class_is_marked_processed() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let seq_id = store.ledger().append(&initial(key()), "system").unwrap();

    assert_eq!(processor.apply(seq_id).unwrap(), ApplyStatus::TargetMissing);
    assert!(store.ledger().read_one(seq_id).unwrap().processed);
}

#[test]
fn test_initial_without_class_positions_every_class() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let other = ClassKey::new(ChampionshipId(1), ClassId(200));
    store.registry().set_cut_limit(key(), 1).unwrap();
    store.registry().set_cut_limit(other, 1).unwrap();
    enroll(&store, key(), "A", dec!(5.0));
    enroll(&store, key(), "B", dec!(6.0));
    enroll(&store, other, "C", dec!(4.0));
    enroll(&store, other, "D", dec!(8.0));

    store
        .ledger()
        .append(
            &Mutation::Initial {
                championship: ChampionshipId(1),
                class: None,
            },
            "system",
        )
        .unwrap();
    processor.scan_once().unwrap();

    assert_eq!(qualified_ranks(&store, key()), ranks(&[("B", 1), ("A", 0)]));
    assert_eq!(qualified_ranks(&store, other), ranks(&[("D", 1), ("C", 0)]));
}

#[test]
fn test_consistency_issue_is_flagged_and_applied() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    store.registry().set_cut_limit(key(), 1).unwrap();
    for (name, avg) in [("A", dec!(9.0)), ("B", dec!(8.0))] {
        store
            .registry()
            .enroll(&NewParticipant::new(key(), name, avg).with_champion_label("Champion"))
            .unwrap();
    }
    let seq_id = store.ledger().append(&initial(key()), "system").unwrap();

    let report = processor.scan_once().unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.issues, 1);
    let flags = store.reconciliation().list().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].seq_id, seq_id);
    assert_eq!(flags[0].kind, "champions_exceed_limit");
    assert!(store.ledger().read_one(seq_id).unwrap().processed);
}

#[test]
fn test_checkpoint_survives_restart_and_reset_rescans() {
    let store = Store::in_memory().unwrap();
    store.checkpoints().save(WORKER, 5).unwrap();
    let seq_id = store.ledger().append(&initial(key()), "system").unwrap();
    assert!(seq_id < 5);

    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    assert_eq!(processor.checkpoint(), 5);
    assert_eq!(processor.scan_once().unwrap().examined(), 0);
    assert!(!store.ledger().read_one(seq_id).unwrap().processed);

    processor.reset_checkpoint().unwrap();
    assert_eq!(processor.scan_once().unwrap().examined(), 1);
    assert!(store.ledger().read_one(seq_id).unwrap().processed);

    let restarted = MutationProcessor::new(&store, WORKER).unwrap();
    assert_eq!(restarted.checkpoint(), seq_id);
}

#[test]
fn test_undecodable_payload_is_flagged_and_passed_over() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);
    let bad_seq_id = {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mutations (kind, payload, requested_by, processed, created_at_ns)
             VALUES ('withdrawn', 'not json', 'secretary', 0, 1)",
            [],
        )
        .unwrap();
        conn.last_insert_rowid() as u64
    };
    let valid_seq_id = store
        .ledger()
        .append(
            &Mutation::Withdrawn {
                participant: participants[0].id,
            },
            "secretary",
        )
        .unwrap();

    let report = processor.scan_once().unwrap();

    assert_eq!(report.undecodable, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(processor.checkpoint(), valid_seq_id);
    assert_eq!(store.ledger().pending_count().unwrap(), 0);
    assert!(store.registry().get(participants[0].id).unwrap().withdrawn);

    let flags = store.reconciliation().list().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].seq_id, bad_seq_id);
    assert_eq!(flags[0].class, None);
    assert_eq!(flags[0].kind, reconcile::UNDECODABLE_PAYLOAD);

    processor.reset_checkpoint().unwrap();
    let rescan = processor.scan_once().unwrap();
    assert_eq!(rescan.skipped, 3);
    assert_eq!(rescan.undecodable, 0);
    assert_eq!(store.reconciliation().list().unwrap().len(), 1);
}

#[test]
fn test_storage_error_aborts_pass_without_advancing() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    enroll(&store, key(), "A", dec!(9.0));
    let seq_id = store.ledger().append(&initial(key()), "system").unwrap();
    {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        conn.execute_batch("DROP TABLE worker_checkpoints").unwrap();
    }

    let err = processor.scan_once().unwrap_err();

    assert!(matches!(err, ProcessorError::Checkpoint(_)));
    assert!(!err.is_target_missing());
    assert_eq!(processor.checkpoint(), 0);
    assert!(store.ledger().read_one(seq_id).unwrap().processed);
}

#[test]
fn test_unchanged_cut_keeps_order() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    store.registry().set_cut_limit(key(), 2).unwrap();
    enroll(&store, key(), "A", dec!(9.0));
    enroll(&store, key(), "B", dec!(8.0));
    enroll(&store, key(), "C", dec!(7.0));
    let e = store
        .registry()
        .enroll(&NewParticipant::new(key(), "E", dec!(9.5)).with_withdrawn(true))
        .unwrap();
    let ledger = store.ledger();
    ledger.append(&initial(key()), "system").unwrap();
    ledger
        .append(&Mutation::Registered { participant: e.id }, "secretary")
        .unwrap();
    processor.scan_once().unwrap();

    let registered = ranks(&[("A", 1), ("B", 2), ("E", 0), ("C", 0)]);
    assert_eq!(qualified_ranks(&store, key()), registered);
    let before = store.registry().get_ordered(key()).unwrap();

    let seq_id = ledger
        .append(
            &Mutation::CutChanged {
                championship: key().championship,
                class: key().class,
                old_limit: 2,
                new_limit: 2,
            },
            "organiser",
        )
        .unwrap();
    let report = processor.scan_once().unwrap();

    assert_eq!(report.applied, 1);
    assert!(ledger.read_one(seq_id).unwrap().processed);
    assert_eq!(qualified_ranks(&store, key()), registered);
    assert_eq!(store.registry().get_ordered(key()).unwrap(), before);
    assert_eq!(store.registry().cut_limit(key()).unwrap(), 2);
}

#[test]
fn test_head_is_fixed_at_scan_start() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);
    let withdraw_b = Mutation::Withdrawn {
        participant: participants[1].id,
    };
    let first = store.ledger().append(&withdraw_b, "secretary").unwrap();

    let head = processor.ledger_head().unwrap();
    assert_eq!(head, first);
    let late = store
        .ledger()
        .append(
            &Mutation::Registered {
                participant: participants[2].id,
            },
            "secretary",
        )
        .unwrap();

    let report = processor.scan_to(head).unwrap();
    assert_eq!(report.head, first);
    assert_eq!(report.applied, 1);
    assert_eq!(processor.checkpoint(), first);
    assert!(!store.ledger().read_one(late).unwrap().processed);
    assert!(!store.registry().get(participants[2].id).unwrap().confirmed);

    let next = processor.scan_once().unwrap();
    assert_eq!(next.checkpoint, first);
    assert_eq!(next.applied, 1);
    assert!(store.ledger().read_one(late).unwrap().processed);
    assert!(store.registry().get(participants[2].id).unwrap().confirmed);
}

#[test]
fn test_later_mutations_wait_for_next_pass() {
    let store = Store::in_memory().unwrap();
    let processor = MutationProcessor::new(&store, WORKER).unwrap();
    let participants = scenario_a(&store, &processor);
    let first_head = processor.checkpoint();

    let seq_id = store
        .ledger()
        .append(
            &Mutation::Registered {
                participant: participants[1].id,
            },
            "secretary",
        )
        .unwrap();
    assert!(seq_id > first_head);

    let report = processor.scan_once().unwrap();
    assert_eq!(report.checkpoint, first_head);
    assert_eq!(report.applied, 1);
    assert!(store.registry().get(participants[1].id).unwrap().confirmed);
}
