//! Tests for the participant registry.

use rust_decimal_macros::dec;

use super::*;
use crate::model::DEFAULT_CUT_LIMIT;
use crate::store::Store;

fn key() -> ClassKey {
    ClassKey::new(ChampionshipId(1), ClassId(10))
}

fn enroll_all(registry: &Registry, entries: &[(&str, rust_decimal::Decimal)]) -> Vec<Participant> {
    entries
        .iter()
        .map(|(name, avg)| registry.enroll(&NewParticipant::new(key(), *name, *avg)).unwrap())
        .collect()
}

#[test]
fn test_enroll_appends_to_class_order() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();

    let enrolled = enroll_all(&registry, &[("A", dec!(8.0)), ("B", dec!(9.5))]);
    assert_eq!(enrolled[0].total_order, 1);
    assert_eq!(enrolled[1].total_order, 2);
    assert_eq!(enrolled[1].visible_rank, 2);
    assert_eq!(enrolled[1].average, dec!(9.5));

    let withdrawn = registry
        .enroll(&NewParticipant::new(key(), "C", dec!(7.0)).with_withdrawn(true))
        .unwrap();
    assert_eq!(withdrawn.total_order, 3);
    assert_eq!(withdrawn.visible_rank, 0);
}

#[test]
fn test_enroll_keeps_classes_separate() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();
    let other = ClassKey::new(ChampionshipId(1), ClassId(11));

    enroll_all(&registry, &[("A", dec!(8.0))]);
    let p = registry
        .enroll(&NewParticipant::new(other, "B", dec!(7.0)))
        .unwrap();

    assert_eq!(p.total_order, 1);
    assert_eq!(registry.classes(ChampionshipId(1)).unwrap(), vec![ClassId(10), ClassId(11)]);
}

#[test]
fn test_get_missing_participant_is_not_found() {
    let store = Store::in_memory().unwrap();
    let err = store.registry().get(ParticipantId(42)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_average_precision_survives_storage() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();

    let p = registry
        .enroll(&NewParticipant::new(key(), "A", dec!(9.123)))
        .unwrap();
    assert_eq!(registry.get(p.id).unwrap().average, dec!(9.123));
}

#[test]
fn test_get_ordered_follows_total_order() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();
    let enrolled = enroll_all(&registry, &[("A", dec!(8.0)), ("B", dec!(9.0)), ("C", dec!(7.0))]);

    registry.set_order(enrolled[0].id, 3).unwrap();
    registry.set_order(enrolled[2].id, 1).unwrap();

    let names: Vec<_> = registry
        .get_ordered(key())
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["C", "B", "A"]);
}

#[test]
fn test_get_champions_includes_withdrawn() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();

    enroll_all(&registry, &[("A", dec!(8.0))]);
    registry
        .enroll(&NewParticipant::new(key(), "B", dec!(7.0)).with_champion_label("Champion 2025"))
        .unwrap();
    registry
        .enroll(
            &NewParticipant::new(key(), "C", dec!(6.0))
                .with_champion_label("Champion 2024")
                .with_withdrawn(true),
        )
        .unwrap();

    let champions: Vec<_> = registry
        .get_champions(key())
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(champions, vec!["B", "C"]);
}

#[test]
fn test_set_rank_and_order_report_missing() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();

    assert!(registry.set_rank(ParticipantId(5), 1).unwrap_err().is_not_found());
    assert!(registry.set_order(ParticipantId(5), 1).unwrap_err().is_not_found());
}

#[test]
fn test_shift_order_moves_tail() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();
    enroll_all(&registry, &[("A", dec!(9.0)), ("B", dec!(8.0)), ("C", dec!(7.0))]);

    assert_eq!(registry.shift_order(key(), 2, 1).unwrap(), 2);
    let orders: Vec<_> = registry
        .get_ordered(key())
        .unwrap()
        .into_iter()
        .map(|p| p.total_order)
        .collect();
    assert_eq!(orders, vec![1, 3, 4]);

    assert_eq!(registry.shift_order(key(), 3, -1).unwrap(), 2);
    let orders: Vec<_> = registry
        .get_ordered(key())
        .unwrap()
        .into_iter()
        .map(|p| p.total_order)
        .collect();
    assert_eq!(orders, vec![1, 2, 3]);
}

#[test]
fn test_cut_limit_defaults_and_default_removes_row() {
    let store = Store::in_memory().unwrap();
    let registry = store.registry();

    assert_eq!(registry.cut_limit(key()).unwrap(), DEFAULT_CUT_LIMIT);
    assert!(!registry.class_exists(key()).unwrap());

    registry.set_cut_limit(key(), 8).unwrap();
    assert_eq!(registry.cut_limit(key()).unwrap(), 8);
    assert!(registry.class_exists(key()).unwrap());

    registry.set_cut_limit(key(), DEFAULT_CUT_LIMIT).unwrap();
    assert_eq!(registry.cut_limit(key()).unwrap(), DEFAULT_CUT_LIMIT);
    assert!(!registry.class_exists(key()).unwrap());
}

#[test]
fn test_zero_cut_limit_rejected() {
    let store = Store::in_memory().unwrap();
    let err = store.registry().set_cut_limit(key(), 0).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidCutLimit { limit: 0 }));
}
