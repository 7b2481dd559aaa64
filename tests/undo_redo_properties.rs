// Property test for the pattern store history
// Random edit sequences must undo and redo back through exactly the snapshots they produced

use beatgrid::sequencer::pattern::PatternLength;
use beatgrid::sequencer::step::Step;
use beatgrid::store::{PatternBank, PatternStore};
use beatgrid::sequencer::Pattern;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CHANNELS: [&str; 3] = ["p1/ch0", "p1/ch1", "p1/ch2"];

fn store() -> PatternStore {
    PatternStore::new(PatternBank::new(vec![Pattern::with_default_kit(
        "p1".to_string(),
        "Pattern 1",
    )]))
}

/// One random edit; returns whether the store reports a change
fn random_edit(store: &mut PatternStore, rng: &mut StdRng) -> bool {
    let channel = CHANNELS[rng.gen_range(0..CHANNELS.len())];
    match rng.gen_range(0..6) {
        0 | 1 => store.toggle_step("p1", channel, rng.gen_range(0..16)),
        2 => store.set_step("p1", channel, rng.gen_range(0..16), Step::new(rng.gen_range(0..5))),
        3 => {
            let lengths = [
                PatternLength::Steps16,
                PatternLength::Steps32,
                PatternLength::Steps64,
            ];
            store.set_pattern_length("p1", lengths[rng.gen_range(0..lengths.len())])
        }
        4 => store.rename_pattern("p1", format!("Pattern {}", rng.gen_range(0..4))),
        _ => store.clear_channel("p1", channel),
    }
}

#[test]
fn test_random_edits_undo_and_redo_exactly() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut store = store();
        let mut snapshots = vec![store.bank().clone()];

        for _ in 0..60 {
            let before = store.bank().clone();
            let changed = random_edit(&mut store, &mut rng);
            // A reported change always differs from the previous snapshot, and vice versa
            assert_eq!(changed, *store.bank() != before, "seed {seed}");
            if changed {
                snapshots.push(store.bank().clone());
            }
        }

        for expected in snapshots.iter().rev().skip(1) {
            assert!(store.undo(), "seed {seed}");
            assert_eq!(store.bank(), expected, "seed {seed}");
        }
        assert!(!store.undo());
        assert!(!store.can_undo());

        for expected in snapshots.iter().skip(1) {
            assert!(store.redo(), "seed {seed}");
            assert_eq!(store.bank(), expected, "seed {seed}");
        }
        assert!(!store.can_redo());
    }
}

#[test]
fn test_new_edit_after_undo_discards_redo() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut store = store();
    let mut edits = 0;
    while edits < 5 {
        if random_edit(&mut store, &mut rng) {
            edits += 1;
        }
    }
    assert!(store.undo());
    assert!(store.undo());
    assert!(store.can_redo());

    assert!(store.toggle_step("p1", "p1/ch0", 3));
    assert!(!store.can_redo());
    assert!(!store.redo());
}

#[test]
fn test_history_limit_drops_oldest() {
    let mut store = PatternStore::with_history_limit(
        PatternBank::new(vec![Pattern::with_default_kit("p1".to_string(), "Pattern 1")]),
        4,
    );
    for step in 0..10 {
        assert!(store.toggle_step("p1", "p1/ch0", step));
    }
    let mut undone = 0;
    while store.undo() {
        undone += 1;
    }
    assert_eq!(undone, 4);
    // The six oldest toggles can no longer be undone
    let steps = &store.bank().get("p1").unwrap().channels[0].steps;
    assert_eq!(steps.iter().filter(|s| s.is_active()).count(), 6);
}
