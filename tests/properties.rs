//! Property tests for entity operations and batching

use pantry::entity::{select_all, select_ids, select_total, EntityAdapter, EntityState, Identifiable};
use pantry::{with_batching, ReadableStore, Store, StoreApi};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u8,
    rank: i8,
    label: String,
}

impl Identifiable for Item {
    type Id = u8;

    fn id(&self) -> u8 {
        self.id
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add(Item),
    Remove(u8),
}

fn item() -> impl Strategy<Value = Item> {
    (0u8..16, any::<i8>(), "[a-z]{0,4}").prop_map(|(id, rank, label)| Item { id, rank, label })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![item().prop_map(Op::Add), (0u8..16).prop_map(Op::Remove)]
}

proptest! {
    #[test]
    fn add_remove_sequences_track_live_ids(ops in prop::collection::vec(op(), 0..64)) {
        let adapter = EntityAdapter::<Item, u8>::new();
        let mut state = EntityState::new();
        let mut live = BTreeSet::new();

        for op in ops {
            match op {
                Op::Add(item) => {
                    live.insert(item.id);
                    adapter.add_one(&mut state, item);
                }
                Op::Remove(id) => {
                    live.remove(&id);
                    adapter.remove_ids(&mut state, [id]);
                }
            }
        }

        let ids = select_ids(&state);
        let unique: BTreeSet<u8> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert_eq!(unique, live);
        prop_assert_eq!(select_all(&state).len(), select_total(&state));
    }

    #[test]
    fn upsert_matches_add_or_update(seed in prop::collection::vec(item(), 0..8), entity in item()) {
        let adapter = EntityAdapter::<Item, u8>::new();
        let mut upserted = EntityState::new();
        adapter.add_many(&mut upserted, seed);
        let mut expected = upserted.clone();

        let id = entity.id;
        if expected.contains(&id) {
            let patch = serde_json::to_value(&entity).unwrap();
            adapter.update_one(&mut expected, &id, patch);
        } else {
            adapter.add_one(&mut expected, entity.clone());
        }
        adapter.upsert_one(&mut upserted, entity);

        prop_assert_eq!(upserted, expected);
    }

    #[test]
    fn sorted_ids_follow_comparator(items in prop::collection::vec(item(), 0..32)) {
        let adapter = EntityAdapter::<Item, u8>::new().sorted_by(|a, b| a.rank.cmp(&b.rank));
        let mut state = EntityState::new();
        for item in items {
            adapter.set_one(&mut state, item);
        }

        let ranks: Vec<i8> = select_all(&state).iter().map(|item| item.rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        prop_assert_eq!(ranks, sorted);
    }

    #[test]
    fn partial_updates_never_drop_fields(label in "[a-z]{1,6}", rank in any::<i8>()) {
        let adapter = EntityAdapter::<Item, u8>::new();
        let mut state = EntityState::new();
        adapter.add_one(&mut state, Item { id: 1, rank: 0, label: "start".into() });

        adapter.update_one(&mut state, &1, json!({ "label": label.clone() }));
        adapter.update_one(&mut state, &1, json!({ "rank": rank }));

        let item = &state.entities()[&1u8];
        prop_assert_eq!(&item.label, &label);
        prop_assert_eq!(item.rank, rank);
    }

    #[test]
    fn batch_equals_sequential_writes(deltas in prop::collection::vec(-100i64..100, 1..16)) {
        let plain = Store::new(0i64);
        for delta in &deltas {
            let delta = *delta;
            plain.update(move |n| *n = *n * 2 + delta);
        }

        let batched = with_batching(Store::new(0i64));
        let notified = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let notified = notified.clone();
            batched.subscribe(move |_: &i64, _: &i64| {
                notified.fetch_add(1, Ordering::SeqCst);
            })
        };
        batched.batch(|| {
            for delta in &deltas {
                let delta = *delta;
                batched.update(move |n| *n = *n * 2 + delta);
            }
        });

        prop_assert_eq!(batched.get_state(), plain.get_state());
        let expected = usize::from(plain.get_state() != 0);
        prop_assert_eq!(notified.load(Ordering::SeqCst), expected);
    }
}
