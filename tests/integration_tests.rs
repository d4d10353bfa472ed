//! Integration tests for Pantry

use pantry::entity::{create_entity_store, EntityAdapter, Identifiable, Update};
use pantry::{
    batch, batch_async, derive, with_batching, with_sync, BroadcastHub, EntityState, ReadableStore, Store,
    StoreApi, SyncConfig, SyncContext,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    id: String,
    title: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    props: serde_json::Map<String, serde_json::Value>,
}

impl Identifiable for Task {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

fn task(id: &str, title: &str) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        done: false,
        props: Default::default(),
    }
}

type Tasks = EntityState<Task, String>;

fn counter(store: &impl ReadableStore<Tasks>) -> (Arc<AtomicUsize>, pantry::Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let counted = count.clone();
    let sub = store.subscribe(move |_: &Tasks, _: &Tasks| {
        counted.fetch_add(1, Ordering::SeqCst);
    });
    (count, sub)
}

#[test]
fn task_lifecycle() {
    let adapter = EntityAdapter::<Task, String>::new();
    let store = create_entity_store(&adapter);
    let actions = adapter.actions(store.clone());
    let selectors = adapter.selectors(store);

    actions.add_one(task("t1", "buy milk"));
    actions.update_one("t1".into(), json!({"title": "buy oat milk"}));
    assert_eq!(
        selectors.select_by_id(&"t1".into()).map(|t| t.title),
        Some("buy oat milk".to_string())
    );

    actions.remove_one(&task("t1", "anything"));
    assert!(selectors.select_all().is_empty());
    assert_eq!(selectors.select_total(), 0);
}

#[test]
fn partial_updates_keep_absent_fields() {
    let adapter = EntityAdapter::<Task, String>::new();
    let store = create_entity_store(&adapter);
    let actions = adapter.actions(store.clone());

    actions.add_one(task("t1", "pack"));
    actions.update_one("t1".into(), json!({"props": {"a": 1}}));
    actions.update_many(vec![
        Update::new("t1".to_string(), json!({"props": {"b": 2}})),
        Update::new("missing".to_string(), json!({"title": "ignored"})),
    ]);

    let state = store.get_state();
    let t1 = &state.entities()["t1"];
    assert_eq!(serde_json::Value::Object(t1.props.clone()), json!({"a": 1, "b": 2}));
    assert_eq!(t1.title, "pack");
    assert_eq!(state.len(), 1);
}

#[test]
fn sorted_store_orders_ids() {
    let adapter = EntityAdapter::<Task, String>::new().sorted_by(|a, b| a.title.cmp(&b.title));
    let store = create_entity_store(&adapter);
    let actions = adapter.actions(store.clone());
    let selectors = adapter.selectors(store);

    actions.add_many(vec![task("1", "walk"), task("2", "cook"), task("3", "read")]);
    assert_eq!(selectors.select_ids(), vec!["2", "3", "1"]);

    actions.update_one("2".into(), json!({"title": "zzz"}));
    assert_eq!(selectors.select_ids(), vec!["3", "1", "2"]);
}

#[test]
fn batched_entity_store_notifies_once() {
    let adapter = EntityAdapter::<Task, String>::new();
    let store = with_batching(create_entity_store(&adapter));
    let actions = adapter.actions(store.clone());
    let (count, _sub) = counter(&store);

    store.batch(|| {
        actions.add_one(task("a", "first"));
        actions.add_one(task("b", "second"));
        actions.update_one_with("a".into(), |t| t.done = true);
        actions.remove_ids(vec!["b".into()]);
    });

    assert_eq!(count.load(Ordering::SeqCst), 1);
    let state = store.get_state();
    assert_eq!(state.ids(), &["a".to_string()]);
    assert!(state.entities()["a"].done);
}

#[test]
fn global_batch_spans_stores() {
    let tasks_adapter = EntityAdapter::<Task, String>::new();
    let tasks = with_batching(create_entity_store(&tasks_adapter));
    let archive = with_batching(create_entity_store(&tasks_adapter));
    let tasks_actions = tasks_adapter.actions(tasks.clone());
    let archive_actions = tasks_adapter.actions(archive.clone());
    let (tasks_count, _a) = counter(&tasks);
    let (archive_count, _b) = counter(&archive);

    tasks_actions.add_many(vec![task("1", "one"), task("2", "two")]);
    tasks_count.store(0, Ordering::SeqCst);

    batch(|_| {
        let done = tasks.working_state().entities()["1"].clone();
        tasks_actions.remove_one(&done);
        archive_actions.add_one(done);
        assert_eq!(tasks.get_state().len(), 2);
        assert_eq!(archive.get_state().len(), 0);
    });

    assert_eq!(tasks_count.load(Ordering::SeqCst), 1);
    assert_eq!(archive_count.load(Ordering::SeqCst), 1);
    assert_eq!(tasks.get_state().ids(), &["2".to_string()]);
    assert_eq!(archive.get_state().ids(), &["1".to_string()]);
}

#[test]
fn sync_over_batching_reaches_peer() {
    let hub = BroadcastHub::new();
    let adapter = EntityAdapter::<Task, String>::new();

    let here = with_sync(
        with_batching(create_entity_store(&adapter)),
        &SyncContext::new(&hub),
        SyncConfig::new(),
    );
    let there = with_sync(
        with_batching(create_entity_store(&adapter)),
        &SyncContext::new(&hub),
        SyncConfig::new(),
    );

    let actions = adapter.actions(here.clone());
    here.inner().batch(|| {
        actions.add_one(task("1", "one"));
        actions.add_one(task("2", "two"));
    });

    there.drain();
    assert_eq!(there.get_state(), here.get_state());
    assert_eq!(there.get_state().len(), 2);
}

#[test]
fn batching_over_sync_broadcasts_once_per_scope() {
    let hub = BroadcastHub::new();
    let adapter = EntityAdapter::<Task, String>::new();

    let here = with_batching(with_sync(
        create_entity_store(&adapter),
        &SyncContext::new(&hub),
        SyncConfig::named("tasks"),
    ));
    let there = with_sync(
        create_entity_store(&adapter),
        &SyncContext::new(&hub),
        SyncConfig::named("tasks"),
    );
    let (count, _sub) = counter(&there);

    let actions = adapter.actions(here.clone());
    here.batch(|| {
        actions.add_one(task("1", "one"));
        actions.add_one(task("2", "two"));
        actions.update_one("1".into(), json!({"done": true}));
    });

    assert_eq!(there.drain(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(there.get_state(), here.get_state());
}

#[test]
fn derived_store_over_entity_store() {
    let adapter = EntityAdapter::<Task, String>::new();
    let store = with_batching(create_entity_store(&adapter));
    let actions = adapter.actions(store.clone());
    let runs = Arc::new(AtomicUsize::new(0));

    let open = {
        let store = store.clone();
        let runs = runs.clone();
        derive(move |get| {
            runs.fetch_add(1, Ordering::SeqCst);
            let state = get.get(&store);
            pantry::entity::select_all(&state)
                .into_iter()
                .filter(|t| !t.done)
                .count()
        })
    };

    let heard = Arc::new(AtomicUsize::new(0));
    let _sub = {
        let heard = heard.clone();
        open.subscribe(move |_: &usize, _: &usize| {
            heard.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert_eq!(open.get_state(), 0);

    store.batch(|| {
        actions.add_one(task("1", "one"));
        actions.add_one(task("2", "two"));
    });
    assert_eq!(heard.load(Ordering::SeqCst), 1);
    assert_eq!(open.get_state(), 2);

    actions.update_one_with("1".into(), |t| t.done = true);
    assert_eq!(open.get_state(), 1);
    assert_eq!(open.get_state(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn store_subscription() {
    let store = Store::new(0);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sub = {
        let seen = seen.clone();
        store.subscribe(move |next: &i32, previous: &i32| seen.lock().push((*next, *previous)))
    };

    store.set(1);
    store.update(|n| *n += 1);
    sub.unsubscribe();
    store.set(3);

    assert_eq!(*seen.lock(), vec![(1, 0), (2, 1)]);
}

#[tokio::test]
async fn async_batch_spans_awaits_across_stores() {
    let todo = with_batching(Store::new(0));
    let done = with_batching(Store::new(0));
    let todo_notified = Arc::new(AtomicUsize::new(0));
    let done_notified = Arc::new(AtomicUsize::new(0));
    let _subs = [
        todo.subscribe({
            let n = todo_notified.clone();
            move |_: &i32, _: &i32| {
                n.fetch_add(1, Ordering::SeqCst);
            }
        }),
        done.subscribe({
            let n = done_notified.clone();
            move |_: &i32, _: &i32| {
                n.fetch_add(1, Ordering::SeqCst);
            }
        }),
    ];

    batch_async(|ctx| {
        let (todo, done) = (todo.clone(), done.clone());
        async move {
            todo.set(3);
            tokio::task::yield_now().await;
            todo.update(|n| *n -= 1);
            done.update(|n| *n += 1);
            tokio::task::yield_now().await;
            assert_eq!(ctx.registered(), 2);
            assert_eq!((todo.get_state(), done.get_state()), (0, 0));
        }
    })
    .await;

    assert_eq!((todo.get_state(), done.get_state()), (2, 1));
    assert_eq!(todo_notified.load(Ordering::SeqCst), 1);
    assert_eq!(done_notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_async_batch_still_flushes() {
    let store = with_batching(Store::new(0));
    let notified = Arc::new(AtomicUsize::new(0));
    let _sub = {
        let n = notified.clone();
        store.subscribe(move |_: &i32, _: &i32| {
            n.fetch_add(1, Ordering::SeqCst);
        })
    };

    let scope = batch_async(|_| {
        let store = store.clone();
        async move {
            store.set(5);
            std::future::pending::<()>().await;
        }
    });
    let result = tokio::time::timeout(Duration::from_millis(20), scope).await;

    assert!(result.is_err());
    assert_eq!(store.get_state(), 5);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}
