//! Demonstration of a synced, batched task store shared by two tabs

use pantry::entity::{select_all, EntityActions, EntityAdapter, EntitySelectors, EntityState, Identifiable};
use pantry::middleware::sync::InitialSync;
use pantry::{
    batch, create_entity_store, derive, with_batching, with_sync, Batched, BroadcastHub,
    DerivedStore, ReadableStore, Store, SyncConfig, SyncContext, Synced,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Task {
    id: String,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    status: Option<String>,
}

impl Identifiable for Task {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

type Tasks = EntityState<Task, String>;
type TasksStore = Batched<Tasks, Synced<Tasks, Store<Tasks>>>;

/// One execution context: its own copy of the tasks store.
struct Tab {
    name: &'static str,
    store: TasksStore,
    actions: EntityActions<Task, String, TasksStore>,
    selectors: EntitySelectors<Task, String, TasksStore>,
}

impl Tab {
    fn open(name: &'static str, hub: &BroadcastHub, adapter: &EntityAdapter<Task, String>) -> Self {
        let context = SyncContext::new(hub);
        let config = SyncConfig::named("tasks").with_initial_sync(InitialSync::OnAttach);
        let store = with_batching(with_sync(create_entity_store(adapter), &context, config));
        Self {
            name,
            actions: adapter.actions(store.clone()),
            selectors: adapter.selectors(store.clone()),
            store,
        }
    }

    fn sync(&self) -> usize {
        self.store.inner().drain()
    }

    fn print(&self) {
        println!("   {}:", self.name);
        for task in self.selectors.select_all() {
            let mark = if task.completed { "✓" } else { " " };
            let status = task.status.as_deref().unwrap_or("-");
            println!("     [{}] {} ({})", mark, task.title, status);
        }
    }
}

fn task(id: &str, title: &str) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        completed: false,
        status: None,
    }
}

fn stats(store: &TasksStore) -> DerivedStore<(usize, usize)> {
    let store = store.clone();
    derive(move |get| {
        let state = get.get(&store);
        let tasks = select_all(&state);
        let completed = tasks.iter().filter(|task| task.completed).count();
        (tasks.len(), completed)
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Pantry Example: Todo App ===\n");

    let hub = BroadcastHub::new();
    let adapter = EntityAdapter::<Task, String>::new().sorted_by(|a, b| a.title.cmp(&b.title));

    println!("1. Opening the first tab");
    let first = Tab::open("first tab", &hub, &adapter);
    let first_stats = stats(&first.store);
    first_stats
        .subscribe(|_: &(usize, usize), _: &(usize, usize)| {
            println!("   [Stats invalidated]");
        })
        .detach();

    println!("\n2. Adding tasks in one batch");
    first.store.batch(|| {
        first.actions.add_one(task("t1", "Learn Rust"));
        first.actions.add_one(task("t2", "Build a store"));
        first.actions.add_one(task("t3", "Write documentation"));
    });
    first.print();

    println!("\n3. Opening a second tab; it asks for the current state");
    let second = Tab::open("second tab", &hub, &adapter);
    first.sync();
    second.sync();
    second.print();

    println!("\n4. Completing a task in the second tab");
    second
        .actions
        .update_one("t1".into(), json!({ "completed": true, "status": "done" }));
    println!("   first tab applied {} update(s)", first.sync());
    first.print();

    println!("\n5. Moving a task between lists in one coordinated batch");
    let archive = with_batching(create_entity_store(&adapter));
    let archive_actions = adapter.actions(archive.clone());
    batch(|_| {
        if let Some(done) = first.selectors.select_by_id(&"t1".to_string()) {
            first.actions.remove_one(&done);
            archive_actions.add_one(done);
        }
    });
    second.sync();
    second.print();
    println!("   archive holds {} task(s)", archive.get_state().len());

    println!("\n6. Final statistics:");
    let (total, completed) = first_stats.get_state();
    println!("   Total: {}", total);
    println!("   Completed: {}", completed);

    println!("\n✓ Example complete!");
}
