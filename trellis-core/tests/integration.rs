//! Integration Tests
//!
//! These tests drive the store, the renderer and the live document together
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use trellis_core::app::App;
use trellis_core::component::HtmlComponent;
use trellis_core::config::AppConfig;
use trellis_core::dom::{Event, NodeId};
use trellis_core::reactive::{Effect, Signal};
use trellis_core::store::{Computed, Store, StoreManager, StoreOptions};
use trellis_core::value::{Value, ValueMap};
use trellis_core::value_map;

fn app_with_store() -> (App, Store) {
    let app = App::new(AppConfig::default());
    let store = app.stores().create_store("default", StoreOptions::new()).unwrap();
    (app, store)
}

fn props(value: Value) -> ValueMap {
    match value {
        Value::Map(map) => map,
        _ => ValueMap::new(),
    }
}

/// A computed key follows its dependency and skips unchanged inputs.
#[test]
fn computed_double_is_memoized() {
    let stores = StoreManager::new();
    let store = stores.create_store("default", StoreOptions::new()).unwrap();
    store.set("count", 0);

    let computed = Computed::new("double", ["count"], |deps| {
        Value::from(deps["count"].as_i64().unwrap_or(0) * 2)
    });
    store.register_computed(computed);
    let evaluations = store.computed("double").unwrap().evaluation_count();

    store.set("count", 3);
    assert_eq!(store.get("double"), Value::from(6));
    let after_first = store.computed("double").unwrap().evaluation_count();
    assert_eq!(after_first, evaluations + 1);

    store.set("count", 3);
    assert_eq!(store.computed("double").unwrap().evaluation_count(), after_first);
}

/// Changing the store key a conditional reads only rewrites that block.
#[test]
fn conditional_point_update_keeps_siblings() {
    let (mut app, store) = app_with_store();
    store.set("count", 1);
    let template = "<root><h1>Title</h1>\n@if:store:app.default.count==\"1\"\nOne\n@else\nOther\n@endif\n<footer>f</footer></root>";
    let component = HtmlComponent::new("Cond", template, ValueMap::new()).unwrap().into_ref();
    app.mount(component.clone()).unwrap();

    let doc = app.document();
    let root = doc.find_by_attr(app.container(), "data-component-id", component.id()).unwrap();
    let heading = doc.children(root)[0];
    let div = doc
        .descendants(root)
        .into_iter()
        .find(|n| doc.attr(*n, "data-condition").is_some())
        .unwrap();
    assert_eq!(doc.text_content(div).trim(), "One");
    let created = doc.stats().created;

    store.set("count", 2);
    assert_eq!(app.flush(), 1);

    let doc = app.document();
    assert_eq!(doc.text_content(div).trim(), "Other");
    assert_eq!(doc.tag(heading), Some("h1"));
    assert_eq!(doc.text_content(heading), "Title");
    assert_eq!(doc.stats().created, created);
}

fn condition_div(app: &App, root: NodeId) -> NodeId {
    let doc = app.document();
    doc.descendants(root)
        .into_iter()
        .find(|n| doc.attr(*n, "data-condition").is_some())
        .unwrap()
}

/// A three-way `@if` chain reaches every branch through point updates.
#[test]
fn else_if_chain_point_updates() {
    let (mut app, store) = app_with_store();
    store.set("a", 1);
    store.set("b", 0);
    let template = "<root><h1>Title</h1>\n@if:store:app.default.a==\"1\"\nFirst\n@else-if:store:app.default.b==\"1\"\nSecond\n@else\nNeither\n@endif\n</root>";
    let component = HtmlComponent::new("Chain", template, ValueMap::new()).unwrap().into_ref();
    app.mount(component.clone()).unwrap();

    let root = app.document().find_by_attr(app.container(), "data-component-id", component.id()).unwrap();
    let heading = app.document().children(root)[0];
    let div = condition_div(&app, root);
    assert_eq!(app.document().text_content(div).trim(), "First");
    let renders = component.stats().render_count;

    store.set("a", 0);
    assert_eq!(app.flush(), 1);
    assert_eq!(app.document().text_content(div).trim(), "Neither");

    store.set("b", 1);
    assert_eq!(app.flush(), 1);
    assert_eq!(app.document().text_content(div).trim(), "Second");

    store.set("a", 1);
    assert_eq!(app.flush(), 1);
    assert_eq!(app.document().text_content(div).trim(), "First");

    assert_eq!(app.document().text_content(heading), "Title");
    assert_eq!(component.stats().render_count, renders);
}

/// Conditions on a component signal swap only their block.
#[test]
fn signal_condition_point_update() {
    let (mut app, _) = app_with_store();
    let mode = Signal::new(Value::from("view"));
    let template = "<root><h1>Doc</h1>\n@if:signal:mode==\"edit\"\n<textarea></textarea>\n@else\n<p>read only</p>\n@endif\n</root>";
    let component = HtmlComponent::new("Doc", template, ValueMap::new())
        .unwrap()
        .with_signal("mode", mode.clone())
        .into_ref();
    app.mount(component.clone()).unwrap();

    let root = app.document().find_by_attr(app.container(), "data-component-id", component.id()).unwrap();
    let div = condition_div(&app, root);
    assert_eq!(app.document().text_content(div).trim(), "read only");
    let renders = component.stats().render_count;

    mode.set(Value::from("edit"));
    assert_eq!(app.flush(), 1);
    assert!(app.html().contains("<textarea></textarea>"), "{}", app.html());
    assert_eq!(component.stats().render_count, renders);

    app.unmount();
    assert_eq!(mode.subscriber_count(), 0);
}

/// A parent fills its child's named slot; the default slot falls back.
#[test]
fn slots_render_inside_the_child() {
    let (mut app, store) = app_with_store();
    store.set("user", "Mario");
    let card = HtmlComponent::new(
        "Card",
        "<root><header>@slot:title Untitled @endslot</header><main>@slot<i>empty</i>@endslot</main></root>",
        ValueMap::new(),
    )
    .unwrap()
    .into_ref();
    let page = HtmlComponent::new(
        "Page",
        "<root>@include:card\n@slot:card.title<h1>@store:app.default.user</h1>@endslot\n</root>",
        ValueMap::new(),
    )
    .unwrap()
    .with_dependency("card", card)
    .into_ref();
    app.mount(page).unwrap();

    let html = app.html();
    assert!(
        html.contains(r#"<header><h1><span data-store="app.default.user">Mario</span></h1></header>"#),
        "{html}"
    );
    assert!(html.contains("<main><i>empty</i></main>"), "{html}");
    assert!(!html.contains("@slot"), "{html}");

    store.set("user", "Luigi");
    app.flush();
    assert!(app.html().contains(">Luigi</span></h1></header>"), "{}", app.html());
}

/// Two writers race on one key. The first writer's listeners are held up
/// until the second write has landed; the span still ends on the value the
/// store holds.
#[test]
fn racing_writers_settle_on_the_stored_value() {
    let (mut app, store) = app_with_store();
    store.set("count", 0);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let gate = store.on_change("count", move |value| {
        if *value == Value::from(1) {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
        }
    });

    let component = HtmlComponent::new("Counter", "<root>@store:app.default.count</root>", ValueMap::new())
        .unwrap()
        .into_ref();
    app.mount(component).unwrap();

    let writer = store.clone();
    let first = thread::spawn(move || writer.set("count", 1));
    entered_rx.recv().unwrap();
    store.set("count", 2);
    release_tx.send(()).unwrap();
    first.join().unwrap();

    app.flush();
    let span = app.document().find_by_attr(app.container(), "data-store", "app.default.count").unwrap();
    assert_eq!(store.get("count"), Value::from(2));
    assert_eq!(app.document().text_content(span), "2");
    gate.unsubscribe();
}

/// Loop items render in source order.
#[test]
fn loop_renders_items_in_order() {
    let (mut app, _) = app_with_store();
    let items = vec![value_map! { "name" => "Mario" }, value_map! { "name" => "Luigi" }];
    let component = HtmlComponent::new(
        "List",
        "<root>@for:item in items @prop:item.name @endfor</root>",
        props(value_map! { "items" => items }),
    )
    .unwrap()
    .into_ref();
    app.mount(component).unwrap();

    let html = app.html();
    let mario = html.find("Mario").unwrap();
    let luigi = html.find("Luigi").unwrap();
    assert!(mario < luigi, "{html}");
}

/// Store-backed loops re-render the component; repeated re-renders neither
/// leak subscriptions nor change the output for equal state.
#[test]
fn rerenders_are_idempotent_and_leak_free() {
    let (mut app, store) = app_with_store();
    store.set("todos", vec!["a", "b"]);
    let template = "<root><ul>@for:t in store:app.default.todos\n<li>@prop:t</li>@endfor</ul><p>@store:app.default.title</p></root>";
    let component = HtmlComponent::new("Todos", template, ValueMap::new()).unwrap().into_ref();
    app.mount(component.clone()).unwrap();
    let first = app.html();
    let subscriptions = component.subscription_count();

    for _ in 0..10 {
        store.set("todos", vec!["a", "b"]);
        app.flush();
    }
    assert_eq!(app.html(), first);
    assert_eq!(component.subscription_count(), subscriptions);
    assert_eq!(store.listener_count("todos"), 1);
    assert_eq!(store.listener_count("title"), 1);
    assert_eq!(component.stats().render_count, 11);

    store.set("todos", vec!["a", "b", "c"]);
    app.flush();
    assert!(app.html().contains(r#"<li data-key="2">c</li>"#), "{}", app.html());
}

/// Reordering keyed children moves the existing nodes.
#[test]
fn keyed_reorder_moves_nodes() {
    let (mut app, _) = app_with_store();
    let component = HtmlComponent::new("Rows", "<root><ul></ul></root>", ValueMap::new()).unwrap().into_ref();
    app.mount(component.clone()).unwrap();

    let rows = |order: &[&str]| {
        let items: String = order.iter().map(|k| format!(r#"<li data-key="{k}">{k}</li>"#)).collect();
        format!(r#"<root data-component-id="{}"><ul>{items}</ul></root>"#, component.id())
    };
    app.update_dom(component.id(), &rows(&["a", "b", "c"])).unwrap();

    let doc = app.document();
    let ul = doc.descendants(app.container()).into_iter().find(|n| doc.tag(*n) == Some("ul")).unwrap();
    let before = doc.children(ul).to_vec();

    app.update_dom(component.id(), &rows(&["c", "a", "b"])).unwrap();
    let doc = app.document();
    assert_eq!(doc.children(ul), &[before[2], before[0], before[1]]);
}

/// Store updates from another task are applied on the UI context.
#[tokio::test]
async fn store_mutations_from_another_task() {
    let (mut app, store) = app_with_store();
    store.set("count", 0);
    let component = HtmlComponent::new("Counter", "<root>@store:app.default.count</root>", ValueMap::new())
        .unwrap()
        .into_ref();
    app.mount(component).unwrap();

    let writer = store.clone();
    tokio::spawn(async move {
        for n in 1..=3 {
            writer.set("count", n);
        }
    })
    .await
    .unwrap();

    assert!(app.process_next().await);
    let span = app.document().find_by_attr(app.container(), "data-store", "app.default.count").unwrap();
    assert_eq!(app.document().text_content(span), "3");
}

/// Inline includes instantiate registered components and share the store.
#[test]
fn inline_include_mounts_registered_component() {
    let (mut app, store) = app_with_store();
    store.set("user", "Peach");
    let mounted = Arc::new(AtomicUsize::new(0));
    let m = mounted.clone();
    app.components()
        .register("Greeting", move |props| {
            let m = m.clone();
            Ok(HtmlComponent::new("Greeting", "<root>@prop:greeting, @store:app.default.user</root>", props)?
                .on_mount(move |_| {
                    m.fetch_add(1, Ordering::SeqCst);
                })
                .into_ref())
        })
        .unwrap();

    let page = HtmlComponent::new("Page", r#"<root>@include:Greeting:{greeting:"Hello"}</root>"#, ValueMap::new())
        .unwrap()
        .into_ref();
    app.mount(page).unwrap();
    assert!(app.html().contains(r#"Hello, <span data-store="app.default.user">Peach</span>"#), "{}", app.html());
    assert_eq!(app.live_count(), 2);
    assert_eq!(mounted.load(Ordering::SeqCst), 1);

    store.set("user", "Daisy");
    app.flush();
    assert!(app.html().contains(">Daisy</span>"));
    assert_eq!(mounted.load(Ordering::SeqCst), 1);
}

/// Clicking a bound button runs the handler, which mutates the store.
#[test]
fn click_handler_updates_bound_text() {
    let (mut app, store) = app_with_store();
    store.set("count", 0);
    let clicks = Arc::new(AtomicUsize::new(0));
    let c = clicks.clone();
    let s = store.clone();
    app.handlers().register("increment", move |_: &mut Event| {
        c.fetch_add(1, Ordering::SeqCst);
        s.set("count", c.load(Ordering::SeqCst));
    });

    let component = HtmlComponent::new(
        "Counter",
        "<root><button @click.once:increment>+</button><b>@store:app.default.count</b></root>",
        ValueMap::new(),
    )
    .unwrap()
    .into_ref();
    app.mount(component).unwrap();

    let button = app.document().find_by_attr(app.container(), "data-on-click", "increment").unwrap();
    app.dispatch(button, "click");
    app.dispatch(button, "click");
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert!(app.html().contains(r#"<span data-store="app.default.count">1</span>"#));
}

/// Store state transfers between managers.
#[test]
fn snapshot_restores_into_a_fresh_manager() {
    let source = StoreManager::new();
    let store = source.create_store("prefs", StoreOptions::new().module("user")).unwrap();
    store.set("theme", "dark");
    store.set("font", 14);

    let target = StoreManager::new();
    target.restore_bytes(&source.snapshot_bytes().unwrap()).unwrap();
    let restored = target.get_store("user", "prefs").unwrap();
    assert_eq!(restored.get("theme"), Value::from("dark"));
    assert_eq!(restored.get("font"), Value::from(14));
}

/// Effects re-run when a signal they read changes.
#[test]
fn effect_follows_signal() {
    let signal = Signal::new(1);
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    let s = signal.clone();
    let effect = Effect::new(move || {
        seen_clone.store(s.get() as usize, Ordering::SeqCst);
    });

    signal.set(5);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(effect.run_count(), 2);

    effect.stop();
    signal.set(9);
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(signal.subscriber_count(), 0);
}
