use std::{cell::Cell, rc::Rc, time::Duration};

use futures::{executor::block_on, FutureExt};
use pretty_assertions::assert_eq;
use query_state::{create_query_store, BindingPhase, ManualScheduler, QueryStore};
use query_state_contract::{
    ClearOptions, FieldSchema, HistoryMode, MemoryRouter, ObjectSchema, QueryMap,
    QueryStateOptions, RouterAdapter, ServerRouter, SetOptions,
};
use serde::{Deserialize, Serialize};

const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Listing {
    search: Option<String>,
    page: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Status {
    status: String,
    count: i64,
}

fn listing_schema() -> ObjectSchema<Listing> {
    ObjectSchema::new()
        .field("search", FieldSchema::string().optional())
        .field("page", FieldSchema::integer().optional())
}

fn status_schema() -> ObjectSchema<Status> {
    ObjectSchema::new()
        .field(
            "status",
            FieldSchema::one_of(["active", "inactive"]).default_value("active"),
        )
        .field("count", FieldSchema::integer().default_value(0))
}

fn store_over<S>(schema: S, router: Rc<dyn RouterAdapter>, scheduler: &ManualScheduler) -> QueryStore<S>
where
    S: query_state_contract::QuerySchema + 'static,
{
    create_query_store(
        schema,
        router,
        Rc::new(scheduler.clone()),
        QueryStateOptions::default(),
    )
}

fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let bump = {
        let count = count.clone();
        move || count.set(count.get() + 1)
    };
    (count, bump)
}

fn search(value: &str) -> Listing {
    Listing {
        search: Some(value.into()),
        page: None,
    }
}

#[test]
fn set_writes_the_url_after_the_debounce() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    assert_eq!(params.value(), Listing::default());

    let written = params.set(search("test query"), SetOptions::default());
    assert_eq!(params.value(), search("test query"));
    assert!(router.history().is_empty());

    scheduler.advance(DEBOUNCE);
    assert!(block_on(written));
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "test query")]));

    let history = router.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].mode, HistoryMode::Push);
    assert!(history[0].options.shallow);
}

#[test]
fn unknown_keys_are_hidden_but_survive_writes() {
    let router = MemoryRouter::new(
        "/products",
        QueryMap::from_pairs([("search", "test"), ("invalidParam", "value")]),
    );
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    assert_eq!(params.value(), search("test"));

    let written = params.update(|listing| listing.page = Some(2), SetOptions::default());
    scheduler.advance(DEBOUNCE);
    assert!(block_on(written));
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("invalidParam", "value"), ("page", "2"), ("search", "test")])
    );
}

#[test]
fn invalid_router_query_falls_back_to_defaults() {
    let router = MemoryRouter::new(
        "/status",
        QueryMap::from_pairs([("status", "archived"), ("count", "3")]),
    );
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    assert_eq!(
        params.value(),
        Status {
            status: "active".into(),
            count: 0,
        }
    );
}

#[test]
fn clearing_with_reset_writes_defaults_and_keeps_foreign_keys() {
    let router = MemoryRouter::new(
        "/status",
        QueryMap::from_pairs([("status", "inactive"), ("count", "5"), ("extra", "keep")]),
    );
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    assert!(block_on(
        store.clear_query_params(None, ClearOptions::reset_to_defaults())
    ));
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("count", "0"), ("extra", "keep"), ("status", "active")])
    );
}

#[test]
fn clearing_removes_only_the_requested_keys() {
    let router = MemoryRouter::new(
        "/status",
        QueryMap::from_pairs([("status", "inactive"), ("count", "5"), ("extra", "keep")]),
    );
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    assert!(block_on(store.clear_query_params(
        Some(vec!["count".to_string()]),
        ClearOptions::default()
    )));
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("extra", "keep"), ("status", "inactive")])
    );

    assert!(block_on(
        store.clear_query_params(None, ClearOptions::default())
    ));
    assert_eq!(router.query(), QueryMap::from_pairs([("extra", "keep")]));
}

#[test]
fn dynamic_route_segments_survive_writes_and_clears() {
    let router = MemoryRouter::new(
        "/posts/[id]",
        QueryMap::from_pairs([("id", "123"), ("search", "old")]),
    );
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    let written = params.set(search("new"), SetOptions::default());
    scheduler.advance(DEBOUNCE);
    assert!(block_on(written));
    assert_eq!(router.pathname(), "/posts/[id]");
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("id", "123"), ("search", "new")])
    );

    assert!(block_on(
        store.clear_query_params(None, ClearOptions::default())
    ));
    assert_eq!(router.query(), QueryMap::from_pairs([("id", "123")]));
}

#[test]
fn rapid_sets_coalesce_into_one_navigation() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let params = store.use_query_params(None, || {});

    let first = params.set(search("s"), SetOptions::default());
    scheduler.advance(Duration::from_millis(100));
    let second = params.set(search("sh"), SetOptions::default());
    scheduler.advance(Duration::from_millis(100));
    let third = params.set(search("shoe"), SetOptions::default());

    scheduler.advance(DEBOUNCE - Duration::from_millis(1));
    assert!(router.history().is_empty());
    assert!(params.binding().has_pending_write());

    scheduler.advance(Duration::from_millis(1));
    assert_eq!(router.history().len(), 1);
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "shoe")]));
    assert!(block_on(first));
    assert!(block_on(second));
    assert!(block_on(third));
}

#[test]
fn unmount_cancels_the_pending_write() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    let written = params.set(search("gone"), SetOptions::default());
    drop(params);

    scheduler.advance(Duration::from_secs(1));
    assert!(!block_on(written));
    assert!(router.history().is_empty());
    assert_eq!(router.listener_count(), 0);
    assert_eq!(store.store().subscriber_count(), 0);
}

#[test]
fn external_navigation_is_adopted() {
    let router = MemoryRouter::new("/products", QueryMap::from_pairs([("search", "a")]));
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let (changes, on_change) = counter();

    let params = store.use_query_params(None, on_change);
    router.navigate_externally("/products", QueryMap::from_pairs([("search", "b")]));

    assert_eq!(params.value(), search("b"));
    assert_eq!(changes.get(), 1);
    scheduler.advance(Duration::from_secs(1));
    assert!(router.history().is_empty());
}

#[test]
fn first_load_writes_missing_defaults_once_with_replace() {
    let router = MemoryRouter::new("/status", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    let first = store.use_query_params(None, || {});
    scheduler.run_until_stalled();
    let _second = store.use_query_params(None, || {});
    scheduler.advance(Duration::from_secs(1));

    let history = router.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].mode, HistoryMode::Replace);
    assert!(history[0].options.shallow);
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("count", "0"), ("status", "active")])
    );
    assert_eq!(first.binding().phase(), BindingPhase::Steady);
}

#[test]
fn handles_mounted_together_write_defaults_once() {
    let router = MemoryRouter::new("/status", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    let first = store.use_query_params(None, || {});
    let second = store.use_query_params(None, || {});
    scheduler.advance(Duration::from_secs(1));

    assert_eq!(router.history().len(), 1);
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("count", "0"), ("status", "active")])
    );
    assert_eq!(first.binding().phase(), BindingPhase::Steady);
    assert_eq!(second.binding().phase(), BindingPhase::Steady);
}

#[test]
fn first_load_writes_the_initial_query() {
    let router = MemoryRouter::new("/status", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(status_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(Some(QueryMap::from_pairs([("status", "inactive")])), || {});
    assert_eq!(params.value().status, "inactive");
    scheduler.run_until_stalled();

    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("count", "0"), ("status", "inactive")])
    );
}

#[test]
fn writes_wait_for_the_router_to_become_ready() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    router.set_ready(false);
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    assert_eq!(params.binding().phase(), BindingPhase::AwaitingRouterReady);
    let written = params.set(search("early"), SetOptions::default());
    scheduler.advance(Duration::from_secs(1));
    assert!(router.history().is_empty());
    assert_eq!(params.value(), search("early"));

    router.set_ready(true);
    scheduler.run_until_stalled();

    assert!(block_on(written));
    assert_eq!(params.binding().phase(), BindingPhase::Steady);
    let history = router.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].mode, HistoryMode::Replace);
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "early")]));
}

#[test]
fn first_initial_query_wins_across_mounted_handles() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let first = store.use_query_params(Some(QueryMap::from_pairs([("search", "first")])), || {});
    let second =
        store.use_query_params(Some(QueryMap::from_pairs([("search", "second")])), || {});
    assert_eq!(first.value(), search("first"));
    assert_eq!(second.value(), search("first"));

    scheduler.run_until_stalled();
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "first")]));
    assert_eq!(second.value(), search("first"));
    assert_eq!(router.history().len(), 1);
}

#[test]
fn setting_the_current_value_is_a_no_op() {
    let router = MemoryRouter::new("/products", QueryMap::from_pairs([("search", "same")]));
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let (changes, on_change) = counter();

    let params = store.use_query_params(None, on_change);
    let written = params.set(search("same"), SetOptions::default());

    assert_eq!(scheduler.pending_timers(), 0);
    assert!(block_on(written));
    assert!(router.history().is_empty());
    assert_eq!(changes.get(), 0);
}

#[test]
fn setter_resolves_only_after_the_navigation_completes() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    router.set_deferred(true);
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let params = store.use_query_params(None, || {});
    let mut written = params.set(search("slow"), SetOptions::default());
    scheduler.advance(DEBOUNCE);

    assert_eq!(router.pending_navigations(), 1);
    assert_eq!((&mut written).now_or_never(), None);
    assert_eq!(router.query(), QueryMap::new());

    assert!(router.resolve_next());
    scheduler.run_until_stalled();
    assert!(block_on(written));
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "slow")]));
}

#[test]
fn rejected_navigation_reverts_the_local_value() {
    let router = MemoryRouter::new("/products", QueryMap::from_pairs([("search", "kept")]));
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let (changes, on_change) = counter();

    let params = store.use_query_params(None, on_change);
    router.fail_next_navigation("blocked by guard");
    let written = params.set(search("lost"), SetOptions::default());
    scheduler.advance(DEBOUNCE);

    assert!(!block_on(written));
    assert_eq!(params.value(), search("kept"));
    assert_eq!(changes.get(), 2);
}

#[test]
fn handles_of_one_store_share_updates() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let other = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);
    let (changes, on_change) = counter();

    let writer = store.use_query_params(None, || {});
    let reader = store.use_query_params(None, on_change);
    let _isolated = other.use_query_params(None, || {});
    assert_eq!(store.store().subscriber_count(), 2);
    assert_eq!(other.store().subscriber_count(), 1);
    assert!(!store.store().ptr_eq(other.store()));
    assert!(format!("{store:?}").starts_with("QueryStore"));

    let written = writer.set(search("shared"), SetOptions::default());
    scheduler.advance(DEBOUNCE);
    assert!(block_on(written));

    assert_eq!(reader.value(), search("shared"));
    assert_eq!(changes.get(), 1);
}

#[test]
fn single_field_handle_reads_and_writes_its_key() {
    let router = MemoryRouter::new("/products", QueryMap::from_pairs([("page", "4")]));
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let page = store.use_query_param::<i64>("page", None, || {});
    let search_param = store.use_query_param::<String>("search", None, || {});
    assert_eq!(page.key(), "page");
    assert_eq!(page.value(), Some(4));
    assert_eq!(search_param.value(), None);

    let written = search_param.set(Some("boots".into()), SetOptions::default());
    scheduler.advance(DEBOUNCE);
    assert!(block_on(written));
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("page", "4"), ("search", "boots")])
    );

    let cleared = page.set(None, SetOptions::default());
    scheduler.advance(DEBOUNCE);
    assert!(block_on(cleared));
    assert_eq!(router.query(), QueryMap::from_pairs([("search", "boots")]));
}

#[test]
fn server_rendering_reads_initial_query_and_refuses_writes() {
    let router = ServerRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router), &scheduler);

    let params = store.use_query_params(Some(QueryMap::from_pairs([("search", "ssr")])), || {});
    assert_eq!(params.value(), search("ssr"));

    let written = params.set(search("client"), SetOptions::default());
    assert!(!block_on(written));
    assert_eq!(params.binding().phase(), BindingPhase::AwaitingRouterReady);
    assert_eq!(scheduler.pending_timers(), 0);
}

#[test]
fn single_field_handles_writing_in_one_window_keep_both_keys() {
    let router = MemoryRouter::new("/products", QueryMap::new());
    let scheduler = ManualScheduler::new();
    let store = store_over(listing_schema(), Rc::new(router.clone()), &scheduler);

    let page = store.use_query_param::<i64>("page", None, || {});
    let search_param = store.use_query_param::<String>("search", None, || {});

    let page_written = page.set(Some(2), SetOptions::default());
    scheduler.advance(Duration::from_millis(100));
    let search_written = search_param.set(Some("boots".into()), SetOptions::default());
    scheduler.advance(Duration::from_secs(1));

    assert!(block_on(page_written));
    assert!(block_on(search_written));
    assert_eq!(
        router.query(),
        QueryMap::from_pairs([("page", "2"), ("search", "boots")])
    );
    assert_eq!(page.value(), Some(2));
    assert_eq!(search_param.value().as_deref(), Some("boots"));
}
