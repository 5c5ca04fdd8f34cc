use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use pretty_assertions::assert_eq;
use taskboard::clock::ManualClock;
use taskboard::manager::{Partition, Resolution};
use taskboard::view::{self, DateFilter, FilterConfig, ListKind, PriorityFilter};
use taskboard::{
    Identity, JsonTaskStore, Priority, SqliteTaskStore, Status, TaskCollection, TaskDraft,
    TaskError, TaskStore,
};

fn clock() -> ManualClock {
    ManualClock::new(DateTime::from_timestamp(1_760_000_000, 0).unwrap())
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 14)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn write_spec() -> TaskDraft {
    TaskDraft::new("Write spec", "core").with_priority(Priority::High)
}

/// Add, wait out the cooldown, complete, remove: the whole lifecycle of one task.
fn lifecycle<S: TaskStore>(store: &mut S) {
    let clock = clock();
    let mut board = TaskCollection::new(Identity::new("U1")).with_clock(clock.clone());
    board.load(store).unwrap();

    let stored = board.add_task(store, write_spec()).unwrap();
    assert!(!stored.id.is_temporary());
    assert_eq!(board.active().len(), 1);
    assert_eq!(stored.status, Status::Todo);

    let unscheduled = view::unscheduled(board.active());
    assert_eq!(unscheduled.len(), 1);
    assert!(view::bucket_by_weekday(board.active()).is_empty());

    assert!(matches!(
        board.complete_task(store, &stored.id),
        Err(TaskError::Ignored(_))
    ));

    clock.advance(TimeDelta::seconds(3));
    assert!(board.complete_task(store, &stored.id).unwrap());
    assert!(board.active().is_empty());
    assert_eq!(board.find(&stored.id).unwrap().0, Partition::Done);

    // A fresh session sees the same state
    let mut fresh = TaskCollection::new(Identity::new("U1"));
    fresh.load(store).unwrap();
    assert_eq!(fresh.done().len(), 1);
    assert_eq!(fresh.done()[0].id, stored.id);

    clock.advance(TimeDelta::seconds(3));
    assert_eq!(board.remove_task(store, &stored.id).unwrap(), Resolution::Reloaded);
    assert!(board.done().is_empty());
    assert!(board.active().is_empty());
}

#[test]
fn lifecycle_against_sqlite() {
    let mut store = SqliteTaskStore::open_in_memory().unwrap();
    lifecycle(&mut store);
}

#[test]
fn lifecycle_against_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
    lifecycle(&mut store);
}

/// A board opened later over the same store still honours a running cooldown.
fn cooldown_outlives_the_collection<S: TaskStore>(store: &mut S) {
    let clock = clock();
    let stored = {
        let mut board = TaskCollection::new(Identity::new("U1")).with_clock(clock.clone());
        board.load(store).unwrap();
        board.add_task(store, write_spec()).unwrap()
    };

    let mut reopened = TaskCollection::new(Identity::new("U1")).with_clock(clock.clone());
    reopened.load(store).unwrap();
    assert!(matches!(
        reopened.complete_task(store, &stored.id),
        Err(TaskError::Ignored(_))
    ));
    assert_eq!(reopened.active().len(), 1);

    clock.advance(TimeDelta::seconds(3));
    let mut later = TaskCollection::new(Identity::new("U1")).with_clock(clock.clone());
    later.load(store).unwrap();
    assert!(later.complete_task(store, &stored.id).unwrap());
}

#[test]
fn cooldown_outlives_the_collection_sqlite() {
    let mut store = SqliteTaskStore::open_in_memory().unwrap();
    cooldown_outlives_the_collection(&mut store);
}

#[test]
fn cooldown_outlives_the_collection_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    let mut store = JsonTaskStore::open(&path).unwrap();
    cooldown_outlives_the_collection(&mut store);
}

#[test]
fn users_do_not_see_each_other() {
    let mut store = SqliteTaskStore::open_in_memory().unwrap();
    let mut alice = TaskCollection::new(Identity::new("alice"));
    let mut bob = TaskCollection::new(Identity::new("bob")).with_cooldown(TimeDelta::zero());

    alice.add_task(&mut store, write_spec()).unwrap();
    bob.load(&mut store).unwrap();
    assert!(bob.active().is_empty());

    // Bob cannot complete Alice's task even by guessing its id
    let alice_id = alice.active()[0].id.clone();
    assert!(!bob.complete_task(&mut store, &alice_id).unwrap());
}

#[test]
fn search_filter_returns_only_matching_task() {
    let mut store = SqliteTaskStore::open_in_memory().unwrap();
    let mut board = TaskCollection::new(Identity::new("U1"));
    board.add_task(&mut store, write_spec()).unwrap();
    board
        .add_task(&mut store, TaskDraft::new("Buy milk", "semi-skimmed"))
        .unwrap();

    let config = FilterConfig {
        search: "spec".into(),
        ..FilterConfig::default()
    };
    let hits = view::apply_filters(board.active(), &config, ListKind::Active, now());
    let titles: Vec<&str> = hits.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Write spec"]);
}

#[test]
fn weekly_board_from_store() {
    let mut store = SqliteTaskStore::open_in_memory().unwrap();
    let mut board = TaskCollection::new(Identity::new("U1"));
    let at = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2026, 10, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    };

    for (title, date, priority) in [
        ("Gym", Some(at(12, 7)), Priority::Low),
        ("Review", Some(at(14, 15)), Priority::High),
        ("Brunch", Some(at(18, 11)), Priority::Medium),
        ("Next week", Some(at(19, 9)), Priority::High),
        ("Whenever", None, Priority::High),
    ] {
        board
            .add_task(
                &mut store,
                TaskDraft::new(title, "x").with_date(date).with_priority(priority),
            )
            .unwrap();
    }

    let config = FilterConfig {
        priority: PriorityFilter::Is(Priority::High),
        date: DateFilter::ThisWeek,
        ..FilterConfig::default()
    };
    let projected = view::project(board.active(), board.done(), &config, now());
    let titles: Vec<&str> = projected.active.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Review"]);
    assert_eq!(projected.week.get(Weekday::Wed).len(), 1);
    assert!(projected.unscheduled.is_empty());

    let all = view::project(board.active(), board.done(), &FilterConfig::default(), now());
    assert_eq!(all.week.get(Weekday::Mon).len(), 2);
    assert_eq!(all.week.get(Weekday::Sun)[0].title, "Brunch");
    assert_eq!(all.week.len() + all.unscheduled.len(), board.active().len());
}
