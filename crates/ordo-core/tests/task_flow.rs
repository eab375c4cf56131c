use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use ordo_core::bulk::{BulkDelete, bulk_delete};
use ordo_core::gateway::PersistenceGateway;
use ordo_core::import::{ImportFormat, import};
use ordo_core::prompt::ScriptedPrompter;
use ordo_core::reorder::{Direction, Moved, Position, move_relative, move_task};
use ordo_core::selection::{SelectionController, TriState};
use ordo_core::storage::FileStorage;
use ordo_core::store::OrderedTaskStore;
use ordo_core::task::NewTask;
use tempfile::tempdir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap()
}

fn open(dir: &Path) -> OrderedTaskStore {
    let storage = FileStorage::open(dir).expect("open storage");
    OrderedTaskStore::load(PersistenceGateway::new(storage), now())
}

fn texts(store: &OrderedTaskStore) -> Vec<String> {
    store.list().into_iter().map(|t| t.text).collect()
}

fn orders(store: &OrderedTaskStore) -> Vec<i64> {
    store.list().into_iter().map(|t| t.order).collect()
}

#[test]
fn drag_to_end_survives_reload() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let a = store.add(NewTask::text("A"), now()).expect("add A");
    store.add(NewTask::text("B"), now()).expect("add B");
    let c = store.add(NewTask::text("C"), now()).expect("add C");

    assert_eq!(move_task(&mut store, a, c, Position::After), Moved::Moved);
    assert_eq!(texts(&store), ["B", "C", "A"]);
    assert_eq!(orders(&store), [0, 1, 2]);

    let reloaded = open(temp.path());
    assert_eq!(texts(&reloaded), ["B", "C", "A"]);
    assert_eq!(orders(&reloaded), [0, 1, 2]);
}

#[test]
fn orders_stay_dense_across_mixed_moves_and_deletes() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    let ids: Vec<u64> = (0..6)
        .map(|i| store.add(NewTask::text(format!("t{i}")), now()).expect("add"))
        .collect();

    let _ = move_task(&mut store, ids[5], ids[0], Position::Before);
    store.remove(ids[2], &mut selection).expect("remove");
    let _ = move_relative(&mut store, ids[0], Direction::Down);
    let _ = move_task(&mut store, ids[1], ids[4], Position::After);
    let _ = move_relative(&mut store, ids[5], Direction::Up);

    let n = store.len() as i64;
    assert_eq!(orders(&store), (0..n).collect::<Vec<_>>());
}

#[test]
fn select_all_then_deselect_one_is_partial() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    for text in ["x", "y", "z"] {
        store.add(NewTask::text(text), now()).expect("add");
    }
    let ids = store.ids_in_order();
    let mut selection = SelectionController::default();

    selection.select_all(true, &ids);
    assert_eq!(selection.state(store.len()), TriState::All);
    selection.toggle(ids[1], false, &ids);
    assert_eq!(selection.state(store.len()), TriState::Partial);
}

#[test]
fn shift_range_without_anchor_starts_at_first_click() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    for text in ["x", "y", "z", "w"] {
        store.add(NewTask::text(text), now()).expect("add");
    }
    let ids = store.ids_in_order();
    let mut selection = SelectionController::default();

    selection.toggle(ids[0], true, &ids);
    selection.toggle(ids[2], true, &ids);
    assert_eq!(selection.ids(), ids[..3].to_vec());
}

#[test]
fn bulk_delete_leaves_no_dangling_selection() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    for text in ["a", "b", "c"] {
        store.add(NewTask::text(text), now()).expect("add");
    }
    let ids = store.ids_in_order();
    let mut selection = SelectionController::default();
    selection.toggle(ids[0], false, &ids);
    selection.toggle(ids[2], false, &ids);

    let mut prompter = ScriptedPrompter::answering([true]);
    assert_eq!(
        bulk_delete(&mut store, &mut selection, &mut prompter),
        BulkDelete::Deleted(2)
    );
    assert!(selection.is_empty());
    assert_eq!(texts(&open(temp.path())), ["b"]);
}

#[test]
fn csv_import_into_empty_store() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    let payload = "ID,テキスト,完了,作成日時,完了日時,順序\n\
                   40,\"first\",false,2025-03-01T00:00:00.000Z,,7\n\
                   41,\"second\",true,2025-03-02T00:00:00.000Z,2025-03-03T00:00:00.000Z,3\n";

    let mut prompter = ScriptedPrompter::default();
    let count = import(
        &mut store,
        &mut selection,
        payload,
        ImportFormat::Csv,
        &mut prompter,
        now(),
    )
    .expect("import");

    assert_eq!(count, 2);
    assert!(prompter.confirms.is_empty());
    assert_eq!(prompter.alerts, ["Imported 2 task(s)."]);
    let list = store.list();
    assert_eq!(list.iter().map(|t| t.id).collect::<Vec<_>>(), [1, 2]);
    assert_eq!(orders(&store), [0, 1]);
    assert!(list[1].completed);
    assert_eq!(texts(&open(temp.path())), ["first", "second"]);
}

#[test]
fn open_imported_task_drops_completion_stamp() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    let payload = r#"[
        {"text":"reopened","completed":false,"completedAt":"2025-03-03T00:00:00.000Z"},
        {"text":"done","completed":true,"completedAt":"2025-03-04T00:00:00.000Z"}
    ]"#;

    let mut prompter = ScriptedPrompter::default();
    import(
        &mut store,
        &mut selection,
        payload,
        ImportFormat::Json,
        &mut prompter,
        now(),
    )
    .expect("import");

    let list = open(temp.path()).list();
    assert!(!list[0].completed);
    assert_eq!(list[0].completed_at, None);
    assert!(list[1].completed);
    assert_eq!(
        list[1].completed_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap())
    );
}

#[test]
fn replace_import_clears_tasks_and_selection() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    for text in ["old1", "old2"] {
        store.add(NewTask::text(text), now()).expect("add");
    }
    let ids = store.ids_in_order();
    selection.select_all(true, &ids);

    let payload = r#"{"todos":[{"id":1,"text":"fresh","completed":false,"order":9}]}"#;
    let mut prompter = ScriptedPrompter::answering([true]);
    import(
        &mut store,
        &mut selection,
        payload,
        ImportFormat::Json,
        &mut prompter,
        now(),
    )
    .expect("import");

    assert_eq!(prompter.confirms.len(), 1);
    assert!(selection.is_empty());
    assert_eq!(texts(&store), ["fresh"]);
    assert_eq!(orders(&store), [0]);
    assert_eq!(store.list()[0].id, 3);
}

#[test]
fn merge_import_appends_duplicates() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    store.add(NewTask::text("kept"), now()).expect("add");

    let payload = r#"[{"text":"kept"}]"#;
    for _ in 0..2 {
        let mut prompter = ScriptedPrompter::answering([false]);
        import(
            &mut store,
            &mut selection,
            payload,
            ImportFormat::Json,
            &mut prompter,
            now(),
        )
        .expect("import");
    }

    assert_eq!(texts(&store), ["kept", "kept", "kept"]);
    assert_eq!(orders(&store), [0, 1, 2]);
}

#[test]
fn malformed_import_leaves_store_untouched() {
    let temp = tempdir().expect("tempdir");
    let mut store = open(temp.path());
    let mut selection = SelectionController::default();
    store.add(NewTask::text("safe"), now()).expect("add");

    let mut prompter = ScriptedPrompter::answering([true]);
    let result = import(
        &mut store,
        &mut selection,
        "ID,テキスト\n1,lonely",
        ImportFormat::Csv,
        &mut prompter,
        now(),
    );

    assert!(result.is_err());
    assert!(prompter.confirms.is_empty());
    assert_eq!(prompter.alerts.len(), 1);
    assert_eq!(texts(&store), ["safe"]);
}

#[test]
fn corrupted_storage_loads_empty() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("todos.json"), "{not json").expect("write");

    let mut store = open(temp.path());
    assert!(store.is_empty());

    store.add(NewTask::text("recovered"), now()).expect("add");
    assert_eq!(texts(&open(temp.path())), ["recovered"]);
}
