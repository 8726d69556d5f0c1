//! Create, update, delete and unlink requests, and their transactional behaviour.

use crate::{ctx, draft_of, engine, sync_error};
use tplsync::core::{CollisionReason, SyncError};
use tplsync::engine::UnlinkMode;
use tplsync::model::{
    EntityDraft, EntityId, Graph, GraphHeader, GraphItemAttrs, SubItem, Trigger, TriggerFunction,
    TriggerHeader,
};
use tplsync::test_utils::{StoreBuilder, clone_on, item_on};

fn graph_draft(name: &str, items: &[tplsync::model::ItemId]) -> EntityDraft<Graph> {
    let items = items
        .iter()
        .enumerate()
        .map(|(ordinal, item)| SubItem::new(*item, ordinal as u32, GraphItemAttrs::colored("1A7C11")))
        .collect();
    EntityDraft::new(name, GraphHeader::default(), items)
}

#[test]
fn test_create_on_template_propagates() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let mut store = builder.build();

    let applied = engine(&mut store).create(&ctx(), vec![graph_draft("CPU load", &[cpu])]).unwrap();
    assert_eq!(applied.ids.len(), 1);
    assert_eq!(applied.report.created, 2);
    assert_eq!(applied.report.sub_items.inserted, 2);

    let clone = clone_on::<Graph>(&store, applied.ids[0], h1).unwrap();
    assert_eq!(
        store.entity::<Graph>(clone).unwrap().item_ids(),
        vec![item_on(&store, h1, "cpu").unwrap()]
    );
}

#[test]
fn test_create_rejects_names_taken_on_the_host() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let cpu = builder.item(h1, "cpu");
    let mem = builder.item(h1, "mem");
    builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let error = engine(&mut store).create(&ctx(), vec![graph_draft("CPU load", &[mem])]).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::AlreadyExists,
            ..
        }
    ));

    let drafts = vec![graph_draft("Memory", &[mem]), graph_draft("Memory", &[cpu])];
    let error = engine(&mut store).create(&ctx(), drafts).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::DuplicateInBatch,
            ..
        }
    ));
    assert_eq!(store.all_entities::<Graph>().len(), 1);
}

#[test]
fn test_invalid_drafts() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let cpu = builder.item(h1, "cpu");
    let mut store = builder.build();

    let cases = vec![
        graph_draft("  ", &[cpu]),
        graph_draft("No items", &[]),
        graph_draft("With dependencies", &[cpu]).with_dependencies(vec![EntityId(1)]),
    ];
    for draft in cases {
        let error = engine(&mut store).create(&ctx(), vec![draft]).unwrap_err();
        assert!(matches!(sync_error(&error), SyncError::InvalidEntity { kind: "graph", .. }));
    }

    let error = engine(&mut store)
        .create(&ctx(), vec![graph_draft("Unknown item", &[tplsync::model::ItemId(404)])])
        .unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::EntityNotFound { kind: "item", id: 404 }));

    let error = engine(&mut store).update(&ctx(), vec![graph_draft("No id", &[cpu])]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::InvalidEntity { .. }));
    assert!(store.all_entities::<Graph>().is_empty());
}

#[test]
fn test_clones_are_read_only() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();
    let clone = clone_on::<Graph>(&store, graph, h1).unwrap();

    let draft = draft_of::<Graph>(&store, clone);
    let error = engine(&mut store).update(&ctx(), vec![draft]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::ReadOnlyClone { operation: "update", .. }));

    let error = engine(&mut store).delete::<Graph>(&ctx(), &[clone]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::ReadOnlyClone { operation: "delete", .. }));
}

#[test]
fn test_entity_with_clones_cannot_move_hosts() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let local = builder.item(h1, "local");
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();

    let mut draft = draft_of::<Graph>(&store, graph);
    draft.items = vec![SubItem::new(local, 0, GraphItemAttrs::colored("1A7C11"))];
    let error = engine(&mut store).update(&ctx(), vec![draft]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::InvalidEntity { .. }));
}

#[test]
fn test_delete_removes_clones_at_every_level() {
    let mut builder = StoreBuilder::new();
    let base = builder.template("Template Base");
    let os = builder.template("Template OS");
    let h1 = builder.host("h1");
    let cpu = builder.item(base, "cpu");
    builder.link(base, os);
    builder.link(os, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();
    assert_eq!(store.all_entities::<Graph>().len(), 3);

    let report = engine(&mut store).delete::<Graph>(&ctx(), &[graph, graph]).unwrap();
    assert_eq!(report.deleted, 3);
    assert_eq!(report.sub_items.deleted, 3);
    assert!(store.all_entities::<Graph>().is_empty());

    let error = engine(&mut store).delete::<Graph>(&ctx(), &[graph]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::EntityNotFound { kind: "graph", .. }));
}

#[test]
fn test_delete_trigger_drops_its_edges() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    builder.link(template, h2);
    let up = builder.trigger("Memory high", &[mem]);
    let down = builder.trigger("CPU high", &[cpu]);
    builder.depend(down, up);
    builder.propagate_all();
    let mut store = builder.build();
    assert_eq!(store.dependency_edges().len(), 3);

    let report = engine(&mut store).delete::<Trigger>(&ctx(), &[up]).unwrap();
    assert_eq!(report.deleted, 3);
    assert_eq!(report.dependencies.deleted, 3);
    assert!(store.dependency_edges().is_empty());
    assert!(clone_on::<Trigger>(&store, down, h1).is_some());
}

#[test]
fn test_unlink_clear_deletes_clones_on_unlinked_host() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link(template, h2);
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();

    assert!(store.unlink_template(template, h1));
    let report = engine(&mut store)
        .unlink_templates::<Graph>(&ctx(), &[template], &[h1], UnlinkMode::Clear)
        .unwrap();
    assert_eq!(report.deleted, 1);
    assert!(clone_on::<Graph>(&store, graph, h1).is_none());
    assert!(clone_on::<Graph>(&store, graph, h2).is_some());
}

#[test]
fn test_unlink_keep_detaches_and_relink_adopts() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();
    let clone = clone_on::<Graph>(&store, graph, h1).unwrap();

    store.unlink_template(template, h1);
    let report = engine(&mut store)
        .unlink_templates::<Graph>(&ctx(), &[template], &[h1], UnlinkMode::Keep)
        .unwrap();
    assert_eq!(report.detached, 1);
    let kept = store.entity::<Graph>(clone).unwrap();
    assert_eq!(kept.origin_id, None);
    assert_eq!(kept.name, "CPU load");

    // the detached graph is now an identical authored graph and is adopted back
    store.link_template(template, h1).unwrap();
    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.adopted, 1);
    assert_eq!(report.created, 0);
    assert_eq!(store.entity::<Graph>(clone).unwrap().origin_id, Some(graph));
}

#[test]
fn test_store_failure_rolls_back_everything() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    let up = builder.trigger("Memory high", &[mem]);
    let mut store = builder.build();

    store.fail_writes_to("trigger_depends");
    let draft = EntityDraft::<Trigger>::new(
        "CPU high",
        TriggerHeader::new("{0}>0"),
        vec![SubItem::new(cpu, 0, TriggerFunction::new("last", ""))],
    )
    .with_dependencies(vec![up]);
    let error = engine(&mut store).create(&ctx(), vec![draft]).unwrap_err();
    let error = sync_error(&error);
    assert!(matches!(error, SyncError::Store { .. }));
    assert!(!error.is_rejection());

    // the trigger inserted before the failing edge write is gone too
    assert_eq!(store.all_entities::<Trigger>().len(), 1);
    assert_eq!(store.take_writes().total(), 0);
}
