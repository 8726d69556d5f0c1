//! Name conflicts between propagated entities and what already lives on a host.

use crate::{ctx, draft_of, engine, sync_error};
use tplsync::config::EngineConfig;
use tplsync::core::{CollisionReason, SyncError};
use tplsync::engine::Engine;
use tplsync::model::{DiscoveryFlag, Graph, Trigger};
use tplsync::test_utils::{StoreBuilder, clone_on, item_on};

/// An authored graph on h1 with the template graph's name but its own item.
#[test]
fn test_collision_blocks_every_host() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link(template, h2);
    let local = builder.item(h1, "cpu.local");
    let graph = builder.graph("CPU load", &[cpu]);
    builder.graph("CPU load", &[local]);
    let mut store = builder.build();

    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    match sync_error(&error) {
        SyncError::NameCollision {
            name,
            host,
            reason,
            ..
        } => {
            assert_eq!(name, "CPU load");
            assert_eq!(host, "h1");
            assert_eq!(*reason, CollisionReason::ItemsNotIdentical);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(error.to_string().contains("\"h1\""));

    assert!(clone_on::<Graph>(&store, graph, h2).is_none());
    assert_eq!(store.all_entities::<Graph>().len(), 2);
    assert_eq!(store.take_writes().total(), 0);
}

#[test]
fn test_collision_rolls_back_whole_batch() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    let local = builder.item(h1, "mem.local");
    let fine = builder.graph("CPU load", &[cpu]);
    let clashing = builder.graph("Memory", &[mem]);
    builder.graph("Memory", &[local]);
    let mut store = builder.build();

    let result = engine(&mut store).propagate::<Graph>(&ctx(), &[fine, clashing], None);
    assert!(result.is_err());
    assert!(clone_on::<Graph>(&store, fine, h1).is_none());
    assert_eq!(store.take_writes().total(), 0);
}

#[test]
fn test_identical_authored_entity_is_adopted() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link(template, h2);
    let host_cpu = item_on(builder.store(), h1, "cpu").unwrap();
    let graph = builder.graph("CPU load", &[cpu]);
    let authored = builder.graph("CPU load", &[host_cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.adopted, 1);
    assert_eq!(report.created, 1);
    assert_eq!(clone_on::<Graph>(&store, graph, h1), Some(authored));
    assert_eq!(store.entity::<Graph>(authored).unwrap().origin_id, Some(graph));

    // once adopted the entity is refreshed like any other clone
    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert!(report.is_noop());
}

#[test]
fn test_adoption_can_be_disabled() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let host_cpu = item_on(builder.store(), h1, "cpu").unwrap();
    let graph = builder.graph("CPU load", &[cpu]);
    builder.graph("CPU load", &[host_cpu]);
    let mut store = builder.build();

    let config = EngineConfig {
        adopt_identical: false,
        ..EngineConfig::default()
    };
    let error = Engine::new(&mut store, config).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::AlreadyExists,
            ..
        }
    ));
}

#[test]
fn test_authored_entity_with_other_flags_is_not_adopted() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let host_cpu = item_on(builder.store(), h1, "cpu").unwrap();
    let graph = builder.graph("CPU load", &[cpu]);
    let authored = builder.graph("CPU load", &[host_cpu]);
    let mut store = builder.build();

    let mut edited = store.entity::<Graph>(authored).unwrap().clone();
    edited.flags = DiscoveryFlag::Created;
    store.put_entity(edited);

    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::FlagsDiffer,
            ..
        }
    ));
    assert!(error.to_string().contains("discovery flags differ"));
    assert_eq!(store.entity::<Graph>(authored).unwrap().origin_id, None);
}

#[test]
fn test_trigger_with_other_expression_is_not_adopted() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let host_cpu = item_on(builder.store(), h1, "cpu").unwrap();
    let trigger = builder.trigger("CPU high", &[cpu]);
    let authored = builder.trigger("CPU high", &[host_cpu]);
    let mut store = builder.build();

    let mut edited = store.entity::<Trigger>(authored).unwrap().clone();
    edited.header.expression = "{0}>90".to_string();
    store.put_entity(edited);

    let error = engine(&mut store).propagate::<Trigger>(&ctx(), &[trigger], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::StructureNotIdentical,
            ..
        }
    ));
}

#[test]
fn test_clone_of_another_template_collides() {
    let mut builder = StoreBuilder::new();
    let t1 = builder.template("Template A");
    let t2 = builder.template("Template B");
    let h1 = builder.host("h1");
    let cpu_a = builder.item(t1, "cpu.a");
    let cpu_b = builder.item(t2, "cpu.b");
    builder.link(t1, h1);
    builder.link(t2, h1);
    let first = builder.graph("CPU load", &[cpu_a]);
    let second = builder.graph("CPU load", &[cpu_b]);
    let mut store = builder.build();

    engine(&mut store).propagate::<Graph>(&ctx(), &[first], None).unwrap();
    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[second], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::InheritedFromAnotherTemplate,
            ..
        }
    ));

    // both at once are caught before anything is classified
    let mut builder = StoreBuilder::new();
    let t1 = builder.template("Template A");
    let t2 = builder.template("Template B");
    let h1 = builder.host("h1");
    let cpu_a = builder.item(t1, "cpu.a");
    let cpu_b = builder.item(t2, "cpu.b");
    builder.link(t1, h1);
    builder.link(t2, h1);
    let first = builder.graph("CPU load", &[cpu_a]);
    let second = builder.graph("CPU load", &[cpu_b]);
    let mut store = builder.build();

    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[first, second], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::NameCollision {
            reason: CollisionReason::DuplicateInBatch,
            ..
        }
    ));
}

#[test]
fn test_rename_onto_existing_host_entity() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let local = builder.item(h1, "mem.local");
    let graph = builder.graph("CPU load", &[cpu]);
    builder.graph("Memory", &[local]);
    builder.propagate_all();
    let mut store = builder.build();

    let mut draft = draft_of::<Graph>(&store, graph);
    draft.name = "Memory".to_string();
    let error = engine(&mut store).update(&ctx(), vec![draft]).unwrap_err();
    match sync_error(&error) {
        SyncError::RenameCollision {
            from,
            to,
            host,
            ..
        } => {
            assert_eq!(from, "CPU load");
            assert_eq!(to, "Memory");
            assert_eq!(host, "h1");
        }
        other => panic!("unexpected error: {other}"),
    }
    // the authored rename was rolled back with the rest
    assert_eq!(store.entity::<Graph>(graph).unwrap().name, "CPU load");
}

#[test]
fn test_rename_onto_sibling_on_template() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    let graph = builder.graph("CPU load", &[cpu]);
    builder.graph("Memory", &[mem]);
    let mut store = builder.build();

    let mut draft = draft_of::<Graph>(&store, graph);
    draft.name = "Memory".to_string();
    let error = engine(&mut store).update(&ctx(), vec![draft]).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::RenameCollision { host, .. } if host == "Template OS Linux"
    ));
}

#[test]
fn test_swapping_names_in_one_update() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    let first = builder.graph("A", &[cpu]);
    let second = builder.graph("B", &[mem]);
    builder.propagate_all();
    let mut store = builder.build();
    let first_clone = clone_on::<Graph>(&store, first, h1).unwrap();
    let second_clone = clone_on::<Graph>(&store, second, h1).unwrap();

    let mut renamed_first = draft_of::<Graph>(&store, first);
    renamed_first.name = "B".to_string();
    let mut renamed_second = draft_of::<Graph>(&store, second);
    renamed_second.name = "A".to_string();
    let applied = engine(&mut store).update(&ctx(), vec![renamed_first, renamed_second]).unwrap();
    assert_eq!(applied.report.updated, 4);

    assert_eq!(store.entity::<Graph>(first_clone).unwrap().name, "B");
    assert_eq!(store.entity::<Graph>(second_clone).unwrap().name, "A");
}
