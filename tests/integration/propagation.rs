//! Propagation of template entities to linked hosts and child templates.

use crate::{ctx, engine, sync_error};
use tplsync::config::EngineConfig;
use tplsync::core::SyncError;
use tplsync::engine::Engine;
use tplsync::model::{Graph, GraphItemAttrs, Trigger};
use tplsync::test_utils::{StoreBuilder, clone_on, init_test_logging, item_on};

/// Template graph on one template linked to two hosts.
#[test]
fn test_graph_fans_out_to_linked_hosts() {
    init_test_logging(None);
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "system.cpu.load");
    builder.link(template, h1);
    builder.link(template, h2);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.sub_items.inserted, 2);
    assert_eq!(report.levels, 1);
    assert!(report.deferred.is_empty());

    for host in [h1, h2] {
        let id = clone_on::<Graph>(&store, graph, host).expect("clone on host");
        let clone = store.entity::<Graph>(id).unwrap();
        assert_eq!(clone.name, "CPU load");
        assert_eq!(clone.origin_id, Some(graph));
        assert_eq!(clone.item_ids(), vec![item_on(&store, host, "system.cpu.load").unwrap()]);
    }
}

#[test]
fn test_second_propagation_writes_nothing() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    builder.link(template, h2);
    let graph = builder.graph("Overview", &[cpu, mem]);
    let trigger = builder.trigger("Overloaded", &[cpu, mem]);
    let mut store = builder.build();

    let mut engine = engine(&mut store);
    engine.propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    engine.propagate::<Trigger>(&ctx(), &[trigger], None).unwrap();
    store.take_writes();

    let mut engine = crate::engine(&mut store);
    let graphs = engine.propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    let triggers = engine.propagate::<Trigger>(&ctx(), &[trigger], None).unwrap();
    assert!(graphs.is_noop());
    assert!(triggers.is_noop());
    assert_eq!(graphs.unchanged, 2);
    assert_eq!(triggers.unchanged, 2);
    assert_eq!(store.take_writes().total(), 0);
}

#[test]
fn test_clone_and_sub_item_ids_survive_template_edit() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    builder.propagate_all();
    let mut store = builder.build();

    let clone_id = clone_on::<Graph>(&store, graph, h1).unwrap();
    let sub_item_id = store.entity::<Graph>(clone_id).unwrap().items[0].id;

    let mut draft = crate::draft_of::<Graph>(&store, graph);
    draft.items[0].attrs = GraphItemAttrs::colored("00FF00");
    let applied = engine(&mut store).update(&ctx(), vec![draft]).unwrap();
    assert_eq!(applied.ids, vec![graph]);
    assert_eq!(applied.report.updated, 2);
    assert_eq!(applied.report.sub_items.updated, 2);
    assert_eq!(applied.report.created, 0);

    let clone = store.entity::<Graph>(clone_id).unwrap();
    assert_eq!(clone_on::<Graph>(&store, graph, h1), Some(clone_id));
    assert_eq!(clone.items[0].id, sub_item_id);
    assert_eq!(clone.items[0].attrs.color, "00FF00");
}

#[test]
fn test_multi_level_chain() {
    let mut builder = StoreBuilder::new();
    let base = builder.template("Template Base");
    let os = builder.template("Template OS");
    let h1 = builder.host("h1");
    let cpu = builder.item(base, "cpu");
    builder.link(base, os);
    builder.link(os, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.levels, 2);

    // the host clone tracks the clone on the intermediate template
    let on_os = clone_on::<Graph>(&store, graph, os).unwrap();
    let on_host = clone_on::<Graph>(&store, on_os, h1).unwrap();
    assert_eq!(store.entity::<Graph>(on_host).unwrap().origin_id, Some(on_os));
    assert_eq!(clone_on::<Graph>(&store, graph, h1), None);
}

#[test]
fn test_depth_bound_is_enforced() {
    let mut builder = StoreBuilder::new();
    let base = builder.template("Template Base");
    let os = builder.template("Template OS");
    let h1 = builder.host("h1");
    let cpu = builder.item(base, "cpu");
    builder.link(base, os);
    builder.link(os, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let config = EngineConfig {
        max_inheritance_depth: 1,
        ..EngineConfig::default()
    };
    let error = Engine::new(&mut store, config).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::InheritanceDepthExceeded { max: 1, .. }));
    assert_eq!(store.all_entities::<Graph>().len(), 1);
}

#[test]
fn test_missing_item_link_defers_host() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link_without_items(template, h2);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.deferred.len(), 1);
    assert_eq!(report.deferred[0].host, h2);
    assert_eq!(report.deferred[0].host_name, "h2");
    assert_eq!(report.deferred[0].missing_items, vec![cpu]);
    assert!(clone_on::<Graph>(&store, graph, h2).is_none());
}

#[test]
fn test_unresolvable_everywhere_is_fatal() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "system.cpu.load");
    builder.link_without_items(template, h1);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    match sync_error(&error) {
        SyncError::UnresolvedItemLink {
            name,
            item,
            host,
            ..
        } => {
            assert_eq!(name, "CPU load");
            assert_eq!(item, "system.cpu.load");
            assert_eq!(host, "h1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.take_writes().total(), 0);
}

#[test]
fn test_item_inheritance_fills_missing_links() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let cpu = builder.item(template, "cpu");
    builder.link_without_items(template, h1);
    builder.auto_link_items();
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.created, 1);
    assert!(report.deferred.is_empty());
    assert!(item_on(&store, h1, "cpu").is_some());
}

#[test]
fn test_discovered_hosts_are_skipped() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let discovered = builder.discovered_host("vm-1234");
    let cpu = builder.item(template, "cpu");
    builder.link(template, discovered);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert!(report.is_noop());
    assert_eq!(report.levels, 0);
}

#[test]
fn test_entity_spanning_templates_with_different_links() {
    let mut builder = StoreBuilder::new();
    let t1 = builder.template("Template CPU");
    let t2 = builder.template("Template Memory");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(t1, "cpu");
    let mem = builder.item(t2, "mem");
    builder.link(t1, h1);
    builder.link(t2, h1);
    let graph = builder.graph("CPU and memory", &[cpu, mem]);
    let mut store = builder.build();

    // both templates reach h1 only: one clone drawing both host items
    let report = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap();
    assert_eq!(report.created, 1);
    let clone = clone_on::<Graph>(&store, graph, h1).unwrap();
    assert_eq!(store.entity::<Graph>(clone).unwrap().items.len(), 2);

    store.link_template(t2, h2).unwrap();
    store.inherit_template_items(t2, h2).unwrap();
    let error = engine(&mut store).propagate::<Graph>(&ctx(), &[graph], None).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::InconsistentLinkage { name, .. } if name == "CPU and memory"
    ));
}

#[test]
fn test_sync_templates_limits_hosts() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link(template, h2);
    let graph = builder.graph("CPU load", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).sync_templates::<Graph>(&ctx(), &[template], &[h1]).unwrap();
    assert_eq!(report.created, 1);
    assert!(clone_on::<Graph>(&store, graph, h1).is_some());
    assert!(clone_on::<Graph>(&store, graph, h2).is_none());

    let error = engine(&mut store).sync_templates::<Graph>(&ctx(), &[h1], &[h2]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::InvalidEntity { kind: "host", .. }));
}

#[test]
fn test_propagate_restricted_to_hosts() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    builder.link(template, h1);
    builder.link(template, h2);
    let trigger = builder.trigger("CPU high", &[cpu]);
    let mut store = builder.build();

    let report = engine(&mut store).propagate::<Trigger>(&ctx(), &[trigger], Some(&[h2])).unwrap();
    assert_eq!(report.created, 1);
    assert!(clone_on::<Trigger>(&store, trigger, h2).is_some());
    assert!(clone_on::<Trigger>(&store, trigger, h1).is_none());
}
