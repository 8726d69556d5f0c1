//! Trigger dependency consistency and inheritance.

use crate::{ctx, draft_of, engine, sync_error};
use tplsync::core::SyncError;
use tplsync::dependency::TriggerChange;
use tplsync::model::{EntityDraft, SubItem, Trigger, TriggerFunction, TriggerHeader};
use tplsync::test_utils::{StoreBuilder, clone_on};

#[test]
fn test_moving_dependent_trigger_away_is_unsatisfiable() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let a = builder.item(h1, "a");
    let b = builder.item(h1, "b");
    let c = builder.item(h2, "c");
    let up = builder.trigger("Tr_up", &[a]);
    let down = builder.trigger("Tr_down", &[b]);
    builder.depend(down, up);
    let mut store = builder.build();

    let error = engine(&mut store)
        .check_dependency_consistency(&ctx(), &[TriggerChange::items(down, vec![c])])
        .unwrap_err();
    match sync_error(&error) {
        SyncError::DependencyUnsatisfiable {
            trigger,
            trigger_up,
        } => {
            assert_eq!(trigger, "Tr_down");
            assert_eq!(trigger_up, "Tr_up");
        }
        other => panic!("unexpected error: {other}"),
    }

    // the same edit through update is rejected before anything is written
    let mut draft = draft_of::<Trigger>(&store, down);
    draft.items = vec![SubItem::new(c, 0, TriggerFunction::new("last", ""))];
    let error = engine(&mut store).update(&ctx(), vec![draft]).unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::DependencyUnsatisfiable { .. }));
    assert_eq!(store.entity::<Trigger>(down).unwrap().item_ids(), vec![b]);
    assert_eq!(store.take_writes().total(), 0);

    // moving the trigger depended upon along with it keeps the edge valid
    let plan = engine(&mut store)
        .check_dependency_consistency(
            &ctx(),
            &[TriggerChange::items(down, vec![c]), TriggerChange::items(up, vec![c])],
        )
        .unwrap();
    assert!(plan.is_empty());
}

#[test]
fn test_reverse_edge_is_a_cycle() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let x = builder.item(h1, "x");
    let a = builder.trigger("A", &[x]);
    let b = builder.trigger("B", &[x]);
    builder.depend(a, b);
    let mut store = builder.build();

    let error = engine(&mut store)
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(b, vec![a])])
        .unwrap_err();
    match sync_error(&error) {
        SyncError::DependencyCycle {
            trigger,
            trigger_up,
            chain,
        } => {
            assert_eq!(trigger, "B");
            assert_eq!(trigger_up, "A");
            assert_eq!(chain, "B -> A -> B");
        }
        other => panic!("unexpected error: {other}"),
    }

    let draft = draft_of::<Trigger>(&store, b).with_dependencies(vec![a]);
    assert!(engine(&mut store).update(&ctx(), vec![draft]).is_err());
    assert_eq!(store.dependency_edges().len(), 1);
}

#[test]
fn test_transitive_cycle_reports_chain() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let x = builder.item(h1, "x");
    let a = builder.trigger("A", &[x]);
    let b = builder.trigger("B", &[x]);
    let c = builder.trigger("C", &[x]);
    builder.depend(a, b);
    builder.depend(b, c);
    let mut store = builder.build();

    let error = engine(&mut store)
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(c, vec![a])])
        .unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::DependencyCycle { chain, .. } if chain == "C -> A -> B -> C"
    ));
}

#[test]
fn test_duplicate_and_unknown_dependencies() {
    let mut builder = StoreBuilder::new();
    let h1 = builder.host("h1");
    let x = builder.item(h1, "x");
    let a = builder.trigger("A", &[x]);
    let b = builder.trigger("B", &[x]);
    let mut store = builder.build();

    let error = engine(&mut store)
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(a, vec![b, b])])
        .unwrap_err();
    assert!(matches!(sync_error(&error), SyncError::DuplicateDependency { .. }));

    let draft = EntityDraft::<Trigger>::new(
        "C",
        TriggerHeader::new("{0}>0"),
        vec![SubItem::new(x, 0, TriggerFunction::new("last", ""))],
    )
    .with_dependencies(vec![tplsync::model::EntityId(999)]);
    let error = engine(&mut store).create(&ctx(), vec![draft]).unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::EntityNotFound {
            kind: "trigger",
            id: 999
        }
    ));
    assert_eq!(store.all_entities::<Trigger>().len(), 2);
}

#[test]
fn test_parent_and_child_template_scope() {
    let mut builder = StoreBuilder::new();
    let base = builder.template("Template Base");
    let os = builder.template("Template OS");
    let base_item = builder.item(base, "base");
    builder.link(base, os);
    let os_item = builder.item(os, "os");
    let on_base = builder.trigger("Base check", &[base_item]);
    let on_os = builder.trigger("OS check", &[os_item]);
    let mut store = builder.build();
    let engine = engine(&mut store);

    let error = engine
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(on_os, vec![on_base])])
        .unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::DependencyScopeViolation { reason, .. } if reason.contains("parent template")
    ));

    let error = engine
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(on_base, vec![on_os])])
        .unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::DependencyScopeViolation { reason, .. } if reason.contains("child template")
    ));
}

#[test]
fn test_cross_template_dependency_needs_shared_links() {
    let mut builder = StoreBuilder::new();
    let ta = builder.template("Template A");
    let tb = builder.template("Template B");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let a = builder.item(ta, "a");
    let b = builder.item(tb, "b");
    builder.link(ta, h1);
    builder.link(tb, h1);
    builder.link(tb, h2);
    let on_a = builder.trigger("A check", &[a]);
    let on_b = builder.trigger("B check", &[b]);
    let mut store = builder.build();
    let engine = engine(&mut store);

    // every host of template A also inherits template B
    let plan = engine
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(on_a, vec![on_b])])
        .unwrap();
    assert_eq!(plan.insert, vec![(on_a, on_b)]);

    // h2 inherits B without A
    let error = engine
        .check_dependency_consistency(&ctx(), &[TriggerChange::dependencies(on_b, vec![on_a])])
        .unwrap_err();
    assert!(matches!(
        sync_error(&error),
        SyncError::DependencyScopeViolation { reason, .. } if reason.contains("\"h2\"")
    ));
}

#[test]
fn test_created_dependency_is_mirrored_on_clones() {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    builder.link(template, h2);
    let up = builder.trigger("Memory high", &[mem]);
    builder.propagate_all();
    let mut store = builder.build();

    let draft = EntityDraft::<Trigger>::new(
        "CPU high",
        TriggerHeader::new("{0}>0"),
        vec![SubItem::new(cpu, 0, TriggerFunction::new("last", ""))],
    )
    .with_dependencies(vec![up]);
    let applied = engine(&mut store).create(&ctx(), vec![draft]).unwrap();
    let down = applied.ids[0];
    assert_eq!(applied.report.created, 3);
    assert_eq!(applied.report.dependencies.inserted, 3);

    for host in [h1, h2] {
        let down_clone = clone_on::<Trigger>(&store, down, host).unwrap();
        let up_clone = clone_on::<Trigger>(&store, up, host).unwrap();
        assert!(
            store
                .dependency_edges()
                .iter()
                .any(|edge| edge.trigger_down == down_clone && edge.trigger_up == up_clone)
        );
    }

    // dropping the dependency on the template drops it everywhere
    let draft = draft_of::<Trigger>(&store, down).with_dependencies(Vec::new());
    let applied = engine(&mut store).update(&ctx(), vec![draft]).unwrap();
    assert_eq!(applied.report.dependencies.deleted, 3);
    assert!(store.dependency_edges().is_empty());
}

#[test]
fn test_sync_inherits_template_dependencies() {
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
    let mut store = builder.build();

    let report = engine(&mut store).sync_templates::<Trigger>(&ctx(), &[template], &[h1]).unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.dependencies.inserted, 1);
    assert_eq!(store.dependency_edges().len(), 2);
    assert!(clone_on::<Trigger>(&store, down, h2).is_none());

    let report = engine(&mut store).sync_templates::<Trigger>(&ctx(), &[template], &[h1]).unwrap();
    assert!(report.is_noop());
}
