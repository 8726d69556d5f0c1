//! Classification of each (template entity, target host) pair.
//!
//! For every pair the detector decides, in order:
//! 1. a clone of the source already lives on the host: update it in place
//! 2. an entity with the same name lives on the host: adopt it when it is an
//!    authored entity identical to the incoming one, reject otherwise
//! 3. nothing matches: create a new clone
//!
//! All lookups are answered from data fetched up front for the whole level.

use super::item_resolver::Resolved;
use super::link_graph::LinkGraph;
use super::membership::Membership;
use crate::core::{CollisionReason, Result, SyncError};
use crate::model::{Entity, EntityId, EntityKind, HostId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// What to do for one (source, host) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition<K: EntityKind> {
    /// Refresh this existing clone.
    Update(Entity<K>),
    /// Turn this authored entity into a clone.
    Adopt(Entity<K>),
    /// Insert a new clone.
    Create,
}

/// Conflict detection over the clones and same-name entities of one level.
#[derive(Debug)]
pub struct ConflictDetector<K: EntityKind> {
    clones: HashMap<(EntityId, HostId), Entity<K>>,
    named: HashMap<(String, HostId), Vec<Entity<K>>>,
    renamed: HashSet<EntityId>,
    adopt_identical: bool,
}

impl<K: EntityKind> ConflictDetector<K> {
    /// Index `clones` by (origin, host) and `named` by (name, host).
    ///
    /// `membership` must know the items of every entity passed in.
    pub fn new(
        clones: Vec<Entity<K>>,
        named: Vec<Entity<K>>,
        membership: &Membership,
        adopt_identical: bool,
    ) -> Self {
        let mut by_origin = HashMap::new();
        for clone in clones {
            let Some(origin) = clone.origin_id else {
                continue;
            };
            for host in membership.hosts_of(&clone) {
                by_origin.insert((origin, host), clone.clone());
            }
        }

        let mut by_name: HashMap<(String, HostId), Vec<Entity<K>>> = HashMap::new();
        for entity in named {
            for host in membership.hosts_of(&entity) {
                by_name.entry((entity.name.clone(), host)).or_default().push(entity.clone());
            }
        }

        Self {
            clones: by_origin,
            named: by_name,
            renamed: HashSet::new(),
            adopt_identical,
        }
    }

    /// Register the sources of the level.
    ///
    /// A clone whose source now carries another name is leaving its current name,
    /// so it no longer occupies that name on its host.
    #[must_use]
    pub fn with_sources(mut self, sources: &[&Entity<K>]) -> Self {
        let names: HashMap<EntityId, &str> =
            sources.iter().map(|source| (source.id, source.name.as_str())).collect();
        self.renamed = self
            .clones
            .values()
            .filter(|clone| {
                clone
                    .origin_id
                    .and_then(|origin| names.get(&origin))
                    .is_some_and(|name| clone.name.as_str() != *name)
            })
            .map(|clone| clone.id)
            .collect();
        self
    }

    /// Reject batches where two sources would land on one host under one name.
    pub fn check_batch(
        &self,
        planned: &[(&Entity<K>, &BTreeSet<HostId>)],
        links: &LinkGraph,
    ) -> Result<()> {
        let mut seen: HashMap<(&str, HostId), EntityId> = HashMap::new();
        for (source, targets) in planned {
            for host in targets.iter() {
                match seen.get(&(source.name.as_str(), *host)) {
                    Some(other) if *other != source.id => {
                        return Err(SyncError::NameCollision {
                            kind: K::LABEL,
                            name: source.name.clone(),
                            host: links.name(*host),
                            reason: CollisionReason::DuplicateInBatch,
                        }
                        .into());
                    }
                    _ => {
                        seen.insert((source.name.as_str(), *host), source.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Decide how `source` materializes on `host`.
    pub fn classify(
        &self,
        source: &Entity<K>,
        host: HostId,
        resolved: &Resolved<K>,
        links: &LinkGraph,
    ) -> Result<Disposition<K>> {
        if let Some(existing) = self.clones.get(&(source.id, host)) {
            if existing.name != source.name
                && self.same_name(&source.name, host).any(|other| other.id != existing.id)
            {
                return Err(SyncError::RenameCollision {
                    kind: K::LABEL,
                    from: existing.name.clone(),
                    to: source.name.clone(),
                    host: links.name(host),
                }
                .into());
            }
            return Ok(Disposition::Update(existing.clone()));
        }

        let Some(candidate) = self.same_name(&source.name, host).next() else {
            return Ok(Disposition::Create);
        };

        let collision = |reason: CollisionReason| -> Result<Disposition<K>> {
            Err(SyncError::NameCollision {
                kind: K::LABEL,
                name: source.name.clone(),
                host: links.name(host),
                reason,
            }
            .into())
        };

        if candidate.is_clone() {
            return collision(CollisionReason::InheritedFromAnotherTemplate);
        }
        if !self.adopt_identical {
            return collision(CollisionReason::AlreadyExists);
        }
        if candidate.flags != source.flags {
            return collision(CollisionReason::FlagsDiffer);
        }
        if candidate.item_ids() != resolved.item_ids() {
            return collision(CollisionReason::ItemsNotIdentical);
        }
        if !K::same_definition(&candidate.header, &resolved.header) {
            return collision(CollisionReason::StructureNotIdentical);
        }

        tracing::debug!(
            "Adopting {} \"{}\" ({}) on {} as clone of {}",
            K::LABEL,
            candidate.name,
            candidate.id,
            links.name(host),
            source.id
        );
        Ok(Disposition::Adopt(candidate.clone()))
    }

    fn same_name(&self, name: &str, host: HostId) -> impl Iterator<Item = &Entity<K>> {
        self.named
            .get(&(name.to_string(), host))
            .into_iter()
            .flatten()
            .filter(|entity| !self.renamed.contains(&entity.id))
    }
}
