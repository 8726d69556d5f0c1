//! Template link graph.
//!
//! Nodes are hosts and templates, edges point from a template to the host or
//! template that inherits it. The graph is acyclic; the store rejects links that
//! would close a cycle.

use crate::core::Result;
use crate::model::{Host, HostId, TemplateLink};
use crate::store::Catalog;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Snapshot of the template link graph with the hosts it mentions.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    graph: DiGraphMap<HostId, ()>,
    hosts: HashMap<HostId, Host>,
}

impl LinkGraph {
    /// Load every template link plus the hosts on both ends and in `involved`.
    pub fn load<C>(catalog: &C, involved: impl IntoIterator<Item = HostId>) -> Result<Self>
    where
        C: Catalog + ?Sized,
    {
        let links = catalog.template_links()?;
        let mut ids: BTreeSet<HostId> = involved.into_iter().collect();
        for link in &links {
            ids.insert(link.template_id);
            ids.insert(link.host_id);
        }
        let ids: Vec<HostId> = ids.into_iter().collect();
        let hosts = catalog.hosts(&ids)?;
        tracing::trace!("Loaded link graph with {} links over {} hosts", links.len(), hosts.len());
        Ok(Self::from_parts(hosts, links))
    }

    pub fn from_parts(
        hosts: impl IntoIterator<Item = Host>,
        links: impl IntoIterator<Item = TemplateLink>,
    ) -> Self {
        let mut graph = DiGraphMap::new();
        let hosts: HashMap<HostId, Host> = hosts.into_iter().map(|host| (host.id, host)).collect();
        for id in hosts.keys() {
            graph.add_node(*id);
        }
        for link in links {
            graph.add_edge(link.template_id, link.host_id, ());
        }
        Self {
            graph,
            hosts,
        }
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn is_template(&self, id: HostId) -> bool {
        self.hosts.get(&id).is_some_and(Host::is_template)
    }

    /// Whether the host receives propagated entities.
    pub fn is_eligible(&self, id: HostId) -> bool {
        self.hosts.get(&id).is_some_and(|host| host.flags.is_propagation_eligible())
    }

    /// Display name, falling back to the id for hosts outside the snapshot.
    pub fn name(&self, id: HostId) -> String {
        self.hosts.get(&id).map_or_else(|| id.to_string(), |host| host.name.clone())
    }

    /// Hosts and templates directly linked to `template`.
    pub fn children(&self, template: HostId) -> BTreeSet<HostId> {
        if !self.graph.contains_node(template) {
            return BTreeSet::new();
        }
        self.graph.neighbors_directed(template, Direction::Outgoing).collect()
    }

    /// Direct children of `template` that receive propagated entities.
    pub fn targets(&self, template: HostId) -> BTreeSet<HostId> {
        self.children(template).into_iter().filter(|host| self.is_eligible(*host)).collect()
    }

    /// Templates directly linked to `host`.
    pub fn parents(&self, host: HostId) -> BTreeSet<HostId> {
        if !self.graph.contains_node(host) {
            return BTreeSet::new();
        }
        self.graph.neighbors_directed(host, Direction::Incoming).collect()
    }

    /// Whether `host` inherits from `ancestor`, directly or through other templates.
    pub fn is_ancestor(&self, ancestor: HostId, host: HostId) -> bool {
        ancestor != host
            && self.graph.contains_node(ancestor)
            && self.graph.contains_node(host)
            && has_path_connecting(&self.graph, ancestor, host, None)
    }

    /// Every host and template that inherits from `template`, at any depth.
    pub fn descendants(&self, template: HostId) -> BTreeSet<HostId> {
        let mut found = BTreeSet::new();
        if !self.graph.contains_node(template) {
            return found;
        }
        let mut dfs = Dfs::new(&self.graph, template);
        while let Some(node) = dfs.next(&self.graph) {
            if node != template {
                found.insert(node);
            }
        }
        found
    }

    /// `hosts` together with everything below them.
    pub fn scope(&self, hosts: &BTreeSet<HostId>) -> BTreeSet<HostId> {
        let mut scope = hosts.clone();
        for host in hosts {
            scope.extend(self.descendants(*host));
        }
        scope
    }
}
