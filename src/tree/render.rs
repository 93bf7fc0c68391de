//! Text and Graphviz renderings of the tree.

use std::fmt;
use std::path::Path;

use super::{NodeId, TriggerTree};
use crate::error::TriggerTreeResult;

impl<A> TriggerTree<A> {
    /// One line per node, children indented two spaces below their parent,
    /// each followed by the number of triggers it reports. Nodes with several
    /// parents appear once per parent.
    #[must_use]
    pub fn tree_to_string(&self, indent: usize) -> String {
        Outline { tree: self, indent }.to_string()
    }

    /// Graphviz description of the node graph.
    #[must_use]
    pub fn to_dot(&self) -> String {
        Dot { tree: self }.to_string()
    }

    /// Writes [`TriggerTree::to_dot`] to `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn write_dot(&self, path: impl AsRef<Path>) -> TriggerTreeResult<()> {
        std::fs::write(path, self.to_dot())?;
        Ok(())
    }

    fn reachable_sorted(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.reachable().into_iter().collect();
        ids.sort_unstable();
        ids
    }
}

struct Outline<'a, A> {
    tree: &'a TriggerTree<A>,
    indent: usize,
}

impl<A> Outline<'_, A> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        let node = &self.tree.nodes[id.0];
        writeln!(f, "{:indent$}{} [{}]", "", node.clause, node.triggers.len())?;
        for child in &node.specializations {
            self.write_node(f, *child, indent + 2)?;
        }
        Ok(())
    }
}

impl<A> fmt::Display for Outline<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.tree.root, self.indent)
    }
}

struct Dot<'a, A> {
    tree: &'a TriggerTree<A>,
}

impl<A> fmt::Display for Dot<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strict digraph TriggerTree {{")?;
        let ids = self.tree.reachable_sorted();
        for id in &ids {
            let node = &self.tree.nodes[id.0];
            let label = node.clause.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            writeln!(f, "  {id} [label=\"{label} [{}]\"];", node.triggers.len())?;
        }
        for id in &ids {
            for child in &self.tree.nodes[id.0].specializations {
                writeln!(f, "  {id} -> {child};")?;
            }
        }
        writeln!(f, "}}")
    }
}
