use std::{
    collections::{BTreeSet, HashMap},
    fmt::Write as _,
    sync::Arc,
};

use crate::{
    foundation::error::{AvaError, AvaResult},
    graph::node::{FrameStream, Node},
    model::{GraphDesc, parse_kind},
};

/// A built graph: every node in definition order, the last one being the root.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Arc<Node>>,
    by_name: HashMap<String, usize>,
}

impl Graph {
    pub fn root(&self) -> &Arc<Node> {
        // `build_graph` never produces an empty graph.
        &self.nodes[self.nodes.len() - 1]
    }

    /// Stream length of the root, i.e. the number of output frames.
    pub fn len(&self) -> u64 {
        self.root().stream_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Node>> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.iter()
    }
}

/// Build the DAG from descriptions in definition order.
///
/// Inputs must name nodes defined earlier in the list, so the result is acyclic by
/// construction. The last description becomes the root.
#[tracing::instrument(level = "debug", skip(desc), fields(nodes = desc.nodes.len()))]
pub fn build_graph(desc: &GraphDesc) -> AvaResult<Graph> {
    if desc.is_empty() {
        return Err(AvaError::config("graph description has no nodes"));
    }

    let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(desc.nodes.len());
    let mut by_name = HashMap::with_capacity(desc.nodes.len());

    for d in &desc.nodes {
        if d.name.trim().is_empty() {
            return Err(AvaError::config("node name must be non-empty"));
        }
        if by_name.contains_key(&d.name) {
            return Err(AvaError::config(format!("duplicate node name '{}'", d.name)));
        }

        let spec = parse_kind(d)?;
        let inputs = d
            .input_names()
            .iter()
            .map(|input| {
                by_name
                    .get(input)
                    .map(|&i: &usize| nodes[i].clone())
                    .ok_or_else(|| {
                        AvaError::config(format!(
                            "node '{}' references '{input}', which is not defined before it",
                            d.name
                        ))
                    })
            })
            .collect::<AvaResult<Vec<_>>>()?;

        let node = Node::new(d.name.clone(), spec, inputs)?;
        tracing::trace!(
            node = %d.name,
            kind = node.type_name(),
            len = node.stream_len(),
            "built node"
        );
        by_name.insert(d.name.clone(), nodes.len());
        nodes.push(Arc::new(node));
    }

    Ok(Graph { nodes, by_name })
}

/// Graphviz rendering of everything reachable from the root.
pub fn to_dot(graph: &Graph) -> String {
    let mut out = String::from("digraph G {\n");
    let mut visited = BTreeSet::new();
    let mut stack = vec![graph.root().clone()];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.name().to_string()) {
            continue;
        }
        for input in node.inputs() {
            let _ = writeln!(
                out,
                "  {} -> {};",
                dot_id(input.name()),
                dot_id(node.name())
            );
            stack.push(input.clone());
        }
    }

    out.push_str("}\n");
    out
}

fn dot_id(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}
