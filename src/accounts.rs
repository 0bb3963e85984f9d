use crate::utils::format_amount;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Root-to-node label segments. This is the identity of an account; bare
/// labels repeat across sections and are only a secondary lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountPath(Vec<String>);

impl AccountPath {
    pub fn root(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, label: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(label.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, including any occurrence suffix.
    pub fn leaf_label(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" > "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub path: AccountPath,
    pub raw_label: String,
    /// Label with its numbering marker removed.
    pub clean_label: String,
    pub level: usize,
    pub row_index: Option<usize>,
    /// Column index -> numeric cell that fed `total_value`.
    pub contributions: BTreeMap<usize, f64>,
    pub total_value: f64,
    pub is_numeric: bool,
    pub used_subtotal: bool,
    pub subtotal_value: Option<f64>,
    pub parent: Option<AccountPath>,
    pub children: Vec<AccountPath>,
}

impl AccountNode {
    /// A non-numeric node with no source row, for hand-built trees.
    pub fn new(path: AccountPath, level: usize) -> Self {
        let label = path.leaf_label().to_string();
        Self {
            path,
            raw_label: label.clone(),
            clean_label: label,
            level,
            row_index: None,
            contributions: BTreeMap::new(),
            total_value: 0.0,
            is_numeric: false,
            used_subtotal: false,
            subtotal_value: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.total_value = value;
        self.is_numeric = true;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_value(&self) -> bool {
        self.is_numeric && self.total_value != 0.0
    }

    fn kind_tag(&self) -> &'static str {
        if self.is_leaf() {
            "[LEAF]"
        } else if self.has_value() {
            "[PARENT+VALUE]"
        } else {
            "[PARENT]"
        }
    }
}

/// Accounts in source order, indexed by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AccountNode>", into = "Vec<AccountNode>")]
pub struct HierarchyTree {
    nodes: Vec<AccountNode>,
    index: HashMap<AccountPath, usize>,
}

impl From<Vec<AccountNode>> for HierarchyTree {
    fn from(nodes: Vec<AccountNode>) -> Self {
        let mut tree = HierarchyTree::new();
        for node in nodes {
            tree.insert(node);
        }
        tree
    }
}

impl From<HierarchyTree> for Vec<AccountNode> {
    fn from(tree: HierarchyTree) -> Self {
        tree.nodes
    }
}

impl HierarchyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node, replacing (in place) any node already stored under the same path.
    pub fn insert(&mut self, node: AccountNode) -> Option<AccountNode> {
        match self.index.get(&node.path) {
            Some(&idx) => Some(std::mem::replace(&mut self.nodes[idx], node)),
            None => {
                self.index.insert(node.path.clone(), self.nodes.len());
                self.nodes.push(node);
                None
            }
        }
    }

    pub fn get(&self, path: &AccountPath) -> Option<&AccountNode> {
        self.index.get(path).map(|&idx| &self.nodes[idx])
    }

    pub fn get_mut(&mut self, path: &AccountPath) -> Option<&mut AccountNode> {
        match self.index.get(path) {
            Some(&idx) => Some(&mut self.nodes[idx]),
            None => None,
        }
    }

    pub fn contains(&self, path: &AccountPath) -> bool {
        self.index.contains_key(path)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AccountNode> {
        self.nodes.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &AccountPath> {
        self.nodes.iter().map(|n| &n.path)
    }

    pub fn roots(&self) -> impl Iterator<Item = &AccountNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    pub fn leaves(&self) -> impl Iterator<Item = &AccountNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Children that exist in the tree; dangling child paths are skipped.
    pub fn children_of<'a>(&'a self, node: &'a AccountNode) -> impl Iterator<Item = &'a AccountNode> {
        node.children.iter().filter_map(move |p| self.get(p))
    }

    /// First node in source order whose cleaned or raw label equals `label`.
    /// Labels are not unique; use [`HierarchyTree::find_all_by_label`] when
    /// every occurrence matters.
    pub fn find_by_label(&self, label: &str) -> Option<&AccountNode> {
        self.find_all_by_label(label).into_iter().next()
    }

    pub fn find_all_by_label(&self, label: &str) -> Vec<&AccountNode> {
        let wanted = label.trim();
        self.nodes
            .iter()
            .filter(|n| n.clean_label == wanted || n.raw_label.trim() == wanted)
            .collect()
    }

    /// Path for a new node labelled `label` under `parent`; a repeated sibling
    /// label gets an occurrence suffix (`其他 [2]`).
    pub fn unique_child_path(&self, parent: Option<&AccountPath>, label: &str) -> AccountPath {
        let make = |segment: String| match parent {
            Some(p) => p.child(segment),
            None => AccountPath::root(segment),
        };

        let candidate = make(label.to_string());
        if !self.contains(&candidate) {
            return candidate;
        }

        let mut occurrence = 2;
        loop {
            let candidate = make(format!("{} [{}]", label, occurrence));
            if !self.contains(&candidate) {
                return candidate;
            }
            occurrence += 1;
        }
    }

    /// Records `child` under `parent`. Returns false if either is missing.
    pub fn link(&mut self, parent: &AccountPath, child: &AccountPath) -> bool {
        if !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent.clone());
        }
        if let Some(node) = self.get_mut(parent) {
            if !node.children.contains(child) {
                node.children.push(child.clone());
            }
        }
        true
    }

    /// Indented text tree with value and kind tags. Nodes reached twice
    /// (cycles, shared children) are printed once and then referenced.
    pub fn render_tree(&self) -> String {
        let mut output = String::new();
        let mut shown: HashSet<&AccountPath> = HashSet::new();

        let mut starts: Vec<&AccountNode> = self.roots().collect();
        // Cyclic input can have no roots at all.
        starts.extend(self.nodes.iter().filter(|n| n.parent.is_some()));

        for start in starts {
            if shown.contains(&start.path) {
                continue;
            }

            let mut stack: Vec<(&AccountNode, usize)> = vec![(start, 0)];
            while let Some((node, depth)) = stack.pop() {
                let indent = "  ".repeat(depth);
                if !shown.insert(&node.path) {
                    output.push_str(&format!("{}{} (see above)\n", indent, node.clean_label));
                    continue;
                }

                let value = if node.is_numeric {
                    format_amount(node.total_value)
                } else {
                    "-".to_string()
                };
                output.push_str(&format!(
                    "{}{}: {} {}\n",
                    indent,
                    node.clean_label,
                    value,
                    node.kind_tag()
                ));

                let children: Vec<&AccountNode> = self.children_of(node).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }

        output
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
