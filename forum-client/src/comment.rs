use std::collections::{hash_map, HashMap};

use crate::api::{Comment, CommentId, Time};

/// Handle of a node inside a `CommentForest`
///
/// Nodes are stored by increasing `(created_at, id)`, and a parent always has a
/// smaller handle than its children.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeIdx(usize);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    pub parent: Option<NodeIdx>,

    /// Replies, by increasing `(created_at, id)`
    children: Vec<NodeIdx>,
}

impl CommentNode {
    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }
}

/// The reply-trees of a post, rebuilt from scratch on every fetch
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentForest {
    nodes: Vec<CommentNode>,
    roots: Vec<NodeIdx>,
    by_id: HashMap<CommentId, NodeIdx>,
}

impl CommentForest {
    /// Builds the forest from a flat list of comments, in any order
    ///
    /// Never fails. A comment whose parent is missing from the list, or does
    /// not sort strictly before it (self- or forward-reference), is made a
    /// root. When an id appears several times, the last occurrence's data is
    /// kept at the position of the first occurrence.
    pub fn build(comments: impl IntoIterator<Item = Comment>) -> CommentForest {
        let mut slot_of: HashMap<CommentId, usize> = HashMap::new();
        let mut unique: Vec<((Time, CommentId), Comment)> = Vec::new();
        for c in comments {
            match slot_of.entry(c.id) {
                hash_map::Entry::Occupied(slot) => {
                    tracing::warn!(id = ?c.id, "duplicate comment id in fetched list");
                    unique[*slot.get()].1 = c;
                }
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(unique.len());
                    unique.push(((c.created_at, c.id), c));
                }
            }
        }

        unique.sort_by_key(|(key, _)| *key);
        let by_id = unique
            .iter()
            .enumerate()
            .map(|(i, (_, c))| (c.id, NodeIdx(i)))
            .collect::<HashMap<_, _>>();
        let mut nodes = unique
            .into_iter()
            .map(|(_, comment)| CommentNode {
                comment,
                parent: None,
                children: Vec::new(),
            })
            .collect::<Vec<_>>();

        let mut roots = Vec::new();
        for i in 0..nodes.len() {
            let this = NodeIdx(i);
            let parent_id = nodes[i].comment.parent_comment_id;
            match parent_id.and_then(|p| by_id.get(&p).copied()) {
                Some(parent) if parent < this => {
                    nodes[i].parent = Some(parent);
                    nodes[parent.0].children.push(this);
                }
                Some(_) => {
                    tracing::warn!(
                        id = ?nodes[i].comment.id,
                        parent = ?parent_id,
                        "comment replies to itself or to a later comment, showing it as top-level"
                    );
                    roots.push(this);
                }
                None => {
                    if parent_id.is_some() {
                        tracing::warn!(
                            id = ?nodes[i].comment.id,
                            parent = ?parent_id,
                            "parent comment not fetched, showing reply as top-level"
                        );
                    }
                    roots.push(this);
                }
            }
        }

        tracing::debug!(
            num_comments = nodes.len(),
            num_roots = roots.len(),
            "built comment forest"
        );
        CommentForest {
            nodes,
            roots,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn node(&self, idx: NodeIdx) -> &CommentNode {
        &self.nodes[idx.0]
    }

    pub fn get(&self, id: CommentId) -> Option<&CommentNode> {
        self.by_id.get(&id).map(|idx| self.node(*idx))
    }

    pub fn roots(&self) -> impl Iterator<Item = &CommentNode> {
        self.roots.iter().map(|idx| self.node(*idx))
    }

    pub fn children<'a>(
        &'a self,
        node: &'a CommentNode,
    ) -> impl Iterator<Item = &'a CommentNode> + 'a {
        node.children.iter().map(|idx| self.node(*idx))
    }

    /// Number of replies below `id`, at any depth
    pub fn reply_count(&self, id: CommentId) -> usize {
        match self.by_id.get(&id) {
            None => 0,
            Some(idx) => {
                let mut count = 0;
                let mut stack = self.node(*idx).children.clone();
                while let Some(idx) = stack.pop() {
                    count += 1;
                    stack.extend_from_slice(&self.node(idx).children);
                }
                count
            }
        }
    }

    /// Depth-first, pre-order traversal of every node along with its depth
    pub fn walk(&self) -> Walk<'_, fn(&Comment) -> bool> {
        fn always(_: &Comment) -> bool {
            true
        }
        self.walk_where(always as fn(&Comment) -> bool)
    }

    /// Like `walk`, but only descends into the replies of the comments for
    /// which `descend` returns true
    pub fn walk_where<F>(&self, descend: F) -> Walk<'_, F>
    where
        F: FnMut(&Comment) -> bool,
    {
        Walk {
            forest: self,
            stack: self.roots.iter().rev().map(|idx| (0, *idx)).collect(),
            descend,
        }
    }
}

pub struct Walk<'a, F> {
    forest: &'a CommentForest,
    stack: Vec<(usize, NodeIdx)>,
    descend: F,
}

impl<'a, F> Iterator for Walk<'a, F>
where
    F: FnMut(&Comment) -> bool,
{
    type Item = (usize, &'a CommentNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, idx) = self.stack.pop()?;
        let node = self.forest.node(idx);
        if (self.descend)(&node.comment) {
            let children = node.children.iter().rev().map(|c| (depth + 1, *c));
            self.stack.extend(children);
        }
        Some((depth, node))
    }
}
