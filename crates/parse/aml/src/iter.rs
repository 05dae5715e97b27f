//! Read-only tree traversal.
//!
//! Pre-order here means bytestream order: a node, then its fixed
//! arguments by slot index, then its variable-argument list. That is
//! exactly the order the serializer emits, so walking `Linear` visits
//! nodes in the order their bytes appear in the table.

use crate::node::{AmlTree, NodeId};
use crate::AmlError;

/// Traversal bound of a [`TreeIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterMode {
    /// Full bytestream order over the whole tree, ascending out of and
    /// descending into subtrees freely.
    Linear,
    /// Bounded to the node the iterator was created on and its
    /// descendants; stepping outside that branch exhausts the iterator.
    Branch,
}

/// A cursor over tree nodes in bytestream order.
///
/// The iterator starts positioned on its creation node. [`next`] and
/// [`previous`] move the cursor and return the new position; once the
/// cursor leaves the traversal bound it stays exhausted.
///
/// [`next`]: TreeIterator::next
/// [`previous`]: TreeIterator::previous
pub struct TreeIterator<'a> {
    tree: &'a AmlTree,
    current: Option<NodeId>,
    bound: Option<NodeId>,
}

impl<'a> TreeIterator<'a> {
    /// Returns the node the cursor is on, if not exhausted.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Steps forward in pre-order and returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if the tree was structurally
    /// broken out from under the iterator's ids.
    pub fn next(&mut self) -> Result<Option<NodeId>, AmlError> {
        if let Some(id) = self.current {
            self.current = self.tree.preorder_next(id, self.bound)?;
        }
        Ok(self.current)
    }

    /// Steps backward in pre-order and returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if the tree was structurally
    /// broken out from under the iterator's ids.
    pub fn previous(&mut self) -> Result<Option<NodeId>, AmlError> {
        if let Some(id) = self.current {
            self.current = self.tree.preorder_previous(id, self.bound)?;
        }
        Ok(self.current)
    }
}

impl AmlTree {
    /// Creates a cursor positioned on `start`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] for a stale id.
    pub fn iterate(&self, start: NodeId, mode: IterMode) -> Result<TreeIterator<'_>, AmlError> {
        self.kind(start)?;
        Ok(TreeIterator {
            tree: self,
            current: Some(start),
            bound: match mode {
                IterMode::Linear => None,
                IterMode::Branch => Some(start),
            },
        })
    }

    /// Visits `start` and its subtree in pre-order, invoking `callback`
    /// per node. A `false` return halts the walk. Returns whether the
    /// walk ran to completion.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] for a stale id.
    pub fn enumerate<F>(&self, start: NodeId, callback: &mut F) -> Result<bool, AmlError>
    where
        F: FnMut(NodeId) -> bool,
    {
        if !callback(start) {
            return Ok(false);
        }
        let node = self.node(start)?;
        for child in node.fixed.iter().flatten().chain(&node.children) {
            if !self.enumerate(*child, callback)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn first_child(&self, id: NodeId) -> Result<Option<NodeId>, AmlError> {
        let node = self.node(id)?;
        Ok(node
            .fixed
            .iter()
            .flatten()
            .next()
            .or_else(|| node.children.first())
            .copied())
    }

    fn last_child(&self, id: NodeId) -> Result<Option<NodeId>, AmlError> {
        let node = self.node(id)?;
        Ok(node
            .children
            .last()
            .or_else(|| node.fixed.iter().flatten().last())
            .copied())
    }

    fn sibling_after(&self, parent: NodeId, id: NodeId) -> Result<Option<NodeId>, AmlError> {
        let node = self.node(parent)?;
        let mut found = false;
        for child in node
            .fixed
            .iter()
            .flatten()
            .copied()
            .chain(node.children.iter().copied())
        {
            if found {
                return Ok(Some(child));
            }
            found = child == id;
        }
        if found { Ok(None) } else { Err(AmlError::InvalidParameter) }
    }

    fn sibling_before(&self, parent: NodeId, id: NodeId) -> Result<Option<NodeId>, AmlError> {
        let node = self.node(parent)?;
        let mut previous = None;
        for child in node
            .fixed
            .iter()
            .flatten()
            .copied()
            .chain(node.children.iter().copied())
        {
            if child == id {
                return Ok(previous);
            }
            previous = Some(child);
        }
        Err(AmlError::InvalidParameter)
    }

    fn preorder_next(
        &self,
        id: NodeId,
        bound: Option<NodeId>,
    ) -> Result<Option<NodeId>, AmlError> {
        if let Some(child) = self.first_child(id)? {
            return Ok(Some(child));
        }
        let mut cursor = id;
        loop {
            if Some(cursor) == bound {
                return Ok(None);
            }
            let Some(parent) = self.parent(cursor)? else {
                return Ok(None);
            };
            if let Some(sibling) = self.sibling_after(parent, cursor)? {
                return Ok(Some(sibling));
            }
            cursor = parent;
        }
    }

    fn preorder_previous(
        &self,
        id: NodeId,
        bound: Option<NodeId>,
    ) -> Result<Option<NodeId>, AmlError> {
        if Some(id) == bound {
            return Ok(None);
        }
        let Some(parent) = self.parent(id)? else {
            return Ok(None);
        };
        match self.sibling_before(parent, id)? {
            Some(sibling) => {
                // Descend to the last node of the preceding subtree.
                let mut cursor = sibling;
                while let Some(last) = self.last_child(cursor)? {
                    cursor = last;
                }
                Ok(Some(cursor))
            }
            None => Ok(Some(parent)),
        }
    }
}
