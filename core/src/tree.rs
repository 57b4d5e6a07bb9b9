//! Account tree: validated, immutable index over the chart of accounts.
//!
//! Nodes live in an arena sorted by account code; parent and child links are
//! arena indices. Depth is computed once at construction (roots are depth 0),
//! so depth and ancestor queries never re-walk the input.
//!
//! RULE: a tree is a snapshot. Nothing mutates it after `build()`; a run that
//! needs different accounts builds a new tree.

use crate::{
    error::{AllocError, AllocResult},
    types::AccountCode,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: AccountCode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<AccountCode>,
}

impl Account {
    pub fn new(code: &str, name: &str, parent_code: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            parent_code: parent_code.map(str::to_string),
        }
    }

    pub fn root(code: &str, name: &str) -> Self {
        Self::new(code, name, None)
    }
}

#[derive(Debug, Clone)]
struct Node {
    account: Account,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Account>", into = "Vec<Account>")]
pub struct AccountTree {
    nodes: Vec<Node>,
    index: HashMap<AccountCode, usize>,
    height: u32,
}

impl AccountTree {
    /// Build and validate a tree.
    ///
    /// Fails on the first duplicate code, dangling parent reference or
    /// cycle. Use `validate::validate_accounts` for a complete report.
    pub fn build(mut accounts: Vec<Account>) -> AllocResult<Self> {
        accounts.sort_by(|a, b| a.code.cmp(&b.code));

        let mut index = HashMap::with_capacity(accounts.len());
        for (i, account) in accounts.iter().enumerate() {
            if index.insert(account.code.clone(), i).is_some() {
                return Err(AllocError::DuplicateAccount {
                    code: account.code.clone(),
                });
            }
        }

        let mut nodes = Vec::with_capacity(accounts.len());
        for account in accounts {
            let parent = match account.parent_code.as_deref() {
                None => None,
                Some(p) => match index.get(p) {
                    Some(&i) => Some(i),
                    None => {
                        return Err(AllocError::DanglingParent {
                            parent: p.to_string(),
                            code: account.code,
                        })
                    }
                },
            };
            nodes.push(Node {
                account,
                parent,
                children: Vec::new(),
                depth: 0,
            });
        }

        let depths = compute_depths(&nodes)?;
        let mut height = 0;
        for (i, depth) in depths.into_iter().enumerate() {
            nodes[i].depth = depth;
            height = height.max(depth);
        }

        // Arena is code-sorted, so pushing in index order keeps children sorted.
        for i in 0..nodes.len() {
            if let Some(p) = nodes[i].parent {
                nodes[p].children.push(i);
            }
        }

        Ok(Self {
            nodes,
            index,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn account(&self, code: &str) -> Option<&Account> {
        self.node(code).map(|n| &n.account)
    }

    /// All accounts in ascending code order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.nodes.iter().map(|n| &n.account)
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| n.account.code.as_str())
    }

    pub fn parent_of(&self, code: &str) -> Option<&str> {
        let parent = self.node(code)?.parent?;
        Some(self.nodes[parent].account.code.as_str())
    }

    /// Direct children in ascending code order. Unknown codes have none.
    pub fn children_of(&self, code: &str) -> impl Iterator<Item = &str> {
        self.node(code)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| self.nodes[i].account.code.as_str())
    }

    pub fn is_child(&self, parent: &str, child: &str) -> bool {
        self.parent_of(child) == Some(parent)
    }

    pub fn is_leaf(&self, code: &str) -> bool {
        self.node(code).is_some_and(|n| n.children.is_empty())
    }

    pub fn depth(&self, code: &str) -> Option<u32> {
        self.node(code).map(|n| n.depth)
    }

    /// Maximum depth over all accounts (0 for a forest of roots).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when `a` lies strictly below `b`.
    pub fn is_descendant(&self, a: &str, b: &str) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        let target_depth = self.nodes[ib].depth;
        if self.nodes[ia].depth <= target_depth {
            return false;
        }
        let mut cur = ia;
        while self.nodes[cur].depth > target_depth {
            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
        cur == ib
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self, code: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cur = self.index.get(code).and_then(|&i| self.nodes[i].parent);
        while let Some(i) = cur {
            out.push(self.nodes[i].account.code.as_str());
            cur = self.nodes[i].parent;
        }
        out
    }

    /// Codes from the root down to `code` inclusive. Empty for unknown codes.
    pub fn path(&self, code: &str) -> Vec<&str> {
        let Some(node) = self.node(code) else {
            return Vec::new();
        };
        let mut path = self.ancestors(code);
        path.reverse();
        path.push(node.account.code.as_str());
        path
    }

    fn node(&self, code: &str) -> Option<&Node> {
        self.index.get(code).map(|&i| &self.nodes[i])
    }
}

/// Depth of every node. A walk that does not reach a root or an
/// already-resolved node within `nodes.len()` steps is a cycle.
fn compute_depths(nodes: &[Node]) -> AllocResult<Vec<u32>> {
    let mut depths: Vec<Option<u32>> = vec![None; nodes.len()];
    let mut walked_by: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut chain = Vec::new();

    for start in 0..nodes.len() {
        if depths[start].is_some() {
            continue;
        }
        chain.clear();
        let mut cur = start;
        let base = loop {
            if let Some(d) = depths[cur] {
                break Some(d);
            }
            if chain.len() > nodes.len() || walked_by[cur] == Some(start) {
                return Err(AllocError::Cycle {
                    code: nodes[start].account.code.clone(),
                });
            }
            walked_by[cur] = Some(start);
            chain.push(cur);
            match nodes[cur].parent {
                Some(p) => cur = p,
                None => break None,
            }
        };

        // chain runs from `start` upwards; resolve it top-down.
        let mut depth = base.map(|d| d + 1).unwrap_or(0);
        for &i in chain.iter().rev() {
            depths[i] = Some(depth);
            depth += 1;
        }
    }

    Ok(depths.into_iter().map(|d| d.unwrap_or(0)).collect())
}

impl TryFrom<Vec<Account>> for AccountTree {
    type Error = AllocError;

    fn try_from(accounts: Vec<Account>) -> AllocResult<Self> {
        AccountTree::build(accounts)
    }
}

impl From<AccountTree> for Vec<Account> {
    fn from(tree: AccountTree) -> Self {
        tree.nodes.into_iter().map(|n| n.account).collect()
    }
}
