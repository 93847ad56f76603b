use crate::error::{DataMapperError, Result};
use std::fmt;

/// A join along a dot-separated association path, e.g. `"pets.owner"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    path: Vec<String>,
    alias: Option<String>,
    outer: bool,
}

impl Join {
    pub fn new(path: &str, alias: Option<&str>, outer: bool) -> Self {
        Join {
            path: path.split('.').map(str::to_string).collect(),
            alias: alias.map(str::to_string),
            outer,
        }
    }

    pub fn name(&self) -> String {
        self.path.join(".")
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Association joined at the end of the path.
    pub fn association(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_outer(&self) -> bool {
        self.outer
    }

    fn parent_names(&self) -> Vec<String> {
        (1..self.path.len())
            .map(|n| self.path[..n].join("."))
            .collect()
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Join name={:?}>", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub join: Join,
    pub children: Vec<JoinNode>,
}

/// Arrange joins into a tree keyed by path. Each nested join must have all
/// its parent paths joined as well; repeated paths keep the first join.
pub fn to_join_tree(joins: &[Join]) -> Result<Vec<JoinNode>> {
    let mut sorted: Vec<&Join> = joins.iter().collect();
    sorted.sort_by_key(|join| join.name());

    let mut tree: Vec<JoinNode> = Vec::new();
    for join in sorted {
        let mut level = &mut tree;
        for parent in join.parent_names() {
            level = match level.iter().position(|node| node.join.name() == parent) {
                Some(index) => &mut level[index].children,
                None => {
                    return Err(DataMapperError::MissingJoin {
                        parent,
                        child: join.name(),
                    })
                }
            };
        }
        if !level.iter().any(|node| node.join.name() == join.name()) {
            level.push(JoinNode {
                join: join.clone(),
                children: Vec::new(),
            });
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_joins_form_a_tree() {
        let joins = vec![
            Join::new("pets.owner", Some("o"), false),
            Join::new("pets", None, false),
            Join::new("home", None, true),
        ];
        let tree = to_join_tree(&joins).unwrap();

        let names: Vec<_> = tree.iter().map(|n| n.join.name()).collect();
        assert_eq!(names, vec!["home", "pets"]);
        assert!(tree[0].join.is_outer());
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].join.alias(), Some("o"));
        assert_eq!(tree[1].children[0].join.association(), "owner");
    }

    #[test]
    fn test_missing_parent_join() {
        let err = to_join_tree(&[Join::new("pets.owner", None, false)]).unwrap_err();
        assert_eq!(err.to_string(), "can't join 'pets.owner' without joining 'pets'");
    }

    #[test]
    fn test_duplicate_paths_keep_first() {
        let tree = to_join_tree(&[
            Join::new("pets", Some("a"), false),
            Join::new("pets", Some("b"), false),
        ])
        .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].join.alias(), Some("a"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Join::new("pets.owner", None, false).to_string(),
            "<Join name=\"pets.owner\">"
        );
    }
}
