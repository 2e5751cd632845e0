//! Assembly of the per-file comment forest from the flat comment list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Comment;

/// A comment together with its replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Length of the longest root-to-leaf chain, counting this node.
    pub fn depth(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::depth).max().unwrap_or(0)
    }
}

/// Build the forest. Siblings keep the order of `comments`. A comment whose
/// parent is not in the list is treated as a root.
pub fn build_forest(comments: Vec<Comment>) -> Vec<CommentNode> {
    let known: std::collections::HashSet<i64> = comments.iter().map(|c| c.id).collect();

    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Comment>> = HashMap::new();
    for comment in comments {
        match comment.parent_id {
            Some(parent) if parent != comment.id && known.contains(&parent) => {
                children.entry(parent).or_default().push(comment)
            }
            _ => roots.push(comment),
        }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut children))
        .collect()
}

fn attach(comment: Comment, children: &mut HashMap<i64, Vec<Comment>>) -> CommentNode {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| attach(reply, children))
        .collect();
    CommentNode { comment, replies }
}
