//! Comment and like models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::UserSummary;

/// Comment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub blog_id: Uuid,
    pub author_id: Uuid,
    /// Set for replies
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        blog_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        content: String,
        is_approved: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            blog_id,
            author_id,
            parent_id,
            content,
            is_approved,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Comment joined with its author
#[derive(Debug, Clone, PartialEq)]
pub struct CommentWithAuthor {
    pub comment: Comment,
    pub author: UserSummary,
}

/// Comment as returned to clients, with nested replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: Uuid,
    pub content: String,
    pub author: UserSummary,
    /// Parent comment id
    pub parent: Option<Uuid>,
    pub replies: Vec<CommentNode>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentNode {
    pub fn leaf(entry: CommentWithAuthor) -> Self {
        let CommentWithAuthor { comment, author } = entry;
        Self {
            id: comment.id,
            content: comment.content,
            author,
            parent: comment.parent_id,
            replies: Vec::new(),
            is_approved: comment.is_approved,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// Nest a flat list of comments under their parents.
///
/// Roots are the entries without a parent, newest first. Replies are
/// attached recursively, also newest first. Entries whose parent is not
/// in the list are dropped, so hiding a comment hides its whole thread.
pub fn build_comment_tree(entries: Vec<CommentWithAuthor>) -> Vec<CommentNode> {
    let mut roots = Vec::new();
    let mut children: HashMap<Uuid, Vec<CommentWithAuthor>> = HashMap::new();

    for entry in entries {
        match entry.comment.parent_id {
            Some(parent) => children.entry(parent).or_default().push(entry),
            None => roots.push(entry),
        }
    }

    sort_newest_first(&mut roots);
    roots
        .into_iter()
        .map(|root| attach_replies(root, &mut children))
        .collect()
}

/// The comment `root_id` with every reply from `entries` nested beneath it
pub fn build_thread(root_id: Uuid, entries: Vec<CommentWithAuthor>) -> Option<CommentNode> {
    let mut root = None;
    let mut children: HashMap<Uuid, Vec<CommentWithAuthor>> = HashMap::new();

    for entry in entries {
        if entry.comment.id == root_id {
            root = Some(entry);
        } else if let Some(parent) = entry.comment.parent_id {
            children.entry(parent).or_default().push(entry);
        }
    }

    root.map(|root| attach_replies(root, &mut children))
}

fn attach_replies(
    entry: CommentWithAuthor,
    children: &mut HashMap<Uuid, Vec<CommentWithAuthor>>,
) -> CommentNode {
    let mut node = CommentNode::leaf(entry);
    if let Some(mut replies) = children.remove(&node.id) {
        sort_newest_first(&mut replies);
        node.replies = replies
            .into_iter()
            .map(|reply| attach_replies(reply, children))
            .collect();
    }
    node
}

fn sort_newest_first(entries: &mut [CommentWithAuthor]) {
    entries.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
}

/// A user's like on a post. A user likes a post at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub blog_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Like {
    pub fn new(blog_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            blog_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn author() -> UserSummary {
        UserSummary {
            id: Uuid::new_v4(),
            username: "reader".into(),
            full_name: String::new(),
            profile_picture: None,
        }
    }

    fn entry(blog: Uuid, parent: Option<Uuid>, minutes_ago: i64) -> CommentWithAuthor {
        let mut comment = Comment::new(blog, Uuid::new_v4(), parent, "a thoughtful comment".into(), true);
        comment.created_at = Utc::now() - Duration::minutes(minutes_ago);
        CommentWithAuthor {
            comment,
            author: author(),
        }
    }

    #[test]
    fn test_build_tree_nests_replies_recursively() {
        let blog = Uuid::new_v4();
        let root = entry(blog, None, 30);
        let reply = entry(blog, Some(root.comment.id), 20);
        let nested = entry(blog, Some(reply.comment.id), 10);
        let root_id = root.comment.id;
        let nested_id = nested.comment.id;

        let tree = build_comment_tree(vec![nested, reply, root]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, root_id);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].replies[0].id, nested_id);
        assert_eq!(tree[0].replies[0].parent, Some(root_id));
    }

    #[test]
    fn test_build_tree_orders_newest_first() {
        let blog = Uuid::new_v4();
        let old = entry(blog, None, 60);
        let new = entry(blog, None, 1);
        let new_id = new.comment.id;

        let tree = build_comment_tree(vec![old, new]);
        assert_eq!(tree[0].id, new_id);
    }

    #[test]
    fn test_build_tree_drops_orphans() {
        let blog = Uuid::new_v4();
        let orphan = entry(blog, Some(Uuid::new_v4()), 5);
        assert!(build_comment_tree(vec![orphan]).is_empty());
    }

    #[test]
    fn test_build_thread_roots_at_any_comment() {
        let blog = Uuid::new_v4();
        let root = entry(blog, None, 30);
        let reply = entry(blog, Some(root.comment.id), 20);
        let nested = entry(blog, Some(reply.comment.id), 10);
        let sibling = entry(blog, None, 5);
        let reply_id = reply.comment.id;

        let thread = build_thread(reply_id, vec![root, reply, nested, sibling]).unwrap();
        assert_eq!(thread.id, reply_id);
        assert_eq!(thread.replies.len(), 1);
        assert!(build_thread(Uuid::new_v4(), Vec::new()).is_none());
    }
}
