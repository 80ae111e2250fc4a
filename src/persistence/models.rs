//! Row types for the `posts` table.

use serde::{Deserialize, Serialize};

/// A stored row of the `posts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Server-generated primary key.
    pub id: i32,
    /// Author of the post.
    pub username: String,
    /// Post title.
    pub title: String,
    /// Post body.
    pub content: String,
}

/// A validated post awaiting insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    /// Post title, non-blank.
    pub title: String,
    /// Post body, non-blank.
    pub content: String,
    /// Author of the post, non-blank.
    pub username: String,
}

impl NewPost {
    /// Builds the stored row for this post under `id`.
    #[must_use]
    pub fn into_post(self, id: i32) -> Post {
        Post {
            id,
            username: self.username,
            title: self.title,
            content: self.content,
        }
    }
}
