//! SQL statements executed against the `posts` table.
//!
//! Every statement that takes input is parameterized. Handlers attach the
//! statement text to their trace sub-segment as `sql` metadata.

/// Width of the `VARCHAR` columns, counted in characters.
pub const VARCHAR_WIDTH: usize = 256;

/// Creates the `posts` table. Fails if it already exists.
pub const CREATE_TABLE: &str = "CREATE TABLE posts (\
    id SERIAL PRIMARY KEY, \
    username VARCHAR(256), \
    title VARCHAR(256), \
    content TEXT\
)";

/// Drops the `posts` table. Fails if it does not exist.
pub const DROP_TABLE: &str = "DROP TABLE posts";

/// Inserts one post and returns its generated id.
pub const INSERT_POST: &str =
    "INSERT INTO posts (title, content, username) VALUES ($1, $2, $3) RETURNING id";

/// Selects all rows with the given id.
pub const SELECT_POSTS: &str = "SELECT id, username, title, content FROM posts WHERE id = $1";

/// Deletes all rows with the given id.
pub const DELETE_POSTS: &str = "DELETE FROM posts WHERE id = $1";
