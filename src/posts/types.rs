use serde::{Deserialize, Serialize};

/// A post as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: u64,
  pub title: String,
  pub body: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<u64>,
}

/// Draft of a post that has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
  pub title: String,
  pub body: String,
  pub user_id: u64,
}

impl NewPost {
  pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      body: body.into(),
      user_id: 1,
    }
  }

  /// The post as it will look once created, shown until the server answers.
  pub fn provisional(&self, id: u64) -> Post {
    Post {
      id,
      title: self.title.clone(),
      body: self.body.clone(),
      user_id: Some(self.user_id),
    }
  }
}

/// One past the highest id in `posts`, or 1 when there is none.
pub fn next_post_id(posts: Option<&[Post]>) -> u64 {
  posts
    .and_then(|posts| posts.iter().map(|p| p.id).max())
    .map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_post_deserializes_service_shape() {
    let json = r#"{"userId": 1, "id": 3, "title": "ea molestias", "body": "et iusto"}"#;
    let post: Post = serde_json::from_str(json).expect("valid post");
    assert_eq!(post.id, 3);
    assert_eq!(post.title, "ea molestias");
    assert_eq!(post.user_id, Some(1));
  }

  #[test]
  fn test_post_without_user_id() {
    let post: Post = serde_json::from_str(r#"{"id": 1, "title": "t", "body": "b"}"#).expect("valid post");
    assert_eq!(post.user_id, None);
  }

  #[test]
  fn test_new_post_wire_format() {
    let value = serde_json::to_value(NewPost::new("Hello", "World")).expect("serializes");
    assert_eq!(
      value,
      serde_json::json!({"title": "Hello", "body": "World", "userId": 1})
    );
  }

  #[test]
  fn test_next_post_id() {
    assert_eq!(next_post_id(None), 1);
    assert_eq!(next_post_id(Some(&[])), 1);

    let posts = vec![
      NewPost::new("a", "").provisional(4),
      NewPost::new("b", "").provisional(9),
      NewPost::new("c", "").provisional(2),
    ];
    assert_eq!(next_post_id(Some(&posts)), 10);

    let last = vec![NewPost::new("z", "").provisional(u64::MAX)];
    assert_eq!(next_post_id(Some(&last)), u64::MAX);
  }
}
