//! Query keys, observers and mutations for posts.

use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{QueryClient, QueryKey, QuerySnapshot, RestoreOutcome};
use crate::mutation::Mutation;
use crate::posts::client::PostClient;
use crate::posts::types::{next_post_id, NewPost, Post};
use crate::query::Query;

/// Mutation that creates a post, with an optional optimistic list patch.
pub type CreatePostMutation = Mutation<NewPost, Post, QuerySnapshot>;

/// `["posts"]`
pub fn posts_key() -> QueryKey {
  QueryKey::new("posts")
}

/// `["posts", id]`
pub fn post_key(id: u64) -> QueryKey {
  posts_key().with(id)
}

pub fn posts_query(client: &QueryClient, api: &PostClient, stale_time: Duration) -> Query<Vec<Post>> {
  let api = api.clone();
  Query::new(client.clone(), posts_key(), move || {
    let api = api.clone();
    async move { api.list_posts().await }
  })
  .with_stale_time(stale_time)
}

pub fn post_query(client: &QueryClient, api: &PostClient, id: u64, stale_time: Duration) -> Query<Post> {
  let api = api.clone();
  Query::new(client.clone(), post_key(id), move || {
    let api = api.clone();
    async move { api.get_post(id).await }
  })
  .with_stale_time(stale_time)
}

/// Build the create-post mutation.
///
/// With `optimistic`, the draft is appended to the cached list before the
/// request goes out (pending list fetches are cancelled first so they cannot
/// overwrite it) and rolled back if the request fails. On success the list
/// is invalidated and the created post is cached under its own key.
pub fn create_post_mutation(client: &QueryClient, api: &PostClient, optimistic: bool) -> CreatePostMutation {
  let api = api.clone();
  let mut mutation = Mutation::new(move |draft: NewPost| {
    let api = api.clone();
    async move { api.create_post(&draft).await }
  });

  if optimistic {
    let client = client.clone();
    mutation = mutation.on_mutate(move |draft: &NewPost| {
      let key = posts_key();
      client.cancel(&key);
      client.optimistic_update(&key, |prev: Option<&Vec<Post>>| {
        let id = next_post_id(prev.map(Vec::as_slice));
        let mut posts = prev.cloned().unwrap_or_default();
        posts.push(draft.provisional(id));
        posts
      })
    });
  }

  let success_client = client.clone();
  let error_client = client.clone();
  mutation
    .on_success(move |post: &Post, _, _| {
      info!(id = post.id, "post created");
      success_client.invalidate_prefix(&posts_key());
      success_client.set_query_data(&post_key(post.id), |_: Option<&Post>| post.clone());
    })
    .on_error(move |error, _, snapshot| {
      let Some(snapshot) = snapshot else {
        return;
      };
      warn!(%error, "rolling back optimistic post");
      if error_client.restore(snapshot) == RestoreOutcome::Interleaved {
        // Another write landed on the list meanwhile; let the server settle it
        error_client.invalidate(&posts_key());
      }
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{QueryError, QueryStatus};
  use crate::config::ApiConfig;
  use crate::query::QueryState;
  use httpmock::MockServer;
  use serde_json::json;

  fn api(server: &MockServer) -> PostClient {
    PostClient::new(&ApiConfig {
      base_url: server.base_url(),
      timeout_secs: Some(5),
    })
    .expect("client")
  }

  fn server_posts() -> serde_json::Value {
    json!([
      {"userId": 1, "id": 1, "title": "first", "body": "one"},
      {"userId": 1, "id": 2, "title": "second", "body": "two"}
    ])
  }

  /// Poll until no fetch is in flight.
  async fn settle<T: Clone + Send + Sync + 'static>(query: &mut Query<T>) {
    for _ in 0..200 {
      query.poll();
      if !query.is_fetching() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("query did not settle");
  }

  fn titles(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.title.as_str()).collect()
  }

  #[test]
  fn test_keys() {
    assert_eq!(posts_key().to_string(), r#"["posts"]"#);
    assert_eq!(post_key(42).to_string(), r#"["posts",42]"#);
    assert!(post_key(42).starts_with(&posts_key()));
  }

  #[tokio::test]
  async fn test_list_loads_then_succeeds() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts");
        then.status(200).json_body(server_posts());
      })
      .await;

    let client = QueryClient::default();
    let mut query = posts_query(&client, &api(&server), Duration::from_secs(10));
    query.fetch();
    assert!(query.is_loading());

    settle(&mut query).await;
    let posts = query.data().expect("posts");
    assert_eq!(titles(posts), vec!["first", "second"]);
  }

  #[tokio::test]
  async fn test_missing_post_is_error_without_data() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts/99");
        then.status(500);
      })
      .await;

    let client = QueryClient::default();
    let mut query = post_query(&client, &api(&server), 99, Duration::from_secs(10));
    query.fetch();
    assert!(query.is_loading());

    settle(&mut query).await;
    assert_eq!(
      query.state(),
      &QueryState::Error("Error fetching data".to_string())
    );
    assert_eq!(query.data(), None);
  }

  #[tokio::test]
  async fn test_optimistic_post_visible_before_server_answers() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts");
        then.status(200).json_body(server_posts());
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then
          .status(201)
          .delay(Duration::from_millis(200))
          .json_body(json!({"id": 101, "title": "Hello", "body": "World", "userId": 1}));
      })
      .await;

    let client = QueryClient::default();
    let api = api(&server);
    let mut list = posts_query(&client, &api, Duration::from_secs(10));
    list.fetch();
    settle(&mut list).await;

    let mutation = create_post_mutation(&client, &api, true);
    let pending = tokio::spawn(async move { mutation.mutate(NewPost::new("Hello", "World")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let patched = client.get_query_data::<Vec<Post>>(&posts_key()).expect("cached list");
    assert_eq!(titles(&patched), vec!["first", "second", "Hello"]);
    assert_eq!(patched[2].id, 3);

    let created = pending.await.expect("task").expect("created");
    assert_eq!(created.id, 101);
    assert_eq!(client.get_query_data::<Post>(&post_key(101)), Some(created));

    // The list is refetched for its observer and server truth replaces the guess
    settle(&mut list).await;
    assert_eq!(titles(list.data().expect("posts")), vec!["first", "second"]);
  }

  #[tokio::test]
  async fn test_failed_create_restores_exact_list() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts");
        then.status(200).json_body(server_posts());
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then.status(500).delay(Duration::from_millis(50));
      })
      .await;

    let client = QueryClient::default();
    let api = api(&server);
    let mut list = posts_query(&client, &api, Duration::from_secs(10));
    list.fetch();
    settle(&mut list).await;

    let before_data = client.get_query_data::<Vec<Post>>(&posts_key());
    let before_state = client.get_query_state(&posts_key()).expect("entry");

    let result = create_post_mutation(&client, &api, true)
      .mutate(NewPost::new("Hello", "World"))
      .await;
    assert_eq!(result, Err(QueryError::status(500, "Error creating post")));

    assert_eq!(client.get_query_data::<Vec<Post>>(&posts_key()), before_data);
    let after_state = client.get_query_state(&posts_key()).expect("entry");
    assert_eq!(after_state.status, QueryStatus::Success);
    assert_eq!(after_state.updated_at, before_state.updated_at);
    assert!(!after_state.invalidated);
    assert!(!after_state.is_fetching);
  }

  #[tokio::test]
  async fn test_optimistic_patch_cancels_pending_list_fetch() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts");
        then
          .status(200)
          .delay(Duration::from_millis(100))
          .json_body(server_posts());
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then.status(500).delay(Duration::from_millis(300));
      })
      .await;

    let client = QueryClient::default();
    let api = api(&server);
    client.set_query_data(&posts_key(), |_: Option<&Vec<Post>>| Vec::new());
    let mut list = posts_query(&client, &api, Duration::from_secs(10));
    list.refetch();
    assert!(list.is_fetching());

    let mutation = create_post_mutation(&client, &api, true);
    let pending = tokio::spawn(async move { mutation.mutate(NewPost::new("Hello", "")).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The list fetch would have landed by now had it not been cancelled
    let patched = client.get_query_data::<Vec<Post>>(&posts_key()).expect("cached list");
    assert_eq!(titles(&patched), vec!["Hello"]);
    assert_eq!(patched[0].id, 1);

    assert!(pending.await.expect("task").is_err());
    assert_eq!(client.get_query_data::<Vec<Post>>(&posts_key()), Some(Vec::new()));
  }

  #[tokio::test]
  async fn test_without_optimistic_cache_waits_for_server() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then
          .status(201)
          .delay(Duration::from_millis(100))
          .json_body(json!({"id": 101, "title": "Hello", "body": "", "userId": 1}));
      })
      .await;

    let client = QueryClient::default();
    client.set_query_data(&posts_key(), |_: Option<&Vec<Post>>| Vec::new());
    let mutation = create_post_mutation(&client, &api(&server), false);
    let pending = tokio::spawn(async move { mutation.mutate(NewPost::new("Hello", "")).await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(client.get_query_data::<Vec<Post>>(&posts_key()), Some(Vec::new()));
    pending.await.expect("task").expect("created");
    assert!(client.get_query_state(&posts_key()).expect("entry").invalidated);
  }

  #[tokio::test]
  async fn test_create_during_list_fetch_refetches_list() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method("GET").path("/posts");
        then
          .status(200)
          .delay(Duration::from_millis(80))
          .json_body(server_posts());
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method("POST").path("/posts");
        then
          .status(201)
          .json_body(json!({"id": 101, "title": "Hello", "body": "", "userId": 1}));
      })
      .await;

    let client = QueryClient::default();
    let api = api(&server);
    let calls = Arc::new(AtomicU32::new(0));
    let mut list = {
      let api = api.clone();
      let calls = calls.clone();
      Query::new(client.clone(), posts_key(), move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let api = api.clone();
        async move { api.list_posts().await }
      })
    };
    list.fetch();

    // The list request was sent before the post existed on the server
    let mutation = create_post_mutation(&client, &api, false);
    mutation.mutate(NewPost::new("Hello", "")).await.expect("created");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    settle(&mut list).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let state = client.get_query_state(&posts_key()).expect("entry");
    assert!(!state.invalidated);
    assert_eq!(state.status, QueryStatus::Success);
  }
}
