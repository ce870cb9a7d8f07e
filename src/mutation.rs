//! Mutations: writes against the remote service with optimistic cache
//! patches and rollback.
//!
//! A [`Mutation`] bundles the write itself with lifecycle hooks. The usual
//! optimistic shape is:
//!
//! ```ignore
//! let mutation = Mutation::new(move |draft: NewPost| { /* POST */ })
//!   .on_mutate(move |draft| {
//!     client.cancel(&key);
//!     client.optimistic_update(&key, |prev| append(prev, draft))
//!   })
//!   .on_success(move |_, _, _| client.invalidate_prefix(&key))
//!   .on_error(move |_, _, snapshot| {
//!     if let Some(snapshot) = snapshot {
//!       client.restore(snapshot);
//!     }
//!   });
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::QueryError;

type MutationFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;
type OnMutate<I, C> = Arc<dyn Fn(&I) -> C + Send + Sync>;
type OnSuccess<I, O, C> = Arc<dyn Fn(&O, &I, Option<&C>) + Send + Sync>;
type OnError<I, C> = Arc<dyn Fn(&QueryError, &I, Option<C>) + Send + Sync>;
type OnSettled<I, O> = Arc<dyn Fn(Result<&O, &QueryError>, &I) + Send + Sync>;

/// The state of one mutation invocation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<O> {
  Idle,
  Pending,
  Success(O),
  Error(String),
}

impl<O> MutationState<O> {
  pub fn is_pending(&self) -> bool {
    matches!(self, MutationState::Pending)
  }

  pub fn data(&self) -> Option<&O> {
    match self {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      MutationState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A write operation plus its lifecycle hooks.
///
/// `C` is the context returned by `on_mutate` and handed to the other hooks,
/// typically a [`QuerySnapshot`](crate::cache::QuerySnapshot) to roll back to.
pub struct Mutation<I, O, C = ()> {
  mutation_fn: MutationFn<I, O>,
  on_mutate: Option<OnMutate<I, C>>,
  on_success: Option<OnSuccess<I, O, C>>,
  on_error: Option<OnError<I, C>>,
  on_settled: Option<OnSettled<I, O>>,
}

impl<I, O, C> Clone for Mutation<I, O, C> {
  fn clone(&self) -> Self {
    Self {
      mutation_fn: self.mutation_fn.clone(),
      on_mutate: self.on_mutate.clone(),
      on_success: self.on_success.clone(),
      on_error: self.on_error.clone(),
      on_settled: self.on_settled.clone(),
    }
  }
}

impl<I, O, C> Mutation<I, O, C>
where
  I: Clone + Send + Sync + 'static,
  O: Send + 'static,
  C: Send + 'static,
{
  pub fn new<F, Fut>(mutation_fn: F) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, QueryError>> + Send + 'static,
  {
    Self {
      mutation_fn: Arc::new(move |input| mutation_fn(input).boxed()),
      on_mutate: None,
      on_success: None,
      on_error: None,
      on_settled: None,
    }
  }

  /// Runs before the write. Whatever it returns is the invocation's context.
  ///
  /// Any cancellation done here is synchronous, so it has taken effect
  /// before the optimistic patch that follows it.
  pub fn on_mutate(mut self, hook: impl Fn(&I) -> C + Send + Sync + 'static) -> Self {
    self.on_mutate = Some(Arc::new(hook));
    self
  }

  pub fn on_success(mut self, hook: impl Fn(&O, &I, Option<&C>) + Send + Sync + 'static) -> Self {
    self.on_success = Some(Arc::new(hook));
    self
  }

  /// Receives the context by value so it can be consumed by a rollback.
  pub fn on_error(
    mut self,
    hook: impl Fn(&QueryError, &I, Option<C>) + Send + Sync + 'static,
  ) -> Self {
    self.on_error = Some(Arc::new(hook));
    self
  }

  /// Runs last, after `on_success` or `on_error`.
  pub fn on_settled(
    mut self,
    hook: impl Fn(Result<&O, &QueryError>, &I) + Send + Sync + 'static,
  ) -> Self {
    self.on_settled = Some(Arc::new(hook));
    self
  }

  /// Run one invocation: `on_mutate`, the write, then `on_success` or
  /// `on_error`, then `on_settled`. The write's error is returned as is.
  pub async fn mutate(&self, input: I) -> Result<O, QueryError> {
    let context = self.on_mutate.as_ref().map(|hook| hook(&input));

    info!("mutation started");
    let result = (self.mutation_fn)(input.clone()).await;

    match &result {
      Ok(output) => {
        info!("mutation succeeded");
        if let Some(hook) = &self.on_success {
          hook(output, &input, context.as_ref());
        }
      }
      Err(error) => {
        warn!(%error, "mutation failed");
        if let Some(hook) = &self.on_error {
          hook(error, &input, context);
        }
      }
    }

    if let Some(hook) = &self.on_settled {
      hook(result.as_ref(), &input);
    }
    result
  }
}

/// View-side handle on a mutation.
///
/// `mutate` spawns the invocation and `poll` picks up its outcome, the same
/// way queries are polled from the event loop.
pub struct MutationObserver<I, O, C = ()> {
  mutation: Mutation<I, O, C>,
  state: MutationState<O>,
  receiver: Option<mpsc::UnboundedReceiver<Result<O, QueryError>>>,
}

impl<I, O, C> MutationObserver<I, O, C>
where
  I: Clone + Send + Sync + 'static,
  O: Clone + Send + 'static,
  C: Send + 'static,
{
  pub fn new(mutation: Mutation<I, O, C>) -> Self {
    Self {
      mutation,
      state: MutationState::Idle,
      receiver: None,
    }
  }

  pub fn state(&self) -> &MutationState<O> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    self.state.is_pending()
  }

  /// Start a new invocation. A previous one still running completes on its
  /// own, but its outcome is no longer reported here.
  pub fn mutate(&mut self, input: I) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    let mutation = self.mutation.clone();
    tokio::spawn(async move {
      let result = mutation.mutate(input).await;
      // Ignore send errors - the observer may be gone
      let _ = tx.send(result);
    });
  }

  /// Returns `true` if the invocation finished since the last poll.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(output)) => {
        self.state = MutationState::Success(output);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = MutationState::Error(error.to_string());
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Error("Mutation was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  /// Back to `Idle`, forgetting any pending outcome.
  pub fn reset(&mut self) {
    self.state = MutationState::Idle;
    self.receiver = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;
  use std::time::Duration;

  type Log = Arc<Mutex<Vec<String>>>;

  fn record(log: &Log, event: impl Into<String>) {
    log.lock().expect("log lock").push(event.into());
  }

  fn traced(log: &Log, fail: bool) -> Mutation<String, usize, String> {
    let (a, b, c, d, e) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
    Mutation::new(move |input: String| {
      let log = a.clone();
      async move {
        record(&log, "mutate");
        if fail {
          Err(QueryError::status(500, "Error creating post"))
        } else {
          Ok(input.len())
        }
      }
    })
    .on_mutate(move |input| {
      record(&b, "on_mutate");
      format!("ctx:{}", input)
    })
    .on_success(move |output, _, ctx| {
      record(&c, format!("on_success {} {:?}", output, ctx));
    })
    .on_error(move |error, _, ctx| {
      record(&d, format!("on_error {} {:?}", error, ctx));
    })
    .on_settled(move |result, _| {
      record(&e, format!("on_settled {}", result.is_ok()));
    })
  }

  #[tokio::test]
  async fn test_success_hook_order() {
    let log = Log::default();
    let result = traced(&log, false).mutate("hello".to_string()).await;

    assert_eq!(result, Ok(5));
    assert_eq!(
      *log.lock().expect("log lock"),
      vec![
        "on_mutate".to_string(),
        "mutate".to_string(),
        "on_success 5 Some(\"ctx:hello\")".to_string(),
        "on_settled true".to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn test_error_reaches_hook_and_caller() {
    let log = Log::default();
    let result = traced(&log, true).mutate("hi".to_string()).await;

    assert_eq!(result, Err(QueryError::status(500, "Error creating post")));
    assert_eq!(
      *log.lock().expect("log lock"),
      vec![
        "on_mutate".to_string(),
        "mutate".to_string(),
        "on_error Error creating post Some(\"ctx:hi\")".to_string(),
        "on_settled false".to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn test_hooks_are_optional() {
    let mutation: Mutation<u32, u32> = Mutation::new(|n: u32| async move { Ok(n * 2) });
    assert_eq!(mutation.mutate(21).await, Ok(42));
  }

  #[tokio::test]
  async fn test_observer_lifecycle() {
    let mutation: Mutation<u32, u32> = Mutation::new(|n: u32| async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(n + 1)
    });
    let mut observer = MutationObserver::new(mutation);
    assert_eq!(observer.state(), &MutationState::Idle);
    assert!(!observer.poll());

    observer.mutate(1);
    assert!(observer.is_pending());
    assert!(!observer.poll());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(observer.poll());
    assert_eq!(observer.state(), &MutationState::Success(2));

    observer.reset();
    assert_eq!(observer.state(), &MutationState::Idle);
  }

  #[tokio::test]
  async fn test_observer_reports_error_message() {
    let mutation: Mutation<u32, u32> =
      Mutation::new(|_: u32| async { Err(QueryError::status(500, "Error creating post")) });
    let mut observer = MutationObserver::new(mutation);

    observer.mutate(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(observer.poll());
    assert_eq!(observer.state().error(), Some("Error creating post"));
  }

  #[tokio::test]
  async fn test_invocations_are_independent() {
    let mutation: Mutation<u64, u64> = Mutation::new(|ms: u64| async move {
      tokio::time::sleep(Duration::from_millis(ms)).await;
      Ok(ms)
    });
    let mut observer = MutationObserver::new(mutation);

    observer.mutate(30);
    observer.mutate(5);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(observer.poll());
    assert_eq!(observer.state().data(), Some(&5));
  }
}
