use crate::app::AppContext;
use crate::cache::QuerySnapshot;
use crate::mutation::{MutationObserver, MutationState};
use crate::posts::{create_post_mutation, NewPost, Post};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Title,
  Body,
}

/// Form for creating a post
pub struct CreatePostView {
  title: TextInput,
  body: TextInput,
  focus: Field,
  mutation: MutationObserver<NewPost, Post, QuerySnapshot>,
  /// Local validation message, cleared by the next edit
  notice: Option<String>,
}

impl CreatePostView {
  pub fn new(ctx: AppContext) -> Self {
    let mutation = create_post_mutation(&ctx.client, &ctx.api, ctx.optimistic);
    Self {
      title: TextInput::new(),
      body: TextInput::new(),
      focus: Field::Title,
      mutation: MutationObserver::new(mutation),
      notice: None,
    }
  }

  fn focused_input(&mut self) -> &mut TextInput {
    match self.focus {
      Field::Title => &mut self.title,
      Field::Body => &mut self.body,
    }
  }

  fn submit(&mut self) {
    if self.mutation.is_pending() {
      return;
    }
    let title = self.title.value().trim();
    if title.is_empty() {
      self.notice = Some("Title is required".to_string());
      return;
    }
    self.notice = None;
    self
      .mutation
      .mutate(NewPost::new(title, self.body.value().trim()));
  }

  /// Status line under the form
  fn status(&self) -> Option<(String, Color)> {
    if let Some(notice) = &self.notice {
      return Some((notice.clone(), Color::Red));
    }
    match self.mutation.state() {
      MutationState::Idle => None,
      MutationState::Pending => Some(("Creating...".to_string(), Color::DarkGray)),
      MutationState::Success(post) => Some((format!("Created post #{}", post.id), Color::Green)),
      MutationState::Error(e) => Some((format!("Error: {}", e), Color::Red)),
    }
  }

  fn render_field(&self, frame: &mut Frame, area: Rect, label: &str, field: Field) {
    let input = match field {
      Field::Title => &self.title,
      Field::Body => &self.body,
    };
    let focused = self.focus == field;
    let border = if focused { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
      .title(format!(" {} ", label))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(input.value()).block(block), area);

    if focused {
      let x = inner.x + (input.cursor_position() as u16).min(inner.width.saturating_sub(1));
      frame.set_cursor_position((x, inner.y));
    }
  }
}

impl View for CreatePostView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::BackTab => {
        self.focus = match self.focus {
          Field::Title => Field::Body,
          Field::Body => Field::Title,
        };
        return ViewAction::None;
      }
      KeyCode::Enter => {
        self.submit();
        return ViewAction::None;
      }
      _ => {}
    }

    if self.focused_input().handle_key(key) == InputResult::Consumed {
      self.notice = None;
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" New post ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(3), // Title
        Constraint::Length(3), // Body
        Constraint::Length(1), // Status
        Constraint::Min(0),
      ])
      .split(inner);

    self.render_field(frame, chunks[0], "Title", Field::Title);
    self.render_field(frame, chunks[1], "Body", Field::Body);

    if let Some((text, color)) = self.status() {
      frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(color)),
        chunks[2],
      );
    }
  }

  fn breadcrumb_label(&self) -> String {
    "New post".to_string()
  }

  fn tick(&mut self) {
    if self.mutation.poll() && self.mutation.state().data().is_some() {
      self.title.clear();
      self.body.clear();
      self.focus = Field::Title;
    }
  }

  fn is_fetching(&self) -> bool {
    self.mutation.is_pending()
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("tab", "next field").with_priority(10),
      ShortcutInfo::new("enter", "create").with_priority(20),
      ShortcutInfo::new("esc", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::QueryClient;
  use crate::config::ApiConfig;
  use crate::posts::{posts_key, PostClient};
  use crossterm::event::KeyModifiers;
  use httpmock::MockServer;
  use serde_json::json;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(view: &mut CreatePostView, text: &str) {
    for c in text.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn ctx(server: &MockServer) -> AppContext {
    AppContext {
      client: QueryClient::default(),
      api: PostClient::new(&ApiConfig {
        base_url: server.base_url(),
        timeout_secs: Some(5),
      })
      .expect("client"),
      stale_time: Duration::from_secs(10),
      optimistic: true,
    }
  }

  #[tokio::test]
  async fn test_empty_title_is_rejected_locally() {
    let server = MockServer::start_async().await;
    let mut view = CreatePostView::new(ctx(&server));

    view.handle_key(key(KeyCode::Enter));
    assert_eq!(
      view.status(),
      Some(("Title is required".to_string(), Color::Red))
    );
    assert_eq!(view.mutation.state(), &MutationState::Idle);

    type_text(&mut view, "x");
    assert_eq!(view.status(), None);
  }

  #[tokio::test]
  async fn test_submit_creates_and_clears_form() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when
          .method("POST")
          .path("/posts")
          .json_body(json!({"title": "Hello", "body": "World", "userId": 1}));
        then
          .status(201)
          .json_body(json!({"id": 101, "title": "Hello", "body": "World", "userId": 1}));
      })
      .await;

    let app_ctx = ctx(&server);
    let client = app_ctx.client.clone();
    let mut view = CreatePostView::new(app_ctx);
    type_text(&mut view, "Hello");
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "World");
    view.handle_key(key(KeyCode::Enter));

    assert_eq!(view.status(), Some(("Creating...".to_string(), Color::DarkGray)));
    tokio::time::sleep(Duration::from_millis(5)).await;
    // Stays in the list after success since nobody observes it to refetch
    let optimistic = client.get_query_data::<Vec<Post>>(&posts_key());
    assert_eq!(optimistic.map(|posts| posts.len()), Some(1));

    for _ in 0..100 {
      view.tick();
      if !view.mutation.is_pending() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
      view.status(),
      Some(("Created post #101".to_string(), Color::Green))
    );
    assert!(view.title.is_empty());
    assert!(view.body.is_empty());
  }

  #[tokio::test]
  async fn test_tab_switches_field() {
    let server = MockServer::start_async().await;
    let mut view = CreatePostView::new(ctx(&server));
    type_text(&mut view, "a");
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "b");
    view.handle_key(key(KeyCode::BackTab));
    type_text(&mut view, "c");
    assert_eq!(view.title.value(), "ac");
    assert_eq!(view.body.value(), "b");
  }

  #[tokio::test]
  async fn test_escape_goes_back() {
    let server = MockServer::start_async().await;
    let mut view = CreatePostView::new(ctx(&server));
    assert!(matches!(view.handle_key(key(KeyCode::Esc)), ViewAction::Pop));
  }
}
