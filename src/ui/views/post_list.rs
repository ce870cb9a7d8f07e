use crate::app::AppContext;
use crate::posts::{posts_query, Post};
use crate::query::{Query, QueryState};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{draw_query_placeholder, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{CreatePostView, PostDetailView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// View for displaying the list of posts
pub struct PostListView {
  ctx: AppContext,
  query: Query<Vec<Post>>,
  list_state: ListState,
}

impl PostListView {
  pub fn new(ctx: AppContext) -> Self {
    let mut query = posts_query(&ctx.client, &ctx.api, ctx.stale_time);
    query.fetch();

    Self {
      ctx,
      query,
      list_state: ListState::default(),
    }
  }

  fn posts(&self) -> &[Post] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected_post(&self) -> Option<&Post> {
    self.list_state.selected().and_then(|idx| self.posts().get(idx))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.posts().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.query.state() {
      QueryState::Success(_) if self.query.is_fetching() => format!(" Posts ({}) (refreshing...) ", len),
      QueryState::Success(_) => format!(" Posts ({}) ", len),
      _ => " Posts ".to_string(),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);
    if draw_query_placeholder(frame, inner, self.query.state()) {
      return;
    }

    if len == 0 {
      let paragraph = Paragraph::new("No posts yet. Press 'n' to create one.")
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, inner);
      return;
    }

    let title_width = (inner.width as usize).saturating_sub(10);
    let items: Vec<ListItem> = self
      .posts()
      .iter()
      .map(|post| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>5}", post.id), Style::default().fg(Color::Cyan)),
          Span::raw("  "),
          Span::raw(truncate(&post.title, title_width)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, inner, &mut self.list_state);
  }
}

impl View for PostListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('n') => {
        return ViewAction::Push(Box::new(CreatePostView::new(self.ctx.clone())));
      }
      KeyCode::Enter => {
        if let Some(post) = self.selected_post() {
          return ViewAction::Push(Box::new(PostDetailView::new(self.ctx.clone(), post.id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Posts".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn is_fetching(&self) -> bool {
    self.query.is_fetching()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "open").with_priority(20),
      ShortcutInfo::new("n", "new").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
