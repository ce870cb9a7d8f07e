use crate::app::AppContext;
use crate::posts::{post_query, Post};
use crate::query::Query;
use crate::ui::renderfns::{draw_query_placeholder, format_age};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// View for displaying one post
pub struct PostDetailView {
  id: u64,
  query: Query<Post>,
}

impl PostDetailView {
  pub fn new(ctx: AppContext, id: u64) -> Self {
    let mut query = post_query(&ctx.client, &ctx.api, id, ctx.stale_time);
    query.fetch();
    Self { id, query }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let mut block = Block::default()
      .title(format!(" Post #{} ", self.id))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    if let Some(updated_at) = self.query.updated_at() {
      block = block.title_bottom(
        Line::from(format!(" updated {} ", format_age(updated_at, Utc::now()))).right_aligned(),
      );
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);
    if draw_query_placeholder(frame, inner, self.query.state()) {
      return;
    }
    let Some(post) = self.query.data() else {
      return;
    };

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2), // Title
        Constraint::Length(1), // Separator
        Constraint::Min(1),    // Body
      ])
      .split(inner);

    let title = Paragraph::new(post.title.as_str())
      .wrap(Wrap { trim: true })
      .style(Style::default().fg(Color::Yellow).bold());
    frame.render_widget(title, chunks[0]);

    let sep = Paragraph::new("─".repeat(chunks[1].width as usize))
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(sep, chunks[1]);

    let body = Paragraph::new(post.body.as_str()).wrap(Wrap { trim: true });
    frame.render_widget(body, chunks[2]);
  }
}

impl View for PostDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => {
        self.query.refetch();
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
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
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
