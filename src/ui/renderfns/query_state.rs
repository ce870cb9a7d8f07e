use crate::query::QueryState;
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};

/// Draw the non-success states of a query.
///
/// Returns `false` for `Success`, leaving the area to the caller.
pub fn draw_query_placeholder<T>(frame: &mut Frame, area: Rect, state: &QueryState<T>) -> bool {
  let (text, color) = match state {
    QueryState::Success(_) => return false,
    QueryState::Loading => ("Loading...".to_string(), Color::DarkGray),
    QueryState::Error(e) => (format!("Error: {}\n\nPress 'r' to retry.", e), Color::Red),
    QueryState::Idle => ("Nothing loaded. Press 'r' to fetch.".to_string(), Color::DarkGray),
  };

  let paragraph = Paragraph::new(text)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
  true
}
