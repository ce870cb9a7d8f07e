use crate::cache::{CacheStats, QueryClient};
use crate::commands::{self, AppCommand};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::posts::PostClient;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{CreatePostView, PostDetailView, PostListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{debug, info};

/// What every view needs to build its queries and mutations
#[derive(Clone)]
pub struct AppContext {
  pub client: QueryClient,
  pub api: PostClient,
  pub stale_time: Duration,
  pub optimistic: bool,
}

/// Main application state
pub struct App {
  ctx: AppContext,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command line overlay
  command_input: CommandInput,

  /// Last command error, cleared by the next key
  message: Option<String>,

  tick_rate: Duration,

  should_quit: bool,
}

impl App {
  /// Build the app with the post list as root, and `initial_post` opened
  /// on top of it if given.
  pub fn new(config: &Config, initial_post: Option<u64>) -> Result<Self> {
    let ctx = AppContext {
      client: QueryClient::new(config.query_config()),
      api: PostClient::new(&config.api)?,
      stale_time: config.query_config().stale_time,
      optimistic: config.mutation.optimistic,
    };

    let mut view_stack: Vec<Box<dyn View>> = vec![Box::new(PostListView::new(ctx.clone()))];
    if let Some(id) = initial_post {
      view_stack.push(Box::new(PostDetailView::new(ctx.clone(), id)));
    }

    Ok(Self {
      ctx,
      view_stack,
      command_input: CommandInput::new(),
      message: None,
      tick_rate: config.tick_rate(),
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    self.ctx.client.clear();
    info!("shut down");

    result
  }

  async fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
    let mut events = EventHandler::new(self.tick_rate);

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Resize => {}
    }
  }

  fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }
    self.ctx.client.collect_garbage();
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captures_input = self
      .view_stack
      .last()
      .map(|v| v.captures_input())
      .unwrap_or(false);
    if !captures_input || self.command_input.is_active() {
      match self.command_input.handle_key(key) {
        KeyResult::Handled => {
          self.message = None;
          return;
        }
        KeyResult::Event(CommandEvent::Submitted(line)) => {
          self.execute(&line);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) => return,
        KeyResult::NotHandled => {}
      }
    }

    self.message = None;
    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute(&mut self, line: &str) {
    debug!(command = line, "executing command");
    match commands::parse(line) {
      Ok(AppCommand::Posts) => {
        // New root; drops every observer above it
        self.view_stack = vec![Box::new(PostListView::new(self.ctx.clone()))];
      }
      Ok(AppCommand::Post(id)) => {
        self
          .view_stack
          .push(Box::new(PostDetailView::new(self.ctx.clone(), id)));
      }
      Ok(AppCommand::NewPost) => {
        self
          .view_stack
          .push(Box::new(CreatePostView::new(self.ctx.clone())));
      }
      Ok(AppCommand::Quit) => self.should_quit = true,
      Err(message) => self.message = Some(message),
    }
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  pub fn host(&self) -> &str {
    self.ctx.api.host()
  }

  pub fn stats(&self) -> CacheStats {
    self.ctx.client.stats()
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command_input
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn is_fetching(&self) -> bool {
    self.view_stack.last().is_some_and(|v| v.is_fetching())
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }
}
