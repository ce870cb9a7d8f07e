/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  /// Name plus arguments, as shown in the overlay
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "posts",
    aliases: &["p", "list"],
    usage: "posts",
    description: "List all posts",
  },
  Command {
    name: "post",
    aliases: &["show"],
    usage: "post <id>",
    description: "Open a post by id",
  },
  Command {
    name: "new",
    aliases: &["n", "create"],
    usage: "new",
    description: "Create a post",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit postq",
  },
];

/// A parsed command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
  Posts,
  Post(u64),
  NewPost,
  Quit,
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input_lower).map(|rank| (cmd, rank)))
    .collect();

  // Stable sort keeps table order within a rank
  matches.sort_by_key(|(_, rank)| *rank);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` if the command does not match at all.
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Parse a submitted command line such as `post 3`.
///
/// The command word may be a name, an alias or an unambiguous prefix.
pub fn parse(line: &str) -> Result<AppCommand, String> {
  let mut words = line.split_whitespace();
  let Some(word) = words.next() else {
    return Err("Empty command".to_string());
  };
  let word = word.to_lowercase();

  let cmd = resolve(&word)?;

  let arg = words.next();
  match (cmd.name, arg) {
    ("posts", _) => Ok(AppCommand::Posts),
    ("new", _) => Ok(AppCommand::NewPost),
    ("quit", _) => Ok(AppCommand::Quit),
    ("post", Some(id)) => id
      .parse()
      .map(AppCommand::Post)
      .map_err(|_| format!("Invalid post id: {}", id)),
    ("post", None) => Err(format!("Usage: {}", cmd.usage)),
    (name, _) => Err(format!("Unknown command: {}", name)),
  }
}

/// Find the command `word` names. A prefix shared by several commands
/// is rejected rather than guessed.
fn resolve(word: &str) -> Result<&'static Command, String> {
  let ranked: Vec<(&'static Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, word).map(|rank| (cmd, rank)))
    .filter(|(_, rank)| *rank <= 3)
    .collect();

  let Some(best) = ranked.iter().map(|(_, rank)| *rank).min() else {
    return Err(format!("Unknown command: {}", word));
  };
  let candidates: Vec<&'static Command> = ranked
    .into_iter()
    .filter(|(_, rank)| *rank == best)
    .map(|(cmd, _)| cmd)
    .collect();

  match candidates.as_slice() {
    [cmd] => Ok(*cmd),
    _ => {
      let names: Vec<&str> = candidates.iter().map(|cmd| cmd.name).collect();
      Err(format!("Ambiguous command: {} ({})", word, names.join(", ")))
    }
  }
}
