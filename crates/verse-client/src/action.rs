//! Action enum: user intents fed into the core loop.

use thiserror::Error;

/// Everything a presentation layer can ask the core to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ── Search ───────────────────────────────────────────────────────────────
    Query(String),     // typed text, debounced
    SearchNow(String), // enter key
    Page(usize),       // 1-based page from the pagination control

    // ── Preview ──────────────────────────────────────────────────────────────
    Hover(usize), // 0-based row in the current result page
    Leave,

    // ── Session ──────────────────────────────────────────────────────────────
    SignIn(String),
    SignOut,
    Reconnect,

    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '/{0}'")]
    UnknownCommand(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a positive number")]
    BadNumber(String),
}

/// Parse one line of frontend input.
///
/// Plain text is a query.  Lines starting with `/` are commands:
/// `/enter <text>`, `/page <n>`, `/hover <n>`, `/leave`, `/reconnect`,
/// `/login <token>`, `/logout`, `/quit`.  Row and page numbers are 1-based.
/// A line starting with `//` is a query for text beginning with `/`.
pub fn parse_line(line: &str) -> Result<Action, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Action::Query(line.to_string()));
    };
    if rest.starts_with('/') {
        return Ok(Action::Query(rest.to_string()));
    }

    let (command, arg) = match rest.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (rest, ""),
    };

    match command {
        "enter" => Ok(Action::SearchNow(arg.to_string())),
        "page" => Ok(Action::Page(positive(arg, "page")?)),
        "hover" => Ok(Action::Hover(positive(arg, "hover")? - 1)),
        "leave" => Ok(Action::Leave),
        "reconnect" => Ok(Action::Reconnect),
        "login" if arg.is_empty() => Err(ParseError::MissingArgument("login")),
        "login" => Ok(Action::SignIn(arg.to_string())),
        "logout" => Ok(Action::SignOut),
        "quit" | "q" => Ok(Action::Quit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn positive(arg: &str, command: &'static str) -> Result<usize, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument(command));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::BadNumber(arg.to_string())),
    }
}
