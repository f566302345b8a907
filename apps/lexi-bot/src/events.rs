use std::str::FromStr;

use thiserror::Error;

/// A user interaction, as it arrives from the chat transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start { user: String },
    EasyWord { user: String },
    HardWord { user: String },
}

impl Event {
    pub fn user(&self) -> &str {
        match self {
            Event::Start { user } | Event::EasyWord { user } | Event::HardWord { user } => user,
        }
    }
}

/// One line of input: a user event or an operator command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    User(Event),
    Stats,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseInputError {
    #[error("empty input")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("command {0:?} needs a user id")]
    MissingUser(String),
}

impl FromStr for Input {
    type Err = ParseInputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or(ParseInputError::Empty)?;
        let command = command.trim_start_matches('/');
        if command.eq_ignore_ascii_case("stats") {
            return Ok(Input::Stats);
        }
        let build: fn(String) -> Event = match command.to_ascii_lowercase().as_str() {
            "start" => |user| Event::Start { user },
            "easy" | "easyword" => |user| Event::EasyWord { user },
            "hard" | "hardword" => |user| Event::HardWord { user },
            _ => return Err(ParseInputError::UnknownCommand(command.to_string())),
        };
        let user = parts
            .next()
            .ok_or_else(|| ParseInputError::MissingUser(command.to_string()))?;
        Ok(Input::User(build(user.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_callbacks() {
        assert_eq!(
            "/start 42".parse::<Input>(),
            Ok(Input::User(Event::Start { user: "42".into() }))
        );
        assert_eq!(
            "easyWord 42".parse::<Input>(),
            Ok(Input::User(Event::EasyWord { user: "42".into() }))
        );
        assert_eq!(
            "  hard   7 trailing".parse::<Input>(),
            Ok(Input::User(Event::HardWord { user: "7".into() }))
        );
        assert_eq!("STATS".parse::<Input>(), Ok(Input::Stats));
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!("   ".parse::<Input>(), Err(ParseInputError::Empty));
        assert_eq!(
            "dance 1".parse::<Input>(),
            Err(ParseInputError::UnknownCommand("dance".into()))
        );
        assert_eq!(
            "easy".parse::<Input>(),
            Err(ParseInputError::MissingUser("easy".into()))
        );
    }

    #[test]
    fn event_exposes_user() {
        assert_eq!(Event::HardWord { user: "9".into() }.user(), "9");
    }
}
