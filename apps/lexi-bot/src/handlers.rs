use std::fmt;

use rand::Rng;

use crate::events::Event;
use crate::store::UserStore;
use crate::words::WordList;

pub const PROMPT: &str = "Сымпровизируй-ка это:";
pub const UNKNOWN_USER: &str = "Something went wrong.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    EasyWord,
    HardWord,
}

impl Button {
    pub fn label(&self) -> &'static str {
        match self {
            Button::EasyWord => "👌Простое слово",
            Button::HardWord => "🔥Сложное слово",
        }
    }

    /// Callback payload that routes a press back to the bot.
    pub fn callback(&self) -> &'static str {
        match self {
            Button::EasyWord => "easyWord",
            Button::HardWord => "hardWord",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Button>,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        for button in &self.buttons {
            write!(f, " [{}|{}]", button.label(), button.callback())?;
        }
        Ok(())
    }
}

pub struct Bot {
    words: WordList,
    hard_unlock_threshold: u32,
}

impl Bot {
    pub fn new(words: WordList, hard_unlock_threshold: u32) -> Self {
        Self {
            words,
            hard_unlock_threshold,
        }
    }

    /// Applies one user event to the store and builds the reply.
    ///
    /// Callers must run this on the serial queue: it reads and writes `store`.
    pub fn handle<R: Rng>(&self, store: &mut UserStore, event: &Event, rng: &mut R) -> Reply {
        match event {
            Event::Start { user } => {
                store.ensure(user);
                Reply {
                    text: PROMPT.to_string(),
                    buttons: vec![Button::EasyWord],
                }
            }
            Event::EasyWord { user } => match store.get_mut(user) {
                Some(record) => {
                    record.count = record.count.saturating_add(1);
                    let count = record.count;
                    self.word_reply(Some(count), rng)
                }
                None => Reply {
                    text: UNKNOWN_USER.to_string(),
                    buttons: Vec::new(),
                },
            },
            Event::HardWord { user } => {
                let count = store.get(user).map(|r| r.count);
                self.word_reply(count, rng)
            }
        }
    }

    fn word_reply<R: Rng>(&self, count: Option<u32>, rng: &mut R) -> Reply {
        Reply {
            text: self.words.random(rng).to_string(),
            buttons: self.keyboard(count),
        }
    }

    /// Hard words unlock once a user has asked for enough easy ones. Users without
    /// a record see the full keyboard.
    fn keyboard(&self, count: Option<u32>) -> Vec<Button> {
        match count {
            Some(count) if count < self.hard_unlock_threshold => vec![Button::EasyWord],
            _ => vec![Button::EasyWord, Button::HardWord],
        }
    }
}
