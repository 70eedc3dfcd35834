use std::io::{BufRead, Write};

/// The only answer that lets a destructive run proceed.
pub const CONFIRMATION_PHRASE: &str = "yes";

/// Gate that must pass before anything on the target is modified.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Non-interactive approval (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Prompt on `writer` and read one answer line from `reader`.
///
/// Only the exact phrase `yes` (line terminator aside) confirms; any other
/// answer, EOF or a read error declines.
pub struct PromptConfirm<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, prompt: &str) -> bool {
        if write!(self.writer, "{prompt}\nType '{CONFIRMATION_PHRASE}' to continue: ").is_err()
            || self.writer.flush().is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match self.reader.read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_confirmation(&answer),
        }
    }
}

pub fn is_confirmation(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']) == CONFIRMATION_PHRASE
}
