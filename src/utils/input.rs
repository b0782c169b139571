use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

/// Asks for a non-empty line until one is entered.
///
/// Returns `None` on end of input or when the user types `exit`/`quit`.
pub fn input_prompt<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, label: &str) -> Result<Option<String>> {
    loop {
        write!(writer, "{}", label)
            .context("Failed to write prompt")?;
        writer.flush()
            .context("Failed to flush stdout")?;

        let mut user_input = String::new();
        let read = reader.read_line(&mut user_input)
            .context("Failed to read line")?;
        if read == 0 {
            return Ok(None);
        }

        let trimmed = user_input.trim();
        if EXIT_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w)) {
            return Ok(None);
        }
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
        writeln!(writer, "Message cannot be empty. Please try again.")
            .context("Failed to write prompt")?;
    }
}

pub fn input_prompt_stdin(label: &str) -> Result<Option<String>> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut stdout = io::stdout();
    input_prompt(&mut reader, &mut stdout, label)
}
