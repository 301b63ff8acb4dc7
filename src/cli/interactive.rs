use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::SolutionEntry;
use crate::platform::Interrupts;
use crate::selection::{Choice, SolutionGroup, SolutionIndex, parse_choice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Line(String),
    Eof,
    Interrupted,
}

pub(crate) trait LineSource {
    fn read_line(&mut self) -> Result<Input>;
}

/// Reads answers from stdin while watching for Ctrl-C.
///
/// Each line is read on its own short-lived thread so no reader is left
/// consuming stdin once selection is over and the executor inherits it.
pub(crate) struct TerminalInput {
    interrupts: Interrupts,
    poll_interval: Duration,
}

impl TerminalInput {
    pub(crate) fn new(interrupts: Interrupts) -> Self {
        Self {
            interrupts,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl LineSource for TerminalInput {
    fn read_line(&mut self) -> Result<Input> {
        if self.interrupts.take() {
            return Ok(Input::Interrupted);
        }
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("prompt-stdin".to_string())
            .spawn(move || {
                let mut line = String::new();
                let res = io::stdin().lock().read_line(&mut line).map(|n| (n, line));
                let _ = tx.send(res);
            })
            .context("failed to spawn stdin reader")?;

        loop {
            match rx.recv_timeout(self.poll_interval) {
                Ok(Ok((0, _))) => return Ok(Input::Eof),
                Ok(Ok((_, line))) => return Ok(Input::Line(line)),
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {
                    return Ok(Input::Interrupted);
                }
                Ok(Err(err)) => return Err(err).context("failed to read from stdin"),
                Err(RecvTimeoutError::Timeout) => {
                    if self.interrupts.take() {
                        return Ok(Input::Interrupted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(Input::Eof),
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct ReaderInput<R> {
    reader: R,
}

#[cfg(test)]
impl<R: BufRead> ReaderInput<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[cfg(test)]
impl<R: BufRead> LineSource for ReaderInput<R> {
    fn read_line(&mut self) -> Result<Input> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .context("failed to read input")?;
        if n == 0 {
            return Ok(Input::Eof);
        }
        Ok(Input::Line(line))
    }
}

/// Walks the operator through issue then solution selection. `None` means
/// nothing was selected (quit, end of input, or Ctrl-C).
pub(crate) fn select_interactively(
    index: &SolutionIndex,
    input: &mut dyn LineSource,
    out: &mut dyn Write,
    color: bool,
) -> Result<Option<SolutionEntry>> {
    if index.is_empty() {
        return Ok(None);
    }
    let several = index.len() > 1;

    loop {
        let group = if several {
            crate::ui::write_group_menu(out, index, color);
            match prompt_group(index, input, out)? {
                Some(group) => group,
                None => return Ok(None),
            }
        } else {
            match index.get(1) {
                Some(group) => group,
                None => return Ok(None),
            }
        };

        crate::ui::write_entry_menu(out, group, color);
        match prompt_entry(index, group, several, input, out)? {
            EntryStep::Selected(entry) => return Ok(Some(entry)),
            EntryStep::Back => continue,
            EntryStep::Cancelled => return Ok(None),
        }
    }
}

enum EntryStep {
    Selected(SolutionEntry),
    Back,
    Cancelled,
}

fn prompt_group<'a>(
    index: &'a SolutionIndex,
    input: &mut dyn LineSource,
    out: &mut dyn Write,
) -> Result<Option<&'a SolutionGroup>> {
    let max = index.len();
    loop {
        write!(out, "Select an issue (1-{max}) or 'q' to quit: ")?;
        out.flush()?;
        let line = match input.read_line()? {
            Input::Line(line) => line,
            Input::Eof | Input::Interrupted => {
                writeln!(out)?;
                return Ok(None);
            }
        };
        match parse_choice(&line, max, false, false) {
            Choice::Pick(n) => return Ok(index.get(n)),
            Choice::Quit => return Ok(None),
            Choice::OutOfRange(_) => writeln!(out, "Please enter a number between 1 and {max}")?,
            Choice::Custom | Choice::Back | Choice::Invalid => {
                writeln!(out, "Please enter a valid number or 'q' to quit")?
            }
        }
    }
}

fn prompt_entry(
    index: &SolutionIndex,
    group: &SolutionGroup,
    allow_back: bool,
    input: &mut dyn LineSource,
    out: &mut dyn Write,
) -> Result<EntryStep> {
    let max = group.len();
    let back_hint = if allow_back { ", 'b' to go back" } else { "" };
    loop {
        write!(
            out,
            "Select a solution to execute (1-{max}), 'c' for a custom solution{back_hint} or 'q' to quit: "
        )?;
        out.flush()?;
        let line = match input.read_line()? {
            Input::Line(line) => line,
            Input::Eof | Input::Interrupted => {
                writeln!(out)?;
                return Ok(EntryStep::Cancelled);
            }
        };
        match parse_choice(&line, max, true, allow_back) {
            Choice::Pick(n) => {
                return Ok(match group.entry(n) {
                    Some(entry) => EntryStep::Selected(entry.clone()),
                    None => EntryStep::Cancelled,
                });
            }
            Choice::Custom => {
                return Ok(match read_custom_text(input, out)? {
                    Some(text) => {
                        EntryStep::Selected(SolutionEntry::custom(index.next_id(), &group.key, text))
                    }
                    None => EntryStep::Cancelled,
                });
            }
            Choice::Back => return Ok(EntryStep::Back),
            Choice::Quit => return Ok(EntryStep::Cancelled),
            Choice::OutOfRange(_) => writeln!(out, "Please enter a number between 1 and {max}")?,
            Choice::Invalid => writeln!(
                out,
                "Please enter a valid number, 'c' for a custom solution{back_hint} or 'q' to quit"
            )?,
        }
    }
}

/// Free text ending at the first blank line after some text, or at end of
/// input. Leading blank lines are skipped.
fn read_custom_text(input: &mut dyn LineSource, out: &mut dyn Write) -> Result<Option<String>> {
    writeln!(out, "Enter your custom solution (finish with an empty line):")?;
    out.flush()?;
    let mut lines: Vec<String> = Vec::new();
    loop {
        match input.read_line()? {
            Input::Line(line) => {
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim().is_empty() {
                    if lines.is_empty() {
                        continue;
                    }
                    break;
                }
                lines.push(line.to_string());
            }
            Input::Eof => break,
            Input::Interrupted => return Ok(None),
        }
    }
    if lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(lines.join("\n")))
}
