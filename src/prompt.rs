use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::collections::VecDeque;

use crate::error::PromptError;
use crate::path::PathDescriptor;

/// Answer to "the destination already exists".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictChoice {
    Overwrite,
    /// New base name; the extension is kept.
    Rename(String),
    Skip,
}

/// The only place execution blocks on the user.
pub trait Prompter {
    fn resolve_conflict(&mut self, input: &PathDescriptor, output: &PathDescriptor) -> Result<ConflictChoice, PromptError>;

    fn confirm(&mut self, message: &str) -> Result<bool, PromptError>;
}

/// Terminal prompts. Escape or `q` aborts.
#[derive(Default)]
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for DialoguerPrompter {
    fn resolve_conflict(&mut self, input: &PathDescriptor, output: &PathDescriptor) -> Result<ConflictChoice, PromptError> {
        let choice = Select::with_theme(&self.theme)
            .with_prompt(format!("{} already exists ({} → {})", output, input, output))
            .items(&["Overwrite", "Input a new name", "Skip"])
            .default(0)
            .interact_opt()?
            .ok_or(PromptError::Aborted)?;
        match choice {
            0 => Ok(ConflictChoice::Overwrite),
            1 => {
                let name: String = Input::with_theme(&self.theme)
                    .with_prompt("New File Name")
                    .with_initial_text(output.base_name())
                    .interact_text()?;
                Ok(ConflictChoice::Rename(name.trim().to_string()))
            }
            _ => Ok(ConflictChoice::Skip),
        }
    }

    fn confirm(&mut self, message: &str) -> Result<bool, PromptError> {
        Confirm::with_theme(&self.theme)
            .with_prompt(message)
            .default(false)
            .interact_opt()?
            .ok_or(PromptError::Aborted)
    }
}

/// A canned answer for [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Choice(ConflictChoice),
    Confirm(bool),
    Abort,
}

/// Replays queued answers; an empty queue aborts.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Scripted>,
    /// Every conflict it was asked about, as (input, output) absolute paths.
    pub asked: Vec<(std::path::PathBuf, std::path::PathBuf)>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn resolve_conflict(&mut self, input: &PathDescriptor, output: &PathDescriptor) -> Result<ConflictChoice, PromptError> {
        self.asked.push((input.abs().to_path_buf(), output.abs().to_path_buf()));
        match self.answers.pop_front() {
            Some(Scripted::Choice(choice)) => Ok(choice),
            _ => Err(PromptError::Aborted),
        }
    }

    fn confirm(&mut self, _message: &str) -> Result<bool, PromptError> {
        match self.answers.pop_front() {
            Some(Scripted::Confirm(answer)) => Ok(answer),
            _ => Err(PromptError::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn scripted_answers_are_replayed_in_order() {
        let cwd = Path::new("/w");
        let a = PathDescriptor::new("a.txt", cwd).unwrap();
        let b = PathDescriptor::new("b.txt", cwd).unwrap();
        let mut prompter = ScriptedPrompter::new([
            Scripted::Choice(ConflictChoice::Skip),
            Scripted::Confirm(true),
        ]);

        assert_eq!(prompter.resolve_conflict(&a, &b).unwrap(), ConflictChoice::Skip);
        assert!(prompter.confirm("go?").unwrap());
        assert!(matches!(prompter.confirm("again?"), Err(PromptError::Aborted)));
        assert_eq!(prompter.asked, vec![(a.abs().to_path_buf(), b.abs().to_path_buf())]);
    }
}
