//! Operator interaction
//!
//! Yes/no questions accept English and Portuguese answers (`y`, `yes`, `s`,
//! `sim`, any case); an empty answer takes the default.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use pgkit::MenuInput;

/// Everything the provisioning flow needs to ask
///
/// Menus come from [`MenuInput`] so the same object drives version/cluster
/// selection.
pub trait Prompter: MenuInput {
    /// Ask a yes/no question
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;

    /// Ask for free text, offering `default`
    fn input(&mut self, question: &str, default: &str) -> Result<String>;

    /// Ask for a secret without echo
    fn password(&mut self, question: &str) -> Result<String>;
}

/// Whether `answer` means yes
pub fn is_affirmative(answer: &str, default: bool) -> bool {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() {
        return default;
    }
    matches!(answer.as_str(), "y" | "yes" | "s" | "sim")
}

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{question} {hint}"))
            .allow_empty(true)
            .interact_text()
            .context("Failed to read answer")?;
        Ok(is_affirmative(&answer, default))
    }

    fn input(&mut self, question: &str, default: &str) -> Result<String> {
        Input::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(default.to_string())
            .interact_text()
            .context("Failed to read answer")
    }

    fn password(&mut self, question: &str) -> Result<String> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .interact()
            .context("Failed to read password")
    }
}

impl MenuInput for TerminalPrompter {
    fn show(&mut self, title: &str, options: &[String]) {
        println!();
        println!("{}", title.bold());
        for line in crate::ui::numbered(options) {
            println!("{line}");
        }
    }

    fn read_choice(&mut self) -> std::io::Result<String> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Option")
            .interact_text()
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn reject(&mut self, error: &pgkit::Error) {
        crate::ui::warn(&error.to_string());
    }
}
