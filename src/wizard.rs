//! Interactive prompt sequence used by `--wizard`.

use anyhow::{Context, Result, anyhow};
use console::style;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::command::args::ProvisionInputs;

pub struct Wizard<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask for every input, offering `defaults` for blank answers.
    /// The project name has no fallback unless one was passed on the command line.
    pub fn collect(&mut self, defaults: ProvisionInputs) -> Result<ProvisionInputs> {
        let project_name = self
            .ask(
                "Enter the name of your repo / project",
                defaults.project_name.as_deref(),
            )?
            .or(defaults.project_name)
            .ok_or_else(|| anyhow!("Project name must not be empty"))?;

        let namespace = self
            .ask("Enter the project namespace", Some(defaults.namespace.as_str()))?
            .unwrap_or(defaults.namespace);

        let template_url = self
            .ask(
                "Enter the template repository to copy to the newly created repo",
                Some(defaults.template_url.as_str()),
            )?
            .unwrap_or(defaults.template_url);

        let dest_base_url = self
            .ask(
                "Enter the URL base for the new project (without namespace or project)",
                Some(defaults.dest_base_url.as_str()),
            )?
            .unwrap_or(defaults.dest_base_url);

        let target_display = defaults.target_path.display().to_string();
        let target_path = self
            .ask("Enter the local path to copy files into", Some(target_display.as_str()))?
            .map(PathBuf::from)
            .unwrap_or(defaults.target_path);

        Ok(ProvisionInputs {
            project_name: Some(project_name),
            namespace,
            template_url,
            dest_base_url,
            target_path,
        })
    }

    /// Show a failure and wait for the user to press enter.
    pub fn acknowledge_failure(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{} {}", style("FAIL:").red().bold(), message)?;
        write!(self.output, "Press enter to exit.")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .context("Failed to read input")?;
        Ok(())
    }

    /// Returns `None` for a blank answer (or end of input).
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(value) if !value.is_empty() => write!(
                self.output,
                "{} {}: ",
                question,
                style(format!("(leave blank for '{}')", value)).dim()
            )?,
            _ => write!(self.output, "{}: ", question)?,
        }
        self.output.flush().context("Failed to flush output")?;

        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .context("Failed to read input")?;
        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }
}
