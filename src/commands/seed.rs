//! Development seed data
//!
//! Seed files are rendered one by one into temporary copies and applied with
//! `psql -f`. The first failing file stops the load.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use pgkit::{TemplateVariables, seed};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::RunContext;
use crate::prompt::Prompter;
use crate::runner::CommandRunner;
use crate::ui;

/// Files applied by `populate_db`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    /// Source files, in the order they ran
    pub applied: Vec<PathBuf>,
    /// Rendered copies still on disk
    pub rendered: Vec<PathBuf>,
}

/// Offer to load the seed tree into the database
///
/// Returns `None` when the operator declines.
pub fn populate_db(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    prompter: &mut dyn Prompter,
) -> Result<Option<SeedReport>> {
    let question = format!("Load development data into {}?", ctx.database());
    if !prompter.confirm(&question, true)? {
        ui::info("Skipping development data");
        return Ok(None);
    }

    let seed_dir = &ctx.workspace.seed_dir;
    let files = seed::discover(seed_dir)
        .with_context(|| format!("Could not scan {}", seed_dir.display()))?;
    if files.is_empty() {
        ui::warn(&format!("No seed files under {}", seed_dir.display()));
        return Ok(Some(SeedReport::default()));
    }

    let vars = ctx.config.template_variables();
    let pb = progress_bar(files.len());
    let result = apply_all(ctx, runner, &files, &vars, &pb);
    pb.finish_and_clear();

    let report = result?;
    ui::success(&format!("Applied {} seed files", report.applied.len()));
    if !report.rendered.is_empty() {
        ui::dim(&format!(
            "Rendered copies left in {}",
            std::env::temp_dir().display()
        ));
    }
    Ok(Some(report))
}

fn apply_all(
    ctx: &RunContext,
    runner: &dyn CommandRunner,
    files: &[PathBuf],
    vars: &TemplateVariables,
    pb: &ProgressBar,
) -> Result<SeedReport> {
    let seed_dir = &ctx.workspace.seed_dir;
    let mut report = SeedReport::default();

    for file in files {
        let rel = display_name(seed_dir, file);
        pb.set_message(rel.clone());

        let sql = seed::render_file(file, vars)
            .with_context(|| format!("Could not render {}", file.display()))?;

        if ctx.options.dry_run {
            let spec = ctx.psql.execute_file(ctx.database(), file);
            pb.suspend(|| runner.run(&spec))?;
            report.applied.push(file.clone());
            pb.inc(1);
            continue;
        }

        let rendered = write_rendered(&sql)?;
        let spec = ctx.psql.execute_file(ctx.database(), &rendered);
        pb.suspend(|| runner.run_checked(&format!("seed {rel}"), &spec))?;

        if ctx.config.seed.cleanup_rendered {
            std::fs::remove_file(&rendered)
                .with_context(|| format!("Could not remove {}", rendered.display()))?;
        } else {
            report.rendered.push(rendered);
        }
        report.applied.push(file.clone());
        pb.inc(1);
    }

    Ok(report)
}

/// Write `sql` to a new temporary file that outlives this process
fn write_rendered(sql: &str) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("prepdev-seed-")
        .suffix(".sql")
        .tempfile()
        .context("Could not create a temporary seed file")?;
    file.write_all(sql.as_bytes())
        .context("Could not write the rendered seed file")?;
    let (_, path) = file
        .keep()
        .context("Could not keep the rendered seed file")?;
    log::debug!("Rendered seed file: {}", path.display());
    Ok(path)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Relative display path of a seed file
pub fn display_name(seed_dir: &Path, file: &Path) -> String {
    file.strip_prefix(seed_dir)
        .unwrap_or(file)
        .display()
        .to_string()
}
