//! Output formatting and terminal rendering

use std::{path::Path, time::Duration};

use colored::Colorize;

use crate::batch::BatchReport;

/// Shortens `text` to at most `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Output handler for terminal display
pub struct OutputHandler {
    pub quiet: bool,
}

impl OutputHandler {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Print a boxed title
    pub fn print_banner(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("{}", "═".repeat(70).bright_cyan());
        println!("  {}", title.bright_white().bold());
        println!("{}", "═".repeat(70).bright_cyan());
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("{}", format!("▶ {}", text).bright_yellow().bold());
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Print a `key: value` settings line
    pub fn print_setting(&self, key: &str, value: &str) {
        if self.quiet {
            return;
        }
        println!("  {} {}", format!("{key}:").dimmed(), value.bright_white());
    }

    /// Print a success message
    pub fn print_success(&self, text: &str) {
        println!("{} {}", "✓".bright_green(), text.bright_white());
    }

    /// Print an error message
    pub fn print_error(&self, text: &str) {
        println!("{} {}", "✗".bright_red(), text.bright_red());
    }

    /// Print a warning message
    pub fn print_warning(&self, text: &str) {
        println!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    /// Print an info message
    pub fn print_info(&self, text: &str) {
        if self.quiet {
            return;
        }
        println!("{} {}", "ℹ".bright_blue(), text);
    }

    pub fn print_item_start(&self, position: usize, total: usize, label: &str) {
        println!();
        println!(
            "{} {}",
            format!("[{}/{}]", position, total).bright_cyan().bold(),
            label.bright_white()
        );
    }

    pub fn print_item_success(&self, elapsed: Duration, output: Option<&Path>) {
        let took = format!("({:.1}s)", elapsed.as_secs_f64());
        match output {
            Some(path) => self.print_success(&format!("{} {}", path.display(), took.dimmed())),
            None => self.print_success(&format!("done {}", took.dimmed())),
        }
    }

    /// Numbered list of file names
    pub fn print_file_list(&self, title: &str, files: &[String]) {
        self.print_header(title);
        if files.is_empty() {
            self.print_warning("No files found");
            return;
        }
        for (i, name) in files.iter().enumerate() {
            println!("{:>3}. {}", i + 1, name.bright_white());
        }
    }

    /// Templates table: name, description, localized description
    pub fn print_templates_table(&self, rows: &[(String, String, Option<String>)]) {
        println!();
        println!(
            "{}",
            format!("{:<28} {:<40}", "Template", "Description").bright_white().bold()
        );
        println!("{}", "─".repeat(70).dimmed());

        for (name, description, localized) in rows {
            println!("{:<28} {:<40}", name.bright_cyan(), truncate(description, 40));
            if let Some(localized) = localized {
                println!("{:<28} {}", "", truncate(localized, 40).dimmed());
            }
        }
        println!();
    }

    /// Element categories table: name, value count, description
    pub fn print_categories_table(&self, rows: &[(String, usize, String)]) {
        println!(
            "{}",
            format!("{:<28} {:>7}  {:<34}", "Category", "Values", "Description")
                .bright_white()
                .bold()
        );
        println!("{}", "─".repeat(70).dimmed());

        for (name, count, description) in rows {
            println!(
                "{:<28} {:>7}  {:<34}",
                name.bright_cyan(),
                count,
                truncate(description, 34).dimmed()
            );
        }
        println!();
    }

    /// Print the end-of-batch summary
    pub fn print_summary(&self, title: &str, report: &BatchReport) {
        let border = if report.all_succeeded() {
            "═".repeat(70).bright_green()
        } else {
            "═".repeat(70).bright_yellow()
        };

        println!();
        println!("{}", border);
        println!("  {}", title.bright_white().bold());
        println!("{}", border);
        println!(
            "  {} {}",
            "Succeeded:".dimmed(),
            report.succeeded().to_string().bright_green()
        );
        let failed = report.failed().to_string();
        println!(
            "  {} {}",
            "Failed:   ".dimmed(),
            if report.failed() == 0 { failed.normal() } else { failed.bright_red() }
        );
        println!(
            "  {} {:.1}s",
            "Total:    ".dimmed(),
            report.total.as_secs_f64()
        );
        if let Some(average) = report.average_success_time() {
            println!(
                "  {} {:.1}s per item",
                "Average:  ".dimmed(),
                average.as_secs_f64()
            );
        }

        let produced: Vec<_> = report.items.iter().filter(|i| i.success).collect();
        if !produced.is_empty() {
            println!();
            println!("  {}", "Produced:".bright_green().bold());
            for item in produced {
                let target = item
                    .output
                    .as_ref()
                    .map_or_else(|| item.label.clone(), |p| p.display().to_string());
                println!("    {} {}", "✓".bright_green(), target);
                if let Some(prompt) = &item.prompt {
                    println!("      {}", truncate(prompt, 60).dimmed());
                }
            }
        }

        let failures: Vec<_> = report.items.iter().filter(|i| !i.success).collect();
        if !failures.is_empty() {
            println!();
            println!("  {}", "Failures:".bright_red().bold());
            for item in failures {
                println!(
                    "    {} {}: {}",
                    "✗".bright_red(),
                    item.label,
                    item.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        println!("{}", border);
        println!();
    }
}
