//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::Style;
use fman_ops::{
    ConfigurationInfo, ConfigureReport, FeatureInfo, InstallReport, OperationResult,
    RemoveReport, RevertReport, SiteInfo,
};
use fman_types::{ActivityStatus, FeatureStatus, StatusReport};
use std::io;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    json_output: bool,
    colors: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool, colors: bool) -> Self {
        Self {
            json_output,
            colors,
        }
    }

    /// Render operation result
    pub fn render_result(&self, result: &OperationResult) -> io::Result<()> {
        if self.json_output {
            let json = result.to_json().map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }
        match result {
            OperationResult::FeatureList(features) => self.render_feature_list(features),
            OperationResult::SiteList(sites) => self.render_site_list(sites),
            OperationResult::Site(site) => self.render_site_list(std::slice::from_ref(site)),
            OperationResult::Status(report) => self.render_status(report),
            OperationResult::History(history) => self.render_history(history),
            OperationResult::Configuration(info) => {
                self.render_history(std::slice::from_ref(info))
            }
            OperationResult::InstallReport(report) => self.render_install_report(report),
            OperationResult::RemoveReport(report) => self.render_remove_report(report),
            OperationResult::ConfigureReport(report) => self.render_configure_report(report),
            OperationResult::RevertReport(report) => self.render_revert_report(report),
            OperationResult::Success(message) => {
                println!("{}", self.paint(&Style::new().green(), message));
                Ok(())
            }
        }
    }

    fn table(headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                headers
                    .iter()
                    .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                    .collect::<Vec<_>>(),
            );
        table
    }

    fn render_feature_list(&self, features: &[FeatureInfo]) -> io::Result<()> {
        if features.is_empty() {
            println!("No features on the configured sites.");
            return Ok(());
        }

        let mut table = Self::table(&["Feature", "Version", "Configured", "Status", "Site"]);
        for feature in features {
            let name = match &feature.label {
                Some(label) => format!("{} ({label})", feature.id),
                None => feature.id.clone(),
            };
            table.add_row(vec![
                Cell::new(name),
                Cell::new(&feature.version),
                Cell::new(if feature.configured { "yes" } else { "no" }),
                self.status_cell(feature.status),
                Cell::new(&feature.site),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn render_site_list(&self, sites: &[SiteInfo]) -> io::Result<()> {
        if sites.is_empty() {
            println!("No configured sites. Add one with `fman site add <path>`.");
            return Ok(());
        }

        let mut table = Self::table(&["Site", "Enabled", "Updatable", "Configured", "Unconfigured"]);
        for site in sites {
            table.add_row(vec![
                Cell::new(&site.url),
                Cell::new(if site.enabled { "yes" } else { "no" }),
                Cell::new(if site.updatable { "yes" } else { "no" }),
                Cell::new(site.configured),
                Cell::new(site.unconfigured),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn render_status(&self, report: &StatusReport) -> io::Result<()> {
        let text = format!("{}: {}", report.feature, status_text(report.status));
        println!("{}", self.paint(&status_style(report.status), &text));
        for reason in &report.reasons {
            println!("  - {reason}");
        }
        Ok(())
    }

    fn render_history(&self, history: &[ConfigurationInfo]) -> io::Result<()> {
        let mut table = Self::table(&["Id", "Created", "Label", "Sites", "Activities"]);
        for configuration in history {
            let mut id = configuration.id.clone();
            if configuration.current {
                id.push_str(" *");
            }
            if configuration.preserved {
                id.push_str(" (preserved)");
            }
            let activities = configuration
                .activities
                .iter()
                .map(|a| {
                    let mark = match a.status {
                        ActivityStatus::Ok => "ok",
                        ActivityStatus::Nok => "failed",
                    };
                    format!("{} {} [{mark}]", a.action, a.label)
                })
                .collect::<Vec<_>>()
                .join("\n");
            table.add_row(vec![
                Cell::new(id),
                Cell::new(configuration.created.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(&configuration.label),
                Cell::new(configuration.sites),
                Cell::new(activities),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn render_install_report(&self, report: &InstallReport) -> io::Result<()> {
        let line = format!(
            "Installed {} into {} in {}ms",
            report.feature, report.site, report.duration_ms
        );
        println!("{}", self.paint(&Style::new().green(), &line));
        println!("Configuration: {}", report.configuration);
        Ok(())
    }

    fn render_remove_report(&self, report: &RemoveReport) -> io::Result<()> {
        let line = format!(
            "Removed {} from {} ({} plugins deleted)",
            report.feature, report.site, report.plugins_removed
        );
        println!("{}", self.paint(&Style::new().green(), &line));
        println!("Configuration: {}", report.configuration);
        Ok(())
    }

    fn render_configure_report(&self, report: &ConfigureReport) -> io::Result<()> {
        if report.refused {
            let line = format!(
                "{} stays configured: a configured feature still includes it",
                report.feature
            );
            println!("{}", self.paint(&Style::new().yellow(), &line));
        } else if report.changed {
            println!("{}", self.paint(&Style::new().green(), &format!("Updated {}", report.feature)));
        } else {
            println!("{} already in the requested state", report.feature);
        }
        if let Some(configuration) = &report.configuration {
            println!("Configuration: {configuration}");
        }
        Ok(())
    }

    fn render_revert_report(&self, report: &RevertReport) -> io::Result<()> {
        let line = format!("Reverted to {}", report.target);
        println!("{}", self.paint(&Style::new().green(), &line));
        println!("Configuration: {}", report.created);
        Ok(())
    }

    fn status_cell(&self, status: FeatureStatus) -> Cell {
        let cell = Cell::new(status_text(status));
        if !self.colors {
            return cell;
        }
        match status {
            FeatureStatus::Happy => cell.fg(Color::Green),
            FeatureStatus::Ambiguous => cell.fg(Color::Yellow),
            FeatureStatus::Unhappy => cell.fg(Color::Red),
            FeatureStatus::Disabled => cell.fg(Color::DarkGrey),
        }
    }

    fn paint(&self, style: &Style, text: &str) -> String {
        if self.colors {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn status_text(status: FeatureStatus) -> &'static str {
    match status {
        FeatureStatus::Happy => "happy",
        FeatureStatus::Ambiguous => "ambiguous",
        FeatureStatus::Unhappy => "unhappy",
        FeatureStatus::Disabled => "disabled",
    }
}

fn status_style(status: FeatureStatus) -> Style {
    match status {
        FeatureStatus::Happy => Style::new().green(),
        FeatureStatus::Ambiguous => Style::new().yellow(),
        FeatureStatus::Unhappy => Style::new().red(),
        FeatureStatus::Disabled => Style::new().dim(),
    }
}
