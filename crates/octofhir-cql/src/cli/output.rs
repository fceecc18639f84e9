//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use octofhir_cql_requirements::ModuleDefinition;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Compact JSON
    Json,
    /// Indented JSON
    #[default]
    Pretty,
    /// Human-readable tables
    Table,
}

/// Color output preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Set up color output based on user preference
pub fn setup_colors(mode: ColorMode) {
    let enabled = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal(),
    };
    colored::control::set_override(enabled);
}

/// Format an error for display
pub fn format_error(error: &anyhow::Error) -> String {
    format!("{} {:#}", "Error:".red().bold(), error)
}

/// Format a warning for display
pub fn format_warning(warning: &str) -> String {
    format!("{} {}", "Warning:".yellow().bold(), warning)
}

/// Format a success message for display
pub fn format_success(message: &str) -> String {
    format!("{} {}", "Success:".green().bold(), message)
}

/// Write output to a file or stdout
pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    if let Some(path) = output_file {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write to output file: {}", path.display()))?;
        eprintln!(
            "{}",
            format_success(&format!("Output written to {}", path.display()))
        );
    } else {
        println!("{}", content);
    }
    Ok(())
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Depends on")]
    display: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Use")]
    parameter_use: String,
    #[tabled(rename = "Cardinality")]
    cardinality: String,
    #[tabled(rename = "Type")]
    parameter_type: String,
}

#[derive(Tabled)]
struct DataRow {
    #[tabled(rename = "Type")]
    data_type: String,
    #[tabled(rename = "Profiles")]
    profiles: String,
    #[tabled(rename = "Must support")]
    must_support: String,
    #[tabled(rename = "Code filters")]
    code_filters: String,
}

fn table<T: Tabled>(rows: Vec<T>) -> String {
    if rows.is_empty() {
        return "(none)".to_string();
    }
    Table::new(rows).with(Style::modern()).to_string()
}

/// Render a module definition as tables, one per section
pub fn format_as_table(module: &ModuleDefinition) -> String {
    let artifacts = module
        .related_artifact
        .iter()
        .map(|a| ArtifactRow {
            display: a.display.clone(),
            resource: a.resource.clone(),
        })
        .collect();

    let parameters = module
        .parameter
        .iter()
        .map(|p| ParameterRow {
            name: p.name.clone(),
            parameter_use: format!("{:?}", p.parameter_use).to_lowercase(),
            cardinality: format!("{}..{}", p.min, p.max),
            parameter_type: p.parameter_type.clone().unwrap_or_default(),
        })
        .collect();

    let data = module
        .data_requirement
        .iter()
        .map(|d| DataRow {
            data_type: d.data_type.clone(),
            profiles: d.profile.join("\n"),
            must_support: d.must_support.join("\n"),
            code_filters: d
                .code_filter
                .iter()
                .map(|f| match &f.value_set {
                    Some(value_set) => format!("{} in {}", f.path, value_set),
                    None => {
                        let codes: Vec<_> = f.code.iter().map(|c| format!("{}|{}", c.system, c.code)).collect();
                        format!("{} = {}", f.path, codes.join(", "))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect();

    let version = module.version.as_deref().unwrap_or("(unversioned)");
    format!(
        "{} {}\n\n{}\n{}\n\n{}\n{}\n\n{}\n{}",
        module.name.bold(),
        version,
        "Related artifacts".cyan(),
        table::<ArtifactRow>(artifacts),
        "Parameters".cyan(),
        table::<ParameterRow>(parameters),
        "Data requirements".cyan(),
        table::<DataRow>(data),
    )
}

/// Render module definitions in `format`. Several modules render as a JSON
/// array or as consecutive tables.
pub fn format_modules(modules: &[ModuleDefinition], format: OutputFormat) -> Result<String> {
    let json = || -> Result<serde_json::Value> {
        let value = match modules {
            [module] => serde_json::to_value(module),
            _ => serde_json::to_value(modules),
        };
        value.context("Failed to serialize module definition")
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_string(&json()?).context("Failed to serialize JSON")
        }
        OutputFormat::Pretty => {
            serde_json::to_string_pretty(&json()?).context("Failed to serialize JSON")
        }
        OutputFormat::Table => Ok(modules
            .iter()
            .map(format_as_table)
            .collect::<Vec<_>>()
            .join("\n\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cql_requirements::{ElmRequirements, LibraryIdentifier};

    fn empty_module(name: &str) -> ModuleDefinition {
        ModuleDefinition::from_requirements(
            &ElmRequirements::new(LibraryIdentifier::new(name, Some("1.0.0"))),
            None,
        )
    }

    #[test]
    fn test_single_module_renders_as_object() {
        let output = format_modules(&[empty_module("A")], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["resourceType"], "Library");
        assert_eq!(value["name"], "A");
    }

    #[test]
    fn test_several_modules_render_as_array() {
        let output = format_modules(&[empty_module("A"), empty_module("B")], OutputFormat::Pretty).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_table_lists_sections() {
        colored::control::set_override(false);
        let output = format_modules(&[empty_module("A")], OutputFormat::Table).unwrap();
        assert!(output.starts_with("A 1.0.0"));
        assert!(output.contains("Related artifacts\n(none)"));
        assert!(output.contains("Data requirements\n(none)"));
    }
}
