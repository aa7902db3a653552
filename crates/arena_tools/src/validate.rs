//! Data loading and validation.
//!
//! The core only parses strings; this module owns the file IO.

use std::fs;
use std::path::{Path, PathBuf};

use arena_core::components::Teams;
use arena_core::data::{Scenario, TemplateRegistry};
use arena_core::error::ArenaError;

use crate::error::{Result, ToolError};

/// Summary of a validated data set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Template files read.
    pub template_files: usize,
    /// Templates registered.
    pub templates: usize,
    /// Scenarios that built valid teams.
    pub scenarios: usize,
}

/// `.ron` files directly inside `dir`, sorted by name.
fn ron_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ToolError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ToolError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ToolError::io(path, e))
}

/// Load templates from one RON file or from every `.ron` file in a
/// directory. Ids must be unique across files.
///
/// # Errors
///
/// Returns an IO error, the first parse or validation error, or
/// [`ToolError::NoDataFiles`] for a directory without data.
pub fn load_templates(path: &Path) -> Result<TemplateRegistry> {
    let files = if path.is_dir() {
        let files = ron_files(path)?;
        if files.is_empty() {
            return Err(ToolError::NoDataFiles(path.to_path_buf()));
        }
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut registry = TemplateRegistry::new();
    for file in &files {
        let origin = file.display().to_string();
        let parsed = TemplateRegistry::from_ron_str(&read(file)?, &origin)?;
        for template in parsed.iter() {
            registry.insert(template.clone())?;
        }
        tracing::debug!(file = %origin, templates = parsed.len(), "Loaded template file");
    }
    Ok(registry)
}

/// Load one scenario file.
///
/// # Errors
///
/// Returns an IO error or the scenario's parse/config error.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let origin = path.display().to_string();
    Ok(Scenario::from_ron_str(&read(path)?, &origin)?)
}

/// Build a scenario's teams and check them the way the simulator will.
///
/// # Errors
///
/// Returns the first unknown template or invalid unit.
pub fn check_scenario(scenario: &Scenario, registry: &TemplateRegistry) -> Result<Teams> {
    let (team_a, team_b) = scenario.build_teams(registry)?;
    let teams = Teams::new(team_a, team_b);
    teams.validate()?;
    if teams.player.is_empty() || teams.opponent.is_empty() {
        tracing::warn!(scenario = %scenario.name, "Scenario has an empty team");
    }
    Ok(teams)
}

/// Validate every template file in `path`, and every scenario in
/// `scenarios` against those templates when given.
///
/// # Errors
///
/// Returns the first failure found.
pub fn validate_data_directory(path: &Path, scenarios: Option<&Path>) -> Result<ValidationReport> {
    let template_files = if path.is_dir() { ron_files(path)?.len() } else { 1 };
    let registry = load_templates(path)?;
    let mut report = ValidationReport {
        template_files,
        templates: registry.len(),
        scenarios: 0,
    };

    if let Some(dir) = scenarios {
        for file in ron_files(dir)? {
            let scenario = load_scenario(&file)?;
            check_scenario(&scenario, &registry).map_err(|e| match e {
                ToolError::Core(ArenaError::UnknownTemplate(name)) => ToolError::Core(ArenaError::DataParseError {
                    origin: file.display().to_string(),
                    message: format!("unknown template '{name}'"),
                }),
                other => other,
            })?;
            report.scenarios += 1;
        }
    }

    tracing::info!(
        templates = report.templates,
        files = report.template_files,
        scenarios = report.scenarios,
        "Data validated"
    );
    Ok(report)
}
