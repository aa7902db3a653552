//! Scenario definitions: two boards plus the simulation config.

use serde::{Deserialize, Serialize};

use super::unit_data::TemplateRegistry;
use crate::components::{Position, Side, UnitState};
use crate::error::{ArenaError, Result};
use crate::simulation::SimConfig;

/// One unit placed on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSlot {
    /// Template id.
    pub template: String,

    /// Star level (1-3).
    #[serde(default = "default_star")]
    pub star: u8,

    /// Row override; the template's row when absent.
    #[serde(default)]
    pub position: Option<Position>,
}

const fn default_star() -> u8 {
    1
}

impl BoardSlot {
    /// A 1-star slot in the template's default row.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            star: 1,
            position: None,
        }
    }
}

/// A fight setup loadable from RON.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "duel",
///     config: (seed: 7, timeout: 5.0),
///     team_a: [BoardSlot(template: "squire", star: 2)],
///     team_b: [BoardSlot(template: "squire")],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Simulation parameters.
    #[serde(default)]
    pub config: SimConfig,

    /// Player board in team order.
    pub team_a: Vec<BoardSlot>,

    /// Opponent board in team order.
    pub team_b: Vec<BoardSlot>,
}

impl Scenario {
    /// Parse a scenario from RON and validate its config.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::DataParseError`] naming `origin` if the text
    /// does not parse, or [`ArenaError::InvalidConfig`].
    pub fn from_ron_str(input: &str, origin: &str) -> Result<Self> {
        let scenario: Self = ron::from_str(input).map_err(|e| ArenaError::DataParseError {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// Build both teams. Unit ids are 1-based slot indices within each side.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownTemplate`] or an instantiation error.
    pub fn build_teams(&self, registry: &TemplateRegistry) -> Result<(Vec<UnitState>, Vec<UnitState>)> {
        Ok((
            Self::build_side(&self.team_a, Side::Player, registry)?,
            Self::build_side(&self.team_b, Side::Opponent, registry)?,
        ))
    }

    fn build_side(slots: &[BoardSlot], side: Side, registry: &TemplateRegistry) -> Result<Vec<UnitState>> {
        slots
            .iter()
            .zip(1..)
            .map(|(slot, id)| registry.get(&slot.template)?.instantiate(id, side, slot.star, slot.position))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;

    const TEMPLATES: &str = r#"[
        UnitTemplate(id: "squire", name: "Squire", max_hp: 100, attack: 10, attack_speed: 1.0),
        UnitTemplate(id: "archer", name: "Archer", max_hp: 60, attack: 12, attack_speed: 1.25, position: back),
    ]"#;

    #[test]
    fn test_scenario_builds_teams() {
        let registry = TemplateRegistry::from_ron_str(TEMPLATES, "inline").unwrap();
        let scenario = Scenario::from_ron_str(
            r#"Scenario(
                name: "skirmish",
                config: (seed: 7, timeout: 5.0),
                team_a: [BoardSlot(template: "squire", star: 2), BoardSlot(template: "archer")],
                team_b: [BoardSlot(template: "archer", position: Some(front))],
            )"#,
            "inline",
        )
        .unwrap();
        assert_eq!(scenario.config.seed, 7);
        assert_eq!(scenario.config.timeout, Fixed::from_num(5));

        let (a, b) = scenario.build_teams(&registry).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!((a[0].id, a[0].max_hp), (1, 180));
        assert_eq!((a[1].id, a[1].position), (2, Position::Back));
        assert_eq!(b[0].side, Side::Opponent);
        assert_eq!(b[0].position, Position::Front);
    }

    #[test]
    fn test_scenario_unknown_template() {
        let registry = TemplateRegistry::from_ron_str(TEMPLATES, "inline").unwrap();
        let scenario = Scenario {
            name: "broken".to_string(),
            description: String::new(),
            config: SimConfig::default(),
            team_a: vec![BoardSlot::new("dragon")],
            team_b: vec![BoardSlot::new("squire")],
        };
        assert!(matches!(
            scenario.build_teams(&registry),
            Err(ArenaError::UnknownTemplate(name)) if name == "dragon"
        ));
    }

    #[test]
    fn test_scenario_rejects_bad_config() {
        let result = Scenario::from_ron_str(
            r#"Scenario(name: "x", config: (dt: 0.0), team_a: [], team_b: [])"#,
            "inline",
        );
        assert!(matches!(result, Err(ArenaError::InvalidConfig(_))));
    }
}
