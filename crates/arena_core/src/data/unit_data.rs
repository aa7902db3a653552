//! Unit templates for data-driven unit definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::combat::{scale_by_star, MAX_STAR_LEVEL};
use crate::components::{Position, Side, Stats, UnitId, UnitState, DEFAULT_MAX_MANA};
use crate::effects::{EffectSpec, Skill};
use crate::error::{ArenaError, Result};
use crate::math::{fixed_float, Fixed};

/// Data-driven unit definition.
///
/// Max HP and attack are 1-star values; [`UnitTemplate::instantiate`]
/// scales them by star level.
///
/// # Example RON
///
/// ```ron
/// UnitTemplate(
///     id: "ember_mage",
///     name: "Ember Mage",
///     max_hp: 70,
///     attack: 9,
///     attack_speed: 0.8,
///     mana_on_attack: 20,
///     position: back,
///     skill: Some(Skill(
///         name: "Fire Rain",
///         effects: [damage(amount: 25, target: all_enemies)],
///     )),
///     passives: [kill_buff(stat: attack, value: 2.0)],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Unique identifier referenced by scenarios.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Maximum HP at 1 star.
    pub max_hp: i32,

    /// Attack at 1 star.
    pub attack: i32,

    /// Flat damage reduction.
    #[serde(default)]
    pub defense: i32,

    /// Attacks per second.
    #[serde(with = "fixed_float")]
    pub attack_speed: Fixed,

    /// Mana needed to cast the skill.
    #[serde(default = "default_max_mana")]
    pub max_mana: i32,

    /// Mana at combat start.
    #[serde(default)]
    pub starting_mana: i32,

    /// Mana gained per landed attack.
    #[serde(default)]
    pub mana_on_attack: i32,

    /// Mana gained per second.
    #[serde(default)]
    pub mana_regen: i32,

    /// Default board row.
    #[serde(default)]
    pub position: Position,

    /// Skill cast at full mana.
    #[serde(default)]
    pub skill: Option<Skill>,

    /// Trait effects applied at combat start.
    #[serde(default)]
    pub passives: Vec<EffectSpec>,

    /// Free-form tags (e.g. "mage", "tank").
    #[serde(default)]
    pub tags: Vec<String>,
}

const fn default_max_mana() -> i32 {
    DEFAULT_MAX_MANA
}

impl UnitTemplate {
    /// Check if this template has the specified tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Reject values no unit could be built from.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidUnit`] or [`ArenaError::InvalidEffect`]
    /// for the first problem found.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(ArenaError::InvalidUnit {
                unit: format!("template '{}'", self.id),
                reason,
            })
        };
        if self.id.is_empty() {
            return fail("empty id".to_string());
        }
        if self.max_hp < 1 {
            return fail(format!("max_hp must be at least 1, got {}", self.max_hp));
        }
        if self.attack < 0 || self.defense < 0 {
            return fail("attack and defense must not be negative".to_string());
        }
        if self.attack_speed <= Fixed::ZERO {
            return fail(format!("attack_speed must be positive, got {}", self.attack_speed));
        }
        if self.max_mana < 0 || self.starting_mana < 0 || self.starting_mana > self.max_mana {
            return fail(format!(
                "starting_mana {} outside 0..={}",
                self.starting_mana, self.max_mana
            ));
        }
        if self.mana_on_attack < 0 || self.mana_regen < 0 {
            return fail("mana gains must not be negative".to_string());
        }
        if let Some(skill) = &self.skill {
            skill.validate()?;
        }
        for passive in &self.passives {
            passive.validate(&self.id)?;
        }
        Ok(())
    }

    /// Build a combat unit at the given star level.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidUnit`] for an unsupported star level.
    pub fn instantiate(
        &self,
        id: UnitId,
        side: Side,
        star_level: u8,
        position: Option<Position>,
    ) -> Result<UnitState> {
        let scale = |base: i32| {
            scale_by_star(base, star_level).ok_or_else(|| ArenaError::InvalidUnit {
                unit: format!("template '{}'", self.id),
                reason: format!("star level must be 1..={MAX_STAR_LEVEL}, got {star_level}"),
            })
        };
        let stats = Stats::new(scale(self.attack)?, self.defense, self.attack_speed)
            .with_mana_gain(self.mana_on_attack, self.mana_regen);

        let mut unit = UnitState::new(id, self.name.clone(), side, scale(self.max_hp)?, stats)
            .with_position(position.unwrap_or(self.position))
            .with_mana(self.starting_mana, self.max_mana)
            .with_template(self.id.clone(), star_level);
        unit.skill.clone_from(&self.skill);
        unit.passives.clone_from(&self.passives);
        Ok(unit)
    }
}

/// Validated set of templates keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, UnitTemplate>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RON list of templates. Every template is validated before
    /// the registry is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::DataParseError`] naming `origin` if the text
    /// does not parse, or the first validation error.
    pub fn from_ron_str(input: &str, origin: &str) -> Result<Self> {
        let templates: Vec<UnitTemplate> = ron::from_str(input).map_err(|e| ArenaError::DataParseError {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        let mut registry = Self::new();
        for template in templates {
            registry.insert(template)?;
        }
        tracing::debug!(origin, templates = registry.len(), "Loaded unit templates");
        Ok(registry)
    }

    /// Validate and add a template.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or [`ArenaError::InvalidUnit`] for a
    /// duplicate id.
    pub fn insert(&mut self, template: UnitTemplate) -> Result<()> {
        template.validate()?;
        if self.templates.contains_key(&template.id) {
            return Err(ArenaError::InvalidUnit {
                unit: format!("template '{}'", template.id),
                reason: "duplicate template id".to_string(),
            });
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Look up a template.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::UnknownTemplate`] if no template has this id.
    pub fn get(&self, id: &str) -> Result<&UnitTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| ArenaError::UnknownTemplate(id.to_string()))
    }

    /// Templates in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitTemplate> {
        self.templates.values()
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATES: &str = r#"[
        UnitTemplate(
            id: "squire",
            name: "Squire",
            max_hp: 100,
            attack: 10,
            defense: 2,
            attack_speed: 1.0,
            tags: ["tank"],
        ),
        UnitTemplate(
            id: "ember_mage",
            name: "Ember Mage",
            max_hp: 70,
            attack: 9,
            attack_speed: 0.8,
            mana_on_attack: 20,
            position: back,
            skill: Some(Skill(
                name: "Fire Rain",
                effects: [damage(amount: 25, target: all_enemies)],
            )),
            passives: [kill_buff(stat: attack, value: 2.0)],
        ),
    ]"#;

    #[test]
    fn test_registry_parses_and_validates() {
        let registry = TemplateRegistry::from_ron_str(TEMPLATES, "inline").unwrap();
        assert_eq!(registry.len(), 2);
        let mage = registry.get("ember_mage").unwrap();
        assert_eq!(mage.position, Position::Back);
        assert_eq!(mage.max_mana, DEFAULT_MAX_MANA);
        assert!(registry.get("squire").unwrap().has_tag("tank"));
        assert!(matches!(
            registry.get("dragon"),
            Err(ArenaError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_instantiate_scales_by_star() {
        let registry = TemplateRegistry::from_ron_str(TEMPLATES, "inline").unwrap();
        let squire = registry.get("squire").unwrap();

        let one = squire.instantiate(1, Side::Player, 1, None).unwrap();
        assert_eq!((one.max_hp, one.hp, one.stats.attack), (100, 100, 10));

        let three = squire
            .instantiate(2, Side::Opponent, 3, Some(Position::Back))
            .unwrap();
        assert_eq!((three.max_hp, three.stats.attack), (324, 32));
        assert_eq!(three.stats.defense, 2);
        assert_eq!(three.position, Position::Back);
        assert_eq!(three.template_id.as_deref(), Some("squire"));

        assert!(squire.instantiate(3, Side::Player, 4, None).is_err());
    }

    #[test]
    fn test_unknown_effect_fails_at_load() {
        let bad = r#"[UnitTemplate(
            id: "x", name: "X", max_hp: 10, attack: 1, attack_speed: 1.0,
            passives: [gold_reward(amount: 3)],
        )]"#;
        assert!(matches!(
            TemplateRegistry::from_ron_str(bad, "bad.ron"),
            Err(ArenaError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_at_load() {
        let bad = r#"[UnitTemplate(
            id: "x", name: "X", max_hp: 0, attack: 1, attack_speed: 1.0,
        )]"#;
        assert!(matches!(
            TemplateRegistry::from_ron_str(bad, "bad.ron"),
            Err(ArenaError::InvalidUnit { .. })
        ));

        let empty_skill = r#"[UnitTemplate(
            id: "x", name: "X", max_hp: 10, attack: 1, attack_speed: 1.0,
            skill: Some(Skill(name: "Nothing", effects: [])),
        )]"#;
        assert!(matches!(
            TemplateRegistry::from_ron_str(empty_skill, "bad.ron"),
            Err(ArenaError::InvalidEffect { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dup = r#"[
            UnitTemplate(id: "x", name: "X", max_hp: 10, attack: 1, attack_speed: 1.0),
            UnitTemplate(id: "x", name: "Y", max_hp: 10, attack: 1, attack_speed: 1.0),
        ]"#;
        assert!(TemplateRegistry::from_ron_str(dup, "dup.ron").is_err());
    }
}
