//! Damage estimation
//!
//! Armor gives diminishing returns and a fixed fraction of raw damage always
//! lands, so even heavily armored targets take chip damage.

use crate::battlefield::UnitView;
use crate::core::config::DamageConfig;

#[derive(Debug, Clone, Default)]
pub struct DamageModel {
    config: DamageConfig,
}

impl DamageModel {
    pub fn new(config: DamageConfig) -> Self {
        Self { config }
    }

    /// `dmg * scale / (scale + def) + dmg * guaranteed`
    pub fn expected_damage(&self, raw: f32, defense: f32) -> f32 {
        if raw <= 0.0 {
            return 0.0;
        }
        let scale = self.config.armor_scale;
        let mitigated = raw * scale / (scale + defense.max(0.0));
        mitigated + raw * self.config.guaranteed_fraction
    }

    /// Expected damage of a basic attack from `attacker` on `defender`
    pub fn attack_damage(&self, attacker: &UnitView, defender: &UnitView) -> f32 {
        self.expected_damage(
            attacker.attributes.attack as f32,
            defender.attributes.defense as f32,
        )
    }

    /// Whether one basic attack is expected to finish the defender
    pub fn is_lethal(&self, attacker: &UnitView, defender: &UnitView) -> bool {
        self.attack_damage(attacker, defender) >= defender.hp as f32
    }
}
