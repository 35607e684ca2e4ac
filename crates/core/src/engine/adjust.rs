//! Weather adjuster: observation -> demand multiplier + reserve bump.
//!
//! Pure function of the observation and the policy; no randomness. Product
//! specific behaviour is data-driven through [`OverrideTable`].

use std::collections::BTreeMap;

use crate::domain::weather::{
    ConditionTag, TemperatureBand, WeatherAdjustment, WeatherObservation, WeatherSignal,
};
use crate::engine::config::{OverrideRule, WeatherPolicy};

pub fn classify_temperature(temperature: f64, policy: &WeatherPolicy) -> TemperatureBand {
    if temperature > policy.hot_threshold {
        TemperatureBand::Hot
    } else if temperature < policy.cold_threshold {
        TemperatureBand::Cold
    } else {
        TemperatureBand::Normal
    }
}

/// Map one observation to the request-wide adjustment.
pub fn adjust(observation: &WeatherObservation, policy: &WeatherPolicy) -> WeatherAdjustment {
    let band = classify_temperature(observation.temperature, policy);
    let effect = match band {
        TemperatureBand::Hot => policy.hot,
        TemperatureBand::Cold => policy.cold,
        TemperatureBand::Normal if observation.condition == ConditionTag::Rain => policy.rain,
        TemperatureBand::Normal => policy.normal,
    };

    WeatherAdjustment {
        demand_multiplier: effect.demand_multiplier,
        reserve_bump: effect.reserve_bump,
        signal: Some(WeatherSignal {
            band,
            condition: observation.condition,
        }),
    }
}

/// Effect of all matching override rules on one product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductEffect {
    pub reserve_add: i32,
    pub demand_factor: f64,
}

impl ProductEffect {
    pub const NONE: ProductEffect = ProductEffect {
        reserve_add: 0,
        demand_factor: 1.0,
    };
}

/// Override rules plus the product tag catalogue they can target.
#[derive(Debug, Clone, Copy)]
pub struct OverrideTable<'a> {
    rules: &'a [OverrideRule],
    tags: &'a BTreeMap<String, Vec<String>>,
}

impl<'a> OverrideTable<'a> {
    pub fn new(rules: &'a [OverrideRule], tags: &'a BTreeMap<String, Vec<String>>) -> Self {
        Self { rules, tags }
    }

    pub fn effect_for(&self, product_id: &str, signal: Option<WeatherSignal>) -> ProductEffect {
        let Some(signal) = signal else {
            return ProductEffect::NONE;
        };

        let mut effect = ProductEffect::NONE;
        for rule in self.rules {
            if rule_fires(rule, signal) && self.targets(rule, product_id) {
                effect.reserve_add = effect.reserve_add.saturating_add(rule.reserve_add);
                effect.demand_factor *= rule.demand_factor.unwrap_or(1.0);
            }
        }
        effect
    }

    /// The request-wide adjustment specialised for one product.
    pub fn for_product(&self, base: WeatherAdjustment, product_id: &str) -> WeatherAdjustment {
        let effect = self.effect_for(product_id, base.signal);
        WeatherAdjustment {
            demand_multiplier: base.demand_multiplier * effect.demand_factor,
            reserve_bump: base.reserve_bump.saturating_add(effect.reserve_add),
            signal: base.signal,
        }
    }

    fn targets(&self, rule: &OverrideRule, product_id: &str) -> bool {
        if let Some(product) = &rule.product {
            return same_id(product, product_id);
        }
        let Some(tag) = &rule.tag else {
            return false;
        };
        self.tags
            .iter()
            .filter(|(id, _)| same_id(id, product_id))
            .any(|(_, tags)| tags.iter().any(|t| same_id(t, tag)))
    }
}

fn rule_fires(rule: &OverrideRule, signal: WeatherSignal) -> bool {
    rule.band.map_or(true, |b| b == signal.band) && rule.condition.map_or(true, |c| c == signal.condition)
}

fn same_id(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
