use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionTag {
    Clear,
    Cloudy,
    Rain,
    Hot,
    Cold,
    #[default]
    Other,
}

impl ConditionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionTag::Clear => "clear",
            ConditionTag::Cloudy => "cloudy",
            ConditionTag::Rain => "rain",
            ConditionTag::Hot => "hot",
            ConditionTag::Cold => "cold",
            ConditionTag::Other => "other",
        }
    }

    /// Best-effort mapping of a provider's free-text description (English or Russian).
    pub fn from_description(description: &str) -> Self {
        let d = description.trim().to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| d.contains(n));

        if has(&["rain", "drizzle", "shower", "thunder", "дожд", "ливен", "ливн", "гроз", "морос"]) {
            ConditionTag::Rain
        } else if has(&["snow", "frost", "снег", "мороз", "холод", "cold"]) {
            ConditionTag::Cold
        } else if has(&["heat", "hot", "жар", "зно"]) {
            ConditionTag::Hot
        } else if has(&["cloud", "overcast", "облач", "пасмурн", "туман", "fog", "mist"]) {
            ConditionTag::Cloudy
        } else if has(&["clear", "sun", "ясн", "солнеч"]) {
            ConditionTag::Clear
        } else {
            ConditionTag::Other
        }
    }
}

/// Temperature classification against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureBand {
    Cold,
    Normal,
    Hot,
}

/// One weather observation/forecast for the target day. Serialises into the
/// `weather` block of the forecast response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    #[serde(rename = "city", alias = "location", default)]
    pub location: String,
    pub temperature: f64,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "condition", alias = "condition_tag", default)]
    pub condition: ConditionTag,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub wind_speed: f64,
}

impl WeatherObservation {
    /// Fill in whichever of `condition` / `description` the source left out.
    pub fn normalized(mut self) -> Self {
        if self.condition == ConditionTag::Other && !self.description.trim().is_empty() {
            self.condition = ConditionTag::from_description(&self.description);
        }
        if self.description.trim().is_empty() {
            self.description = self.condition.as_str().to_string();
        }
        self.location = self.location.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherSignal {
    pub band: TemperatureBand,
    pub condition: ConditionTag,
}

/// Output of the weather adjuster.
///
/// `signal` is `None` for the neutral fallback; product override rules only
/// fire when a real observation was classified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherAdjustment {
    pub demand_multiplier: f64,
    pub reserve_bump: i32,
    pub signal: Option<WeatherSignal>,
}

impl WeatherAdjustment {
    pub fn neutral() -> Self {
        Self {
            demand_multiplier: 1.0,
            reserve_bump: 0,
            signal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_descriptions_to_tags() {
        assert_eq!(ConditionTag::from_description("небольшой дождь"), ConditionTag::Rain);
        assert_eq!(ConditionTag::from_description("Light rain"), ConditionTag::Rain);
        assert_eq!(ConditionTag::from_description("ясно"), ConditionTag::Clear);
        assert_eq!(ConditionTag::from_description("пасмурно"), ConditionTag::Cloudy);
        assert_eq!(ConditionTag::from_description("???"), ConditionTag::Other);
    }

    #[test]
    fn deserializes_observation_with_location_alias_and_infers_condition() {
        let v = json!({
            "location": " Пятигорск ",
            "temperature": 18.0,
            "description": "облачно с прояснениями",
            "humidity": 70,
            "wind_speed": 3.5
        });
        let obs: WeatherObservation = serde_json::from_value(v).unwrap();
        let obs = obs.normalized();
        assert_eq!(obs.location, "Пятигорск");
        assert_eq!(obs.condition, ConditionTag::Cloudy);
    }

    #[test]
    fn serializes_contract_field_names() {
        let obs = WeatherObservation {
            location: "Кисловодск".to_string(),
            temperature: 28.0,
            description: String::new(),
            condition: ConditionTag::Clear,
            humidity: 40.0,
            wind_speed: 2.0,
        }
        .normalized();
        let v = serde_json::to_value(&obs).unwrap();
        assert_eq!(v["city"], "Кисловодск");
        assert_eq!(v["description"], "clear");
        assert_eq!(v["condition"], "clear");
        assert!(v.get("wind_speed").is_some());
        assert!(v.get("humidity").is_some());
    }
}
