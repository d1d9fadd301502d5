//! WMO weather interpretation codes as reported by Open-Meteo.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl FromStr for Language {
    type Err = String;

    /// Accepts `en`, `fr` and locale strings such as `fr_BE.UTF-8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.get(..2).map(|prefix| prefix.to_ascii_lowercase()).as_deref() {
            Some("en") => Ok(Language::En),
            Some("fr") => Ok(Language::Fr),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmoInfo {
    pub emoji: &'static str,
    pub description: &'static str,
}

struct WmoEntry {
    code: u8,
    emoji: &'static str,
    en: &'static str,
    fr: &'static str,
}

const WMO_CODES: &[WmoEntry] = &[
    WmoEntry { code: 0, emoji: "☀️", en: "Clear sky", fr: "Ciel dégagé" },
    WmoEntry { code: 1, emoji: "🌤️", en: "Mainly clear", fr: "Principalement dégagé" },
    WmoEntry { code: 2, emoji: "⛅", en: "Partly cloudy", fr: "Partiellement nuageux" },
    WmoEntry { code: 3, emoji: "☁️", en: "Overcast", fr: "Couvert" },
    WmoEntry { code: 45, emoji: "🌫️", en: "Fog", fr: "Brouillard" },
    WmoEntry { code: 48, emoji: "🌫️❄️", en: "Depositing rime fog", fr: "Brouillard givrant" },
    WmoEntry { code: 51, emoji: "🌦️", en: "Drizzle (light)", fr: "Bruine (légère)" },
    WmoEntry { code: 53, emoji: "🌦️", en: "Drizzle (moderate)", fr: "Bruine (modérée)" },
    WmoEntry { code: 55, emoji: "🌧️", en: "Drizzle (dense)", fr: "Bruine (dense)" },
    WmoEntry { code: 56, emoji: "🌧️❄️", en: "Freezing drizzle (light)", fr: "Bruine verglaçante (légère)" },
    WmoEntry { code: 57, emoji: "🌧️❄️", en: "Freezing drizzle (dense)", fr: "Bruine verglaçante (dense)" },
    WmoEntry { code: 61, emoji: "🌧️", en: "Rain (slight)", fr: "Pluie (faible)" },
    WmoEntry { code: 63, emoji: "🌧️", en: "Rain (moderate)", fr: "Pluie (modérée)" },
    WmoEntry { code: 65, emoji: "🌧️", en: "Rain (heavy)", fr: "Pluie (forte)" },
    WmoEntry { code: 66, emoji: "🌧️❄️", en: "Freezing rain (light)", fr: "Pluie verglaçante (légère)" },
    WmoEntry { code: 67, emoji: "🌧️❄️", en: "Freezing rain (heavy)", fr: "Pluie verglaçante (forte)" },
    WmoEntry { code: 71, emoji: "🌨️", en: "Snowfall (slight)", fr: "Chute de neige (faible)" },
    WmoEntry { code: 73, emoji: "🌨️", en: "Snowfall (moderate)", fr: "Chute de neige (modérée)" },
    WmoEntry { code: 75, emoji: "🌨️", en: "Snowfall (heavy)", fr: "Chute de neige (forte)" },
    WmoEntry { code: 77, emoji: "❄️", en: "Snow grains", fr: "Grains de neige" },
    WmoEntry { code: 80, emoji: "🌦️", en: "Rain showers (slight)", fr: "Averses de pluie (faibles)" },
    WmoEntry { code: 81, emoji: "🌧️", en: "Rain showers (moderate)", fr: "Averses de pluie (modérées)" },
    WmoEntry { code: 82, emoji: "🌧️🌩️", en: "Rain showers (violent)", fr: "Averses de pluie (violentes)" },
    WmoEntry { code: 85, emoji: "🌨️", en: "Snow showers (slight)", fr: "Averses de neige (faibles)" },
    WmoEntry { code: 86, emoji: "🌨️", en: "Snow showers (heavy)", fr: "Averses de neige (fortes)" },
    WmoEntry { code: 95, emoji: "⛈️", en: "Thunderstorm (slight/moderate)", fr: "Orage (léger/modéré)" },
    WmoEntry { code: 96, emoji: "⛈️🌨️", en: "Thunderstorm with slight hail", fr: "Orage avec grêle (faible)" },
    WmoEntry { code: 99, emoji: "⛈️🌨️", en: "Thunderstorm with heavy hail", fr: "Orage avec grêle (forte)" },
];

/// Emoji and description for `code`
pub fn describe(code: u8, language: Language) -> WmoInfo {
    WMO_CODES
        .iter()
        .find(|entry| entry.code == code)
        .map(|entry| WmoInfo {
            emoji: entry.emoji,
            description: match language {
                Language::En => entry.en,
                Language::Fr => entry.fr,
            },
        })
        .unwrap_or(WmoInfo {
            emoji: "❓",
            description: "Unknown",
        })
}
