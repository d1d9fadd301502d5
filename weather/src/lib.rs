pub mod config;
pub mod openmeteo;
pub mod provider;
pub mod types;
pub mod wmo;

pub use config::OpenMeteoConfig;
pub use openmeteo::OpenMeteoProvider;
pub use provider::{ForecastProvider, WeatherError, WeatherResult};
pub use types::{DirectionRange, Forecast, Timeline, WeatherSample, Waypoint};
pub use wmo::{describe, Language, WmoInfo};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::openmeteo::*;
    pub use crate::provider::*;
    pub use crate::types::*;
    pub use crate::wmo::*;
}
