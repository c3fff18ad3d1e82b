// Domain layer - Forecast data and pure transforms
pub mod dataset;
pub mod forecast;
pub mod series;
