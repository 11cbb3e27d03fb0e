use std::env;

use crate::calibrate::DEFAULT_OFFSET_M;

#[derive(Debug, Clone)]
pub struct Config {
    pub tide_table_url: String,
    pub data_path: String,
    pub fetch_interval_minutes: u64,
    pub calibration_offset_m: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            tide_table_url: env::var("TIDE_TABLE_URL")?,
            data_path: env::var("DATA_PATH").unwrap_or_else(|_| "tide_data.csv".to_string()),
            fetch_interval_minutes: env::var("FETCH_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            calibration_offset_m: env::var("CALIBRATION_OFFSET_M")
                .unwrap_or_else(|_| DEFAULT_OFFSET_M.to_string())
                .parse()
                .unwrap_or(DEFAULT_OFFSET_M),
        })
    }
}
