use crate::data::TimeWindow;
use crate::error::{Result, ScheduleError};
use crate::scheduler::{SlotSource, BASELINE_WINDOW};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Runtime settings, read from `TIMETABLE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Snapshot file loaded at startup and rewritten after each generation.
    pub data_file: Option<PathBuf>,
    pub slots: SlotSource,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("TIMETABLE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse::<SocketAddr>().map_err(|e| {
            ScheduleError::InvalidInput(format!("TIMETABLE_BIND_ADDR '{}': {}", bind_addr, e))
        })?;

        let data_file = lookup("TIMETABLE_DATA_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let window = lookup("TIMETABLE_DEFAULT_WINDOW")
            .unwrap_or_else(|| BASELINE_WINDOW.to_string());
        let slots = match lookup("TIMETABLE_SLOTS").as_deref().map(str::trim) {
            None | Some("periods") => SlotSource::Periods,
            Some("default") => SlotSource::DefaultWindow(TimeWindow::parse(&window)?),
            Some(other) => {
                return Err(ScheduleError::InvalidInput(format!(
                    "TIMETABLE_SLOTS must be 'periods' or 'default', got '{}'",
                    other
                )));
            }
        };

        Ok(Config {
            bind_addr,
            data_file,
            slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.data_file, None);
        assert_eq!(config.slots, SlotSource::Periods);
    }

    #[test]
    fn default_window_mode_reads_the_window() {
        let config = config(&[
            ("TIMETABLE_SLOTS", "default"),
            ("TIMETABLE_DEFAULT_WINDOW", "10:00-10:45"),
            ("TIMETABLE_DATA_FILE", "/var/lib/timetable.json"),
        ])
        .unwrap();
        assert_eq!(
            config.slots,
            SlotSource::DefaultWindow(TimeWindow::parse("10:00-10:45").unwrap())
        );
        assert_eq!(
            config.data_file,
            Some(PathBuf::from("/var/lib/timetable.json"))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("TIMETABLE_SLOTS", "random")]),
            Err(ScheduleError::InvalidInput(_))
        ));
        assert!(matches!(
            config(&[("TIMETABLE_BIND_ADDR", "localhost")]),
            Err(ScheduleError::InvalidInput(_))
        ));
        assert!(config(&[
            ("TIMETABLE_SLOTS", "default"),
            ("TIMETABLE_DEFAULT_WINDOW", "10:00-09:00"),
        ])
        .is_err());
    }
}
