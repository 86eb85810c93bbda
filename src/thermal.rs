//! Host CPU temperature, read from the Linux thermal sysfs interface.

use std::fs;
use std::path::Path;

use tracing::debug;

/// First thermal zone; the SoC sensor on Raspberry Pi class boards
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Temperature in °C rounded to 0.1, or `None` if the file is missing or
/// doesn't hold an integer.
pub fn read_cpu_temperature(path: impl AsRef<Path>) -> Option<f64> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(raw) => {
            let celsius = parse_millidegrees(&raw);
            if celsius.is_none() {
                debug!(path = %path.display(), raw = raw.trim(), "unparseable temperature");
            }
            celsius
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "temperature unavailable");
            None
        }
    }
}

/// `"48312\n"` → `48.3`
pub fn parse_millidegrees(raw: &str) -> Option<f64> {
    let millidegrees: i64 = raw.trim().parse().ok()?;
    Some((millidegrees as f64 / 100.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_millidegrees() {
        assert_eq!(parse_millidegrees("48312\n"), Some(48.3));
        assert_eq!(parse_millidegrees("51850"), Some(51.9));
        assert_eq!(parse_millidegrees("-5000"), Some(-5.0));
        assert_eq!(parse_millidegrees(""), None);
        assert_eq!(parse_millidegrees("warm"), None);
    }

    #[test]
    fn test_read_from_file() {
        let path = std::env::temp_dir().join(format!("tijprint-thermal-{}", std::process::id()));
        fs::write(&path, "61004\n").unwrap();
        assert_eq!(read_cpu_temperature(&path), Some(61.0));
        fs::remove_file(&path).unwrap();
        assert_eq!(read_cpu_temperature(&path), None);
    }
}
