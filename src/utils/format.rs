use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatBytesError {
    #[error("Size in bytes cannot be negative: {0}")]
    Negative(i64),
}

/// 格式化字节数，保留两位小数，1024 进制
pub fn format_bytes(bytes: i64) -> Result<String, FormatBytesError> {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    const UNIT_SIZE: f64 = 1024.0;

    if bytes < 0 {
        return Err(FormatBytesError::Negative(bytes));
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    Ok(format!("{:.2} {}", size, UNITS[unit_index]))
}

/// Same as [`format_bytes`] for sizes that cannot be negative.
pub fn format_size(bytes: u64) -> String {
    let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
    format_bytes(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(format_bytes(0).unwrap(), "0.00 B");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(format_bytes(1023).unwrap(), "1023.00 B");
        assert_eq!(format_bytes(1024).unwrap(), "1.00 KB");
        assert_eq!(format_bytes(1536).unwrap(), "1.50 KB");
        assert_eq!(format_bytes(1_000_000).unwrap(), "976.56 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024).unwrap(), "5.00 MB");
    }

    #[test]
    fn test_largest_unit_is_capped() {
        let exbi = 1024_i64.pow(6);
        assert_eq!(format_bytes(exbi).unwrap(), "1024.00 PB");
    }

    #[test]
    fn test_negative_is_rejected() {
        assert_eq!(format_bytes(-1), Err(FormatBytesError::Negative(-1)));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_size(u64::MAX), "8192.00 PB");
    }
}
