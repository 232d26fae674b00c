use crate::client::error::{SbdError, SbdResult};

/// Token that introduces a signal quality (`AT+CSQ`) result line.
pub const CSQ_TOKEN: &str = "+CSQ:";

/// Parse the signal bar count (0-5) out of a `+CSQ:` response line.
///
/// Only the leading digits after the token are read, so trailing carriage
/// returns or junk are ignored.
pub fn parse_signal_quality(line: &str) -> SbdResult<u8> {
    let start = line
        .find(CSQ_TOKEN)
        .ok_or_else(|| SbdError::InvalidData(format!("not a signal quality line: {line:?}")))?;

    let value = line[start + CSQ_TOKEN.len()..].trim_start();
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);

    digits
        .parse()
        .map_err(|_| SbdError::InvalidData(format!("no signal quality in {line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signal_bars() {
        assert_eq!(parse_signal_quality("+CSQ:5").unwrap(), 5);
        assert_eq!(parse_signal_quality("+CSQ: 3\r").unwrap(), 3);
        assert_eq!(parse_signal_quality("+CSQ:0").unwrap(), 0);
    }

    #[test]
    fn rejects_lines_without_a_value() {
        assert!(matches!(parse_signal_quality("+CSQ:"), Err(SbdError::InvalidData(_))));
        assert!(matches!(parse_signal_quality("OK"), Err(SbdError::InvalidData(_))));
    }
}
