//! Inbound bus commands
//! This module turns messages received on `{base}/{id}/alert/{kind}` into
//! alert requests. Anything else is ignored.

use crate::core::bluetooth::{AlertKind, DeviceId};
use crate::mqtt::topics::ALERT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub id: DeviceId,
    pub kind: AlertKind,
    /// Requested duration, not yet range checked
    pub duration_ms: i64,
}

/// Parses an incoming message.
///
/// The device id, command and subtype are the last three topic levels, the
/// payload must be an integer. The duration range is checked later by the
/// alert path.
pub fn parse_alert(topic: &str, payload: &[u8]) -> Option<AlertRequest> {
    let mut levels = topic.rsplit('/');
    let subtype = levels.next()?;
    let command = levels.next()?;
    let id = levels.next()?;

    if command != ALERT || id.is_empty() {
        return None;
    }
    let kind = AlertKind::from_topic(subtype)?;
    let duration_ms = std::str::from_utf8(payload).ok()?.trim().parse::<i64>().ok()?;

    Some(AlertRequest {
        id: DeviceId::new(id),
        kind,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beep_with_numeric_payload() {
        assert_eq!(
            parse_alert("itag/AA:BB/alert/beep", b"250"),
            Some(AlertRequest {
                id: DeviceId::new("AA:BB"),
                kind: AlertKind::Beep,
                duration_ms: 250,
            })
        );
    }

    #[test]
    fn continuous_under_nested_base() {
        let request = parse_alert("home/tags/AA:BB/alert/continuous", b" 1000\n").unwrap();
        assert_eq!(request.kind, AlertKind::Continuous);
        assert_eq!(request.duration_ms, 1000);
        assert_eq!(request.id.as_str(), "AA:BB");
    }

    #[test]
    fn non_numeric_payload_is_ignored() {
        assert_eq!(parse_alert("itag/AA:BB/alert/beep", b"abc"), None);
        assert_eq!(parse_alert("itag/AA:BB/alert/beep", b"2.5"), None);
        assert_eq!(parse_alert("itag/AA:BB/alert/beep", &[0xff, 0xfe]), None);
    }

    #[test]
    fn other_topics_are_ignored() {
        assert_eq!(parse_alert("itag/AA:BB/rssi", b"250"), None);
        assert_eq!(parse_alert("alert/beep", b"250"), None);
        assert_eq!(parse_alert("itag/AA:BB/alert/siren", b"250"), None);
        assert_eq!(parse_alert("itag/AA:BB/button/beep", b"250"), None);
    }

    #[test]
    fn out_of_range_duration_still_parses() {
        let request = parse_alert("itag/AA:BB/alert/beep", b"-5").unwrap();
        assert_eq!(request.duration_ms, -5);
    }
}
