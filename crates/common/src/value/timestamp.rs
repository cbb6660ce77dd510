// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical string form of a timestamp, as stored in date columns (`2025-01-09T12:00:00.000Z`).
///
/// Dates are compared as strings, so every date the engine produces must use exactly this form.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn millisecond_precision_with_zulu_suffix() {
        let timestamp = Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(&timestamp), "2025-01-09T12:00:00.000Z");
    }
}
