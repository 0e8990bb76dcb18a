// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A thin wrapper around `chrono::DateTime<Utc>`. The real OPC UA
//! `DateTime` also knows how to convert to/from the Windows FILETIME epoch
//! used on the wire; that concern belongs to the (external) binary codec,
//! so this version only keeps what the secure channel needs: "now",
//! arithmetic for watchdog deadlines, and a null sentinel.

use std::ops::{Add, Sub};

use chrono::{DateTime as ChronoDateTime, Duration, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateTime(ChronoDateTime<Utc>);

impl DateTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// The null/minimum instant, used as a "not set" sentinel the way the
    /// upstream `DateTime::default()` represents `DateTime.MinValue`.
    pub fn null() -> Self {
        Self(Utc.timestamp_opt(0, 0).unwrap())
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }

    pub fn as_chrono(&self) -> ChronoDateTime<Utc> {
        self.0
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::null()
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> DateTime {
        DateTime(self.0 + rhs)
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> DateTime {
        DateTime(self.0 - rhs)
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, rhs: DateTime) -> Duration {
        self.0 - rhs.0
    }
}
