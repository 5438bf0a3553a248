//! Protocol and identity filtering with optional per-identity throttling.
//!
//! An identity filter is a comma-separated list of `IDENT` or `IDENT(seconds)`
//! entries, e.g. `NAV-PVT(1),GNGGA,1005(10)`. An entry with an interval passes
//! a message of that identity only if at least that many seconds have elapsed
//! since the last one that passed.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::message::{DecodedMessage, ProtocolMask};

static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^()\s]+)(?:\(\s*([0-9]+(?:\.[0-9]*)?)\s*\))?$").expect("valid regex")
});

/// One allowed identity and its minimum spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRule {
    pub identity: String,
    /// Zero means unthrottled.
    pub min_interval: Duration,
}

impl IdentityRule {
    pub fn new(identity: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            identity: identity.into(),
            min_interval,
        }
    }
}

/// Which messages reach the formatter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub protocols: ProtocolMask,
    /// Empty accepts every identity of the enabled protocols.
    pub identities: Vec<IdentityRule>,
}

impl FilterSpec {
    pub fn new(protocols: ProtocolMask) -> Self {
        Self {
            protocols,
            identities: Vec::new(),
        }
    }

    /// Build from the numeric `protfilter` value.
    pub fn from_bits(bits: u32) -> CoreResult<Self> {
        ProtocolMask::from_bits(bits)
            .map(Self::new)
            .ok_or(CoreError::InvalidProtocolMask(bits))
    }

    /// Add identity rules parsed from a `msgfilter` string.
    pub fn with_identities(mut self, spec: &str) -> CoreResult<Self> {
        self.identities = parse_identity_filter(spec)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_rule(mut self, rule: IdentityRule) -> Self {
        self.identities.push(rule);
        self
    }
}

/// Parse `IDENT` / `IDENT(seconds)` entries separated by commas.
pub fn parse_identity_filter(spec: &str) -> CoreResult<Vec<IdentityRule>> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let caps = ENTRY
                .captures(entry)
                .ok_or_else(|| CoreError::invalid_filter(entry, "expected IDENT or IDENT(seconds)"))?;
            let interval = match caps.get(2) {
                Some(secs) => {
                    let secs: f64 = secs
                        .as_str()
                        .parse()
                        .map_err(|_| CoreError::invalid_filter(entry, "interval is not a number"))?;
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| CoreError::invalid_filter(entry, e.to_string()))?
                }
                None => Duration::ZERO,
            };
            Ok(IdentityRule::new(&caps[1], interval))
        })
        .collect()
}

/// Stateful pass/drop decision over decoded messages.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    spec: FilterSpec,
    last_pass: HashMap<String, Instant>,
}

impl MessageFilter {
    pub fn new(spec: FilterSpec) -> Self {
        Self {
            spec,
            last_pass: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Decide whether `message`, arriving at `now`, passes.
    pub fn accept(&mut self, message: &DecodedMessage, now: Instant) -> bool {
        if !self.spec.protocols.allows(message.protocol) {
            return false;
        }
        if self.spec.identities.is_empty() {
            return true;
        }
        let Some(rule) = self
            .spec
            .identities
            .iter()
            .find(|rule| rule.identity == message.identity)
        else {
            return false;
        };
        if rule.min_interval.is_zero() {
            return true;
        }

        if let Some(last) = self.last_pass.get(&message.identity)
            && now.saturating_duration_since(*last) < rule.min_interval
        {
            return false;
        }
        self.last_pass.insert(message.identity.clone(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ProtocolTag;
    use proptest::prelude::*;

    fn msg(protocol: ProtocolTag, identity: &str) -> DecodedMessage {
        DecodedMessage::new(protocol, identity, Vec::new())
    }

    mod parsing {
        use super::*;

        #[test]
        fn plain_and_throttled_entries() {
            let rules = parse_identity_filter("NAV-PVT(1), GNGGA ,1005(2.5)").unwrap();
            assert_eq!(
                rules,
                vec![
                    IdentityRule::new("NAV-PVT", Duration::from_secs(1)),
                    IdentityRule::new("GNGGA", Duration::ZERO),
                    IdentityRule::new("1005", Duration::from_millis(2500)),
                ]
            );
        }

        #[test]
        fn empty_string_means_no_constraint() {
            assert!(parse_identity_filter("").unwrap().is_empty());
        }

        #[test]
        fn rejects_bad_entries() {
            assert!(parse_identity_filter("NAV-PVT(").is_err());
            assert!(parse_identity_filter("NAV-PVT(-1)").is_err());
            assert!(parse_identity_filter("NAV PVT").is_err());
        }

        #[test]
        fn protocol_bits() {
            assert!(FilterSpec::from_bits(7).is_ok());
            assert_eq!(
                FilterSpec::from_bits(64),
                Err(CoreError::InvalidProtocolMask(64))
            );
        }
    }

    mod accepting {
        use super::*;

        #[test]
        fn disabled_protocol_is_dropped() {
            let mut filter = MessageFilter::new(FilterSpec::new(ProtocolMask::NMEA));
            let now = Instant::now();
            assert!(filter.accept(&msg(ProtocolTag::Nmea, "GNGGA"), now));
            assert!(!filter.accept(&msg(ProtocolTag::Ubx, "NAV-PVT"), now));
        }

        #[test]
        fn identity_allow_list() {
            let spec = FilterSpec::new(ProtocolMask::all())
                .with_identities("GNGGA")
                .unwrap();
            let mut filter = MessageFilter::new(spec);
            let now = Instant::now();
            assert!(filter.accept(&msg(ProtocolTag::Nmea, "GNGGA"), now));
            assert!(!filter.accept(&msg(ProtocolTag::Nmea, "GNGSA"), now));
        }

        #[test]
        fn throttles_by_interval() {
            let spec = FilterSpec::new(ProtocolMask::all())
                .with_identities("NAV-PVT(2)")
                .unwrap();
            let mut filter = MessageFilter::new(spec);
            let start = Instant::now();
            let pvt = msg(ProtocolTag::Ubx, "NAV-PVT");
            assert!(filter.accept(&pvt, start));
            assert!(!filter.accept(&pvt, start + Duration::from_secs(1)));
            assert!(filter.accept(&pvt, start + Duration::from_secs(2)));
            assert!(!filter.accept(&pvt, start + Duration::from_millis(3999)));
        }
    }

    proptest! {
        #[test]
        fn passed_messages_respect_min_interval(
            interval_ms in 0u64..5_000,
            gaps in proptest::collection::vec(0u64..3_000, 1..200),
        ) {
            let spec = FilterSpec::new(ProtocolMask::all())
                .with_rule(IdentityRule::new("NAV-PVT", Duration::from_millis(interval_ms)));
            let mut filter = MessageFilter::new(spec);
            let pvt = msg(ProtocolTag::Ubx, "NAV-PVT");
            let mut now = Instant::now();
            let mut last_passed: Option<Instant> = None;

            for gap in gaps {
                now += Duration::from_millis(gap);
                if filter.accept(&pvt, now) {
                    if let Some(last) = last_passed {
                        prop_assert!(now - last >= Duration::from_millis(interval_ms));
                    }
                    last_passed = Some(now);
                }
            }
        }
    }
}
