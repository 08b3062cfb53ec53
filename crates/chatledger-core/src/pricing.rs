//! Pricing for chat modes.
//!
//! Charges are computed in minor units (1 unit = $0.001) so the minimum
//! billable charge is $0.001. Each mode has a fixed base fee in USD plus a
//! variable fee per group of 10 words in the user message.
//!
//! The result depends only on the mode and the message's word count, which
//! lets request handlers price and affordability-check a message *before*
//! spending provider-side money on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minor units per USD. Display: `units / UNITS_PER_USD` = USD.
pub const UNITS_PER_USD: i64 = 1000;

/// Words per variable-fee group.
const WORDS_PER_GROUP: usize = 10;

/// A named pricing/service tier selecting model and price formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    /// Flat-fee reasoning tier.
    Simple,
    /// Top reasoning tier.
    Max,
    /// Data analytics, small model.
    DataAnalyticsSimple,
    /// Data analytics, large model.
    DataAnalyticsMax,
    /// Code generation, small model.
    CodeSimple,
    /// Code generation, large model.
    CodeMax,
    /// Deep research, small model.
    DeepResearchSimple,
    /// Deep research, large model.
    DeepResearchMax,
}

impl ChatMode {
    /// All modes, for iteration in tests and reporting.
    pub const ALL: [Self; 8] = [
        Self::Simple,
        Self::Max,
        Self::DataAnalyticsSimple,
        Self::DataAnalyticsMax,
        Self::CodeSimple,
        Self::CodeMax,
        Self::DeepResearchSimple,
        Self::DeepResearchMax,
    ];

    /// Stable string form (matches the wire names used by chat clients).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Max => "max",
            Self::DataAnalyticsSimple => "data-analytics-simple",
            Self::DataAnalyticsMax => "data-analytics-max",
            Self::CodeSimple => "code-simple",
            Self::CodeMax => "code-max",
            Self::DeepResearchSimple => "deep-research-simple",
            Self::DeepResearchMax => "deep-research-max",
        }
    }

    /// Base fee plus per-group fee, both in USD.
    const fn fees_usd(self) -> (f64, f64) {
        match self {
            Self::Simple => (0.02, 0.0),
            Self::Max => (2.34, 0.0015),
            Self::DataAnalyticsSimple | Self::DeepResearchSimple => (0.005, 0.000_05),
            Self::DataAnalyticsMax => (0.052, 0.0),
            Self::CodeSimple => (0.015, 0.0),
            Self::CodeMax => (0.274, 0.000_002),
            Self::DeepResearchMax => (0.012, 0.0001),
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "max" => Ok(Self::Max),
            "data-analytics-simple" => Ok(Self::DataAnalyticsSimple),
            "data-analytics-max" => Ok(Self::DataAnalyticsMax),
            "code-simple" => Ok(Self::CodeSimple),
            "code-max" => Ok(Self::CodeMax),
            "deep-research-simple" => Ok(Self::DeepResearchSimple),
            "deep-research-max" => Ok(Self::DeepResearchMax),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

/// Calculate the charge in minor units for one message in the given mode.
///
/// `groups = ceil(word_count / 10)`; the charge is
/// `round((base + groups * per_group) * UNITS_PER_USD)`, floored at 1 so a
/// committed usage charge is never zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn message_charge_units(mode: ChatMode, message: &str) -> i64 {
    let word_count = message.split_whitespace().count();
    let groups = word_count.div_ceil(WORDS_PER_GROUP);

    let (base_usd, per_group_usd) = mode.fees_usd();
    let total_usd = base_usd + groups as f64 * per_group_usd;

    ((total_usd * UNITS_PER_USD as f64).round() as i64).max(1)
}

/// Per-1k-token USD rates for a legacy provider model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenRate {
    /// USD per 1000 input (prompt) tokens.
    pub input_usd_per_1k: f64,
    /// USD per 1000 output (completion) tokens.
    pub output_usd_per_1k: f64,
}

/// Calculate the charge in minor units from actual provider token usage.
///
/// This is the legacy post-hoc metering path: it can only run *after* the
/// provider has reported usage, so the debit is not pre-authorized against
/// the balance the way [`message_charge_units`] charges are. Callers should
/// prefer the mode-based estimate; this exists for provider-priced models
/// where the cost is unknowable up front.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn token_usage_charge_units(input_tokens: u64, output_tokens: u64, rate: TokenRate) -> i64 {
    let input_usd = input_tokens as f64 / 1000.0 * rate.input_usd_per_1k;
    let output_usd = output_tokens as f64 / 1000.0 * rate.output_usd_per_1k;

    (((input_usd + output_usd) * UNITS_PER_USD as f64).ceil() as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn simple_is_flat() {
        assert_eq!(message_charge_units(ChatMode::Simple, ""), 20);
        assert_eq!(message_charge_units(ChatMode::Simple, &words(1)), 20);
        assert_eq!(message_charge_units(ChatMode::Simple, &words(500)), 20);
    }

    #[test]
    fn max_scales_with_word_groups() {
        // 50 words -> 5 groups -> round((2.34 + 5 * 0.0015) * 1000) = 2348
        assert_eq!(message_charge_units(ChatMode::Max, &words(50)), 2348);
        // 1 word and 10 words are the same group count.
        assert_eq!(
            message_charge_units(ChatMode::Max, &words(1)),
            message_charge_units(ChatMode::Max, &words(10)),
        );
        // 11 words tip into the second group.
        assert!(
            message_charge_units(ChatMode::Max, &words(11))
                > message_charge_units(ChatMode::Max, &words(10))
        );
    }

    #[test]
    fn charge_is_deterministic() {
        let msg = "analyze this quarterly revenue data set for trends";
        let first = message_charge_units(ChatMode::DataAnalyticsSimple, msg);
        for _ in 0..10 {
            assert_eq!(message_charge_units(ChatMode::DataAnalyticsSimple, msg), first);
        }
    }

    #[test]
    fn charge_never_below_one_unit() {
        for mode in ChatMode::ALL {
            assert!(message_charge_units(mode, "") >= 1);
        }
    }

    #[test]
    fn whitespace_does_not_inflate_word_count() {
        let padded = "  one   two  three  ";
        assert_eq!(
            message_charge_units(ChatMode::DeepResearchMax, padded),
            message_charge_units(ChatMode::DeepResearchMax, "one two three"),
        );
    }

    #[test]
    fn mode_string_roundtrip() {
        for mode in ChatMode::ALL {
            let parsed: ChatMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("turbo".parse::<ChatMode>().is_err());
    }

    #[test]
    fn mode_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ChatMode::DeepResearchSimple).unwrap();
        assert_eq!(json, "\"deep-research-simple\"");
    }

    #[test]
    fn token_charge_rounds_up_with_floor() {
        let rate = TokenRate {
            input_usd_per_1k: 0.003,
            output_usd_per_1k: 0.015,
        };
        // 2000 in + 1000 out = $0.006 + $0.015 = $0.021 -> 21 units
        assert_eq!(token_usage_charge_units(2000, 1000, rate), 21);
        // Tiny usage still bills one unit.
        assert_eq!(token_usage_charge_units(1, 0, rate), 1);
    }
}
