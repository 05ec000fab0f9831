use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A named stage of the intent execution pipeline.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connected,
    Parsing,
    Validation,
    TokenAnalysis,
    StrategySelection,
    ProtocolAnalysis,
    RouteOptimization,
    GasEstimation,
    Simulation,
    TransactionBuilding,
    Complete,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 12] = [
        Phase::Connected,
        Phase::Parsing,
        Phase::Validation,
        Phase::TokenAnalysis,
        Phase::StrategySelection,
        Phase::ProtocolAnalysis,
        Phase::RouteOptimization,
        Phase::GasEstimation,
        Phase::Simulation,
        Phase::TransactionBuilding,
        Phase::Complete,
        Phase::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Connected => "connected",
            Phase::Parsing => "parsing",
            Phase::Validation => "validation",
            Phase::TokenAnalysis => "token_analysis",
            Phase::StrategySelection => "strategy_selection",
            Phase::ProtocolAnalysis => "protocol_analysis",
            Phase::RouteOptimization => "route_optimization",
            Phase::GasEstimation => "gas_estimation",
            Phase::Simulation => "simulation",
            Phase::TransactionBuilding => "transaction_building",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }

    /// Human-readable label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Connected => "Connected",
            Phase::Parsing => "Parsing intent",
            Phase::Validation => "Validating intent",
            Phase::TokenAnalysis => "Analyzing tokens",
            Phase::StrategySelection => "Selecting strategies",
            Phase::ProtocolAnalysis => "Analyzing protocols",
            Phase::RouteOptimization => "Optimizing routes",
            Phase::GasEstimation => "Estimating gas",
            Phase::Simulation => "Simulating execution",
            Phase::TransactionBuilding => "Building transactions",
            Phase::Complete => "Complete",
            Phase::Error => "Failed",
        }
    }

    /// Matches a loosely formatted hint (surrounding whitespace, any case).
    pub fn parse(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|phase| phase.as_str() == hint)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator of a canonical event: a pipeline phase or the generic `progress` marker.
///
/// The `complete` and `error` markers are the terminal phases.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventType {
    Step(Phase),
    Progress,
}

impl EventType {
    pub const COMPLETE: EventType = EventType::Step(Phase::Complete);
    pub const ERROR: EventType = EventType::Step(Phase::Error);

    pub fn parse(hint: &str) -> Option<Self> {
        if hint.trim().eq_ignore_ascii_case("progress") {
            return Some(EventType::Progress);
        }
        Phase::parse(hint).map(EventType::Step)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Step(phase) => phase.as_str(),
            EventType::Progress => "progress",
        }
    }

    pub fn phase(self) -> Option<Phase> {
        match self {
            EventType::Step(phase) => Some(phase),
            EventType::Progress => None,
        }
    }

    pub fn is_complete(self) -> bool {
        self == Self::COMPLETE
    }

    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }

    pub fn is_terminal(self) -> bool {
        self.phase().is_some_and(Phase::is_terminal)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // The canonical form is exact; loose matching belongs to the normalizer.
        if raw == "progress" {
            return Ok(EventType::Progress);
        }
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == raw)
            .map(EventType::Step)
            .ok_or_else(|| de::Error::custom(format!("unknown event type `{raw}`")))
    }
}
