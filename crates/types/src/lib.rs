#![deny(missing_docs)]

//! # Types for the pre-ranking engine.
//!
//! Everything that crosses a component boundary lives here: intents and
//! solutions as decoded from blob storage, chain events and cursors, dry-run
//! results, validation reports, the per-solution pass/fail records kept in
//! the intent store, and the payload handed to the ranking consumer.
//!
//! Wire-facing types parse tolerantly: field names are accepted in both
//! snake_case and camelCase, and amounts are accepted as JSON strings or
//! integers (see [`ser`]).

use serde::{Deserialize, Serialize};

pub mod ser;

pub use ser::{Amount, SignedAmount};

/// A user-declared trading request with constraints and a solver access window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Opaque unique identifier.
    #[serde(alias = "intentId")]
    pub intent_id: String,
    /// Opaque principal identifier, used as the owner filter in balance-change
    /// lookups.
    #[serde(alias = "userAddress")]
    pub user_address: String,
    /// Start of the solver access window, milliseconds since the epoch.
    #[serde(alias = "windowStartMs")]
    pub window_start_ms: u64,
    /// End of the solver access window, milliseconds since the epoch.
    /// Always greater than `window_start_ms`.
    #[serde(alias = "windowEndMs")]
    pub window_end_ms: u64,
    /// What the user wants executed.
    pub operation: Operation,
    /// User-declared constraints, all optional.
    #[serde(default)]
    pub constraints: Constraints,
}

/// The operation an intent asks solvers to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation mode, e.g. `swap`. Opaque to the pre-ranker.
    pub mode: String,
    /// Input legs.
    #[serde(default)]
    pub inputs: Vec<AssetAmount>,
    /// Output legs.
    #[serde(default)]
    pub outputs: Vec<AssetAmount>,
    /// Outputs the user expects to receive, used by the slippage check.
    #[serde(default, alias = "expectedOutputs")]
    pub expected_outputs: Option<Vec<AssetAmount>>,
}

/// An asset paired with an amount specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAmount {
    /// Asset identifier, e.g. a fully qualified coin type.
    #[serde(alias = "assetId")]
    pub asset_id: String,
    /// How much of the asset.
    pub amount: AmountSpec,
    /// Decimal places of the asset, when known. Only consulted by the
    /// limit-price calculation.
    #[serde(default)]
    pub decimals: Option<u8>,
}

impl AssetAmount {
    /// The exact amount, if this leg is specified exactly.
    pub fn exact(&self) -> Option<Amount> {
        match self.amount {
            AmountSpec::Exact(amount) => Some(amount),
            _ => None,
        }
    }
}

/// Amount specification of an input or output leg.
///
/// On the wire an exact amount is a bare string or integer, a range is a
/// `{min, max}` object and `"all"` selects the caller's full balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    /// Exactly this amount.
    Exact(Amount),
    /// Anything within the inclusive range.
    Range {
        /// Lower bound.
        min: Amount,
        /// Upper bound.
        max: Amount,
    },
    /// The caller's entire balance of the asset.
    All,
}

/// User-declared constraints on acceptable solutions. All optional; absent
/// constraints are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Latest acceptable execution time. Carried for downstream consumers;
    /// the validator's deadline check is pinned to the intent's
    /// `window_end_ms`.
    #[serde(default, alias = "deadlineMs")]
    pub deadline_ms: Option<u64>,
    /// Maximum tolerated slippage against `expected_outputs`, in basis
    /// points.
    #[serde(default, alias = "maxSlippageBps")]
    pub max_slippage_bps: Option<u32>,
    /// Per-asset minimum credited outputs.
    #[serde(default, alias = "minOutputs")]
    pub min_outputs: Option<Vec<AssetBound>>,
    /// Per-asset caps on consumed inputs.
    #[serde(default, alias = "maxInputs")]
    pub max_inputs: Option<Vec<AssetBound>>,
    /// Cap on total gas cost (computation + storage - rebate).
    #[serde(default, alias = "maxGasCost")]
    pub max_gas_cost: Option<Amount>,
    /// Routing restrictions.
    #[serde(default)]
    pub routing: Option<Routing>,
    /// Limit price on the primary input/output pair.
    #[serde(default, alias = "limitPrice")]
    pub limit_price: Option<LimitPrice>,
}

/// A per-asset amount bound used by `min_outputs` and `max_inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBound {
    /// Asset identifier.
    #[serde(alias = "assetId")]
    pub asset_id: String,
    /// The bound.
    pub amount: Amount,
}

/// Routing restrictions on a solution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    /// Maximum number of hops the route may take.
    #[serde(default, alias = "maxHops")]
    pub max_hops: Option<u32>,
    /// Protocols a solution must not touch.
    #[serde(default)]
    pub blacklist: Option<Vec<String>>,
    /// If non-empty, the only protocols a solution may touch.
    #[serde(default)]
    pub whitelist: Option<Vec<String>>,
}

/// A limit price on the realised exchange rate of the primary legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitPrice {
    /// The limit.
    pub price: f64,
    /// Which side of the limit is acceptable.
    pub comparison: PriceComparison,
    /// The asset the price is quoted in. Must match either the primary
    /// input or the primary output asset to be checkable.
    #[serde(alias = "priceAsset")]
    pub price_asset: String,
}

/// Direction of a limit-price comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceComparison {
    /// Realised price must be greater than or equal to the limit.
    Gte,
    /// Realised price must be less than or equal to the limit.
    Lte,
}

/// A candidate execution submitted by a solver during an intent's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Opaque unique identifier.
    #[serde(alias = "solutionId")]
    pub solution_id: String,
    /// The intent this solution targets.
    #[serde(alias = "intentId")]
    pub intent_id: String,
    /// Address of the submitting solver.
    #[serde(alias = "solverAddress")]
    pub solver_address: String,
    /// Submission time, milliseconds since the epoch.
    #[serde(alias = "submittedAtMs")]
    pub submitted_at_ms: u64,
    /// The proposed transaction, base64-encoded. Passed opaquely to the
    /// simulator.
    #[serde(alias = "transactionBytes")]
    pub transaction_bytes: String,
    /// Inputs the solver declares the transaction consumes, when the solver
    /// provided them. Absence skips the pre-simulation input-cap checks.
    #[serde(default, alias = "declaredInputs")]
    pub declared_inputs: Option<Vec<AssetBound>>,
    /// Route metadata the solver declares, when provided. Absence skips the
    /// pre-simulation routing checks.
    #[serde(default)]
    pub route: Option<RouteSummary>,
}

/// Solver-declared route metadata, used by the pre-simulation routing checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Number of hops in the route.
    #[serde(default)]
    pub hops: Option<u32>,
    /// Protocol identifiers the route touches.
    #[serde(default)]
    pub protocols: Option<Vec<String>>,
}

/// Result of simulating a solution's transaction without committing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRun {
    /// Whether the simulated execution succeeded.
    pub status: DryRunStatus,
    /// Simulator-reported failure message when `status` is `fail`.
    #[serde(default, alias = "errorMsg")]
    pub error_msg: Option<String>,
    /// Gas usage of the simulated execution.
    pub gas: GasSummary,
    /// Events emitted by the simulated execution.
    #[serde(default)]
    pub events: Vec<SimEvent>,
    /// Balance deltas, signed, per owner and coin type.
    #[serde(default, alias = "balanceChanges")]
    pub balance_changes: Vec<BalanceChange>,
    /// Object-level changes of the simulated execution.
    #[serde(default, alias = "objectChanges")]
    pub object_changes: Vec<ObjectChange>,
}

/// Outcome of a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DryRunStatus {
    /// The simulated execution succeeded.
    Ok,
    /// The simulated execution failed.
    Fail,
}

/// Gas usage of a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSummary {
    /// Computation cost.
    pub computation: Amount,
    /// Storage cost.
    pub storage: Amount,
    /// Storage rebate, refunded to the sender.
    #[serde(default)]
    pub rebate: Amount,
}

impl GasSummary {
    /// Total cost: `computation + storage - rebate`, saturating at zero.
    pub fn total(&self) -> u128 {
        (self.computation.0)
            .saturating_add(self.storage.0)
            .saturating_sub(self.rebate.0)
    }
}

/// A signed balance delta observed during simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// The account whose balance changed.
    pub owner: String,
    /// Fully qualified coin type of the balance.
    #[serde(alias = "coinType")]
    pub coin_type: String,
    /// The delta. Positive is a credit, negative a debit.
    pub amount: SignedAmount,
}

/// An event emitted during simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Fully qualified event type, `package::module::Name`.
    #[serde(alias = "type", alias = "eventType")]
    pub event_type: String,
    /// Structured event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// An object-level change observed during simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    /// Fully qualified type of the touched object.
    #[serde(alias = "type", alias = "objectType")]
    pub object_type: String,
}

/// Position of an event within the chain's event order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Global sequence number. Primary ordering key.
    #[serde(
        alias = "eventSeq",
        deserialize_with = "ser::u64_from_int_or_str"
    )]
    pub event_seq: u64,
    /// Digest of the containing transaction. Tie-breaker.
    #[serde(alias = "txDigest")]
    pub tx_digest: String,
}

/// The ordered position up to which both event streams have been consumed
/// and handed to the coordinator. Monotonic, persisted durably.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventCursor {
    /// Sequence number of the last consumed event.
    #[serde(
        alias = "eventSeq",
        deserialize_with = "ser::u64_from_int_or_str"
    )]
    pub event_seq: u64,
    /// Transaction digest of the last consumed event.
    #[serde(alias = "txDigest")]
    pub tx_digest: String,
}

impl From<EventId> for EventCursor {
    fn from(id: EventId) -> Self {
        Self {
            event_seq: id.event_seq,
            tx_digest: id.tx_digest,
        }
    }
}

/// A typed event observed on the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    /// An intent opened its solver access window.
    IntentSubmitted(IntentSubmittedEvent),
    /// A solver submitted a candidate solution.
    SolutionSubmitted(SolutionSubmittedEvent),
}

impl ChainEvent {
    /// The event's position in the chain order.
    pub fn id(&self) -> &EventId {
        match self {
            ChainEvent::IntentSubmitted(ev) => &ev.id,
            ChainEvent::SolutionSubmitted(ev) => &ev.id,
        }
    }
}

/// Payload of an intent-submitted chain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSubmittedEvent {
    /// Position of the event.
    pub id: EventId,
    /// The intent that opened.
    #[serde(alias = "intentId")]
    pub intent_id: String,
    /// Content address of the intent body in blob storage.
    #[serde(alias = "blobId")]
    pub blob_id: String,
    /// Chain-reported emission time, milliseconds since the epoch.
    #[serde(
        default,
        alias = "timestampMs",
        deserialize_with = "ser::opt_u64_from_int_or_str"
    )]
    pub timestamp_ms: Option<u64>,
}

/// Payload of a solution-submitted chain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSubmittedEvent {
    /// Position of the event.
    pub id: EventId,
    /// The targeted intent.
    #[serde(alias = "intentId")]
    pub intent_id: String,
    /// The submitted solution.
    #[serde(alias = "solutionId")]
    pub solution_id: String,
    /// Content address of the solution body in blob storage.
    #[serde(alias = "blobId")]
    pub blob_id: String,
    /// Chain-reported emission time, milliseconds since the epoch.
    #[serde(
        default,
        alias = "timestampMs",
        deserialize_with = "ser::opt_u64_from_int_or_str"
    )]
    pub timestamp_ms: Option<u64>,
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The finding fails the solution.
    Error,
    /// The finding is recorded but does not fail the solution.
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// The constraint field the finding is about.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Whether the finding fails the solution.
    pub severity: Severity,
}

/// The outcome of a validation phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// All findings of the phase, errors and warnings.
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// True iff no finding has error severity.
    pub fn ok(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == Severity::Error)
    }

    /// Record an error-severity finding.
    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    /// Record a warning-severity finding.
    pub fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}

/// Features extracted from a passed solution for the ranking consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionFeatures {
    /// Computation gas of the dry run.
    pub gas_cost: Amount,
    /// Sum of protocol fee fields observed in simulation events.
    pub protocol_fees: Amount,
    /// Credited output beyond the declared minimum for the primary output.
    pub surplus: Amount,
    /// Estimated number of routing hops, at least 1.
    pub total_hops: u32,
    /// Distinct non-system packages touched, at least 1.
    pub protocols_count: u32,
}

/// Why a solution was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// The solution body could not be fetched from blob storage.
    FetchFailed,
    /// Pre-simulation constraint validation failed.
    ConstraintValidationFailed,
    /// The simulated execution failed.
    DryRunFailed,
    /// Post-simulation constraint validation failed.
    ComplexValidationFailed,
}

/// Record of a solution that passed the full pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassedRecord {
    /// The solution's identifier.
    pub solution_id: String,
    /// The full solution body.
    pub solution: Solution,
    /// Extracted ranking features.
    pub features: SolutionFeatures,
    /// The dry run the solution passed with.
    pub dry_run: DryRun,
    /// When the pipeline recorded the pass, milliseconds since the epoch.
    pub passed_at_ms: u64,
}

/// Record of a solution that failed the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// The solution's identifier.
    pub solution_id: String,
    /// Which pipeline stage rejected it.
    pub reason: FailReason,
    /// Validation findings, when the reason is a validation failure.
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    /// Upstream error message, when the reason is a fetch or dry-run
    /// failure.
    #[serde(default)]
    pub error_msg: Option<String>,
    /// When the pipeline recorded the failure, milliseconds since the epoch.
    pub failed_at_ms: u64,
}

/// A per-solution record in the intent store, keyed by
/// `(intent_id, solution_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SolutionRecord {
    /// The solution passed.
    Passed(PassedRecord),
    /// The solution failed.
    Failed(FailedRecord),
}

/// The payload flushed to the ranking consumer when an intent's window
/// closes. Idempotent downstream, keyed by `intent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingPayload {
    /// The intent whose window closed.
    pub intent_id: String,
    /// The full intent body.
    pub intent: Intent,
    /// All solutions that passed validation during the window.
    pub passed_solutions: Vec<PassedRecord>,
    /// Count of all solutions that reached a terminal record, passed or
    /// failed.
    pub total_solutions_submitted: u64,
    /// When the window closed, milliseconds since the epoch.
    pub window_closed_at: u64,
}
