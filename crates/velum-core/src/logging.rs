//! Structured logging schema and field name constants for velum.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools can query by standardized field names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, caller can retry or fall back |
//! | INFO  | Lifecycle events (key generation, rotation, migration, reset) |
//! | DEBUG | Decision points, state transitions, per-key fallback attempts |
//! | TRACE | High-volume detail (per-record listing) |
//!
//! Key material and plaintext never appear at any level; keys are referred
//! to by key id or public fingerprint only.

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "crypto", "keystore", "session", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "key_pairs", "directory", "migrator", "pool", "session"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "initialize", "rotate", "migrate", "mark_current"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// User whose keys are being operated on.
pub const USER_ID: &str = "user_id";

/// Key pair UUID being operated on.
pub const KEY_ID: &str = "key_id";

/// Public key fingerprint (short hex), never the key itself.
pub const FINGERPRINT: &str = "fingerprint";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of key pairs touched or listed.
pub const KEY_COUNT: &str = "key_count";

/// Number of legacy records migrated.
pub const MIGRATED_COUNT: &str = "migrated_count";

/// Byte length of an encrypted payload.
pub const PAYLOAD_LEN: &str = "payload_len";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
