//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | run              | Configuration, input and output failures |
//! | 50-59   | fetch            | External data sources                    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant error conversion

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors. Warnings do not change this.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-9)
// =============================================================================

/// Configuration file missing fields, unknown level, bad split table.
pub const EXIT_CONFIG: u8 = 3;

/// Input data cannot be reconciled: duplicate identifiers, malformed
/// table rows, unreadable OSM structure.
pub const EXIT_INPUT: u8 = 4;

/// Reading an input file or writing the output file failed.
pub const EXIT_IO: u8 = 5;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// Upstream error: non-retryable status, or retries exhausted on a
/// transient status or connection error.
pub const EXIT_FETCH_UPSTREAM: u8 = 50;

/// Still rate limited (HTTP 429) after all retries.
pub const EXIT_FETCH_RATE_LIMIT: u8 = 51;

/// Response arrived but is not in the expected shape.
pub const EXIT_FETCH_MALFORMED: u8 = 52;
