//! CLI Exit Code Registry
//!
//! Single source of truth for `fieldaudit` exit codes. Scripts rely on
//! them, so existing values never change meaning.
//!
//! | Code | Meaning                                           |
//! |------|---------------------------------------------------|
//! | 0    | Success                                           |
//! | 1    | General error                                     |
//! | 2    | Usage error (bad arguments, unusable path)        |
//! | 3    | Discrepancies found (`run --strict`)              |
//! | 4    | Invalid config or mapping sheet                   |
//! | 5    | Record store unreachable                          |
//! | 6    | Runtime failure (unreadable folder, output write) |

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments.
/// clap exits with this code on its own parse failures.
pub const EXIT_USAGE: u8 = 2;

/// `run --strict` found mismatches, nulls on one side, or errors.
pub const EXIT_DISCREPANCIES: u8 = 3;

/// Config TOML or mapping sheet failed to load or validate.
pub const EXIT_INVALID_CONFIG: u8 = 4;

/// Store could not be opened, or the connection was lost mid-run.
pub const EXIT_STORE_UNREACHABLE: u8 = 5;

/// Any other failure during a run.
pub const EXIT_RUNTIME: u8 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_DISCREPANCIES,
            EXIT_INVALID_CONFIG,
            EXIT_STORE_UNREACHABLE,
            EXIT_RUNTIME,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
