//! Shared error plumbing.
//!
//! Only the `Result` alias lives here. Each crate owns its error enums and
//! wraps them in a rootcause [`Report`] at layer boundaries.

use rootcause::Report;

/// Result carrying a rootcause report with a typed context.
pub type Result<T, C> = std::result::Result<T, Report<C>>;
