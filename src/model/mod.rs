//! Core data types for packages, vulnerabilities, and scan reports.
//!
//! This module contains the fundamental types used throughout nodescan:
//!
//! - [`Package`] - A discovered package at a concrete version
//! - [`Vulnerability`] - A known vulnerability matched against a package
//! - [`VulnerabilityReport`] - Findings of a full scan, grouped by feed
//!
//! # Example
//!
//! ```
//! use nodescan::{Package, VulnerabilityReport};
//!
//! let package = Package::new("lodash", "4.17.21");
//! assert_eq!(package.key(), "lodash@4.17.21");
//!
//! let report = VulnerabilityReport::new();
//! assert!(report.is_clean());
//! ```

mod package;
mod vulnerability;

pub use package::*;
pub use vulnerability::*;
