//! Catalog schema versioning.
//!
//! Catalog documents declare the schema they were written against, and the
//! loader refuses documents this build does not understand.

use semver::Version;

/// Catalog schema understood by this crate.
///
/// Alternate catalogs declare `schema_version` at the top of the document and
/// are checked against this constant at load time.
pub const CATALOG_SCHEMA_VERSION: &str = "1.0.0";

/// Check if a catalog document's schema version can be read by the host.
///
/// # Compatibility rules
///
/// - Same major version required (breaking changes only in major versions)
/// - Host version must be >= the document's version
///
/// # Returns
///
/// * `Ok(true)` - Versions are compatible
/// * `Ok(false)` - Versions are incompatible
/// * `Err(msg)` - Version string parsing failed
///
/// # Example
///
/// ```
/// use msp_plugin_catalog::is_schema_compatible;
///
/// assert!(is_schema_compatible("1.0.0", "1.0.0").unwrap());
/// assert!(is_schema_compatible("1.0.0", "1.2.0").unwrap());
/// assert!(!is_schema_compatible("1.3.0", "1.2.0").unwrap());
/// assert!(!is_schema_compatible("2.0.0", "1.9.0").unwrap());
/// ```
pub fn is_schema_compatible(document_version: &str, host_version: &str) -> Result<bool, String> {
    let document = Version::parse(document_version)
        .map_err(|e| format!("Invalid catalog schema version '{}': {}", document_version, e))?;
    let host = Version::parse(host_version)
        .map_err(|e| format!("Invalid host schema version '{}': {}", host_version, e))?;

    Ok(host.major == document.major && host >= document)
}
