//! Application name configuration for on-disk store locations

/// Application identifier used to place [`FileStorage`](crate::FileStorage) records
///
/// Resolved through the platform's config-local directory, following the
/// [XDG Base Directory Specification](https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html)
/// on Linux and similar conventions elsewhere.
///
/// # Example
///
/// ```
/// use iced_persist::AppName;
///
/// let app_name = AppName::new("com", "example", "myapp");
/// assert_eq!(app_name.application, "myapp");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppName {
    pub qualifier: String,
    pub organization: String,
    pub application: String,
}

impl AppName {
    /// Create a new application name
    ///
    /// # Arguments
    ///
    /// * `qualifier` - Typically a reverse domain name (e.g., "com", "org")
    /// * `organization` - Your organization or username (e.g., "mycompany")
    /// * `application` - The application name (e.g., "myapp")
    pub fn new(
        qualifier: impl Into<String>,
        organization: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            qualifier: qualifier.into(),
            organization: organization.into(),
            application: application.into(),
        }
    }
}
