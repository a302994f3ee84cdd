//! Dotted key paths, the only path form that is ever persisted.
//!
//! Components are joined with `.`; a literal `~` is escaped as `~0` and a
//! literal `.` as `~1`, mirroring the RFC 6901 escaping scheme.

/// Unescapes a dotted path component.
///
/// # Example
///
/// ```
/// use tree_state_path::unescape_component;
///
/// assert_eq!(unescape_component("a~0b"), "a~b");
/// assert_eq!(unescape_component("c~1d"), "c.d");
/// assert_eq!(unescape_component("no-escapes"), "no-escapes");
/// ```
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~1 must be replaced before ~0
    component.replace("~1", ".").replace("~0", "~")
}

/// Escapes a dotted path component.
///
/// # Example
///
/// ```
/// use tree_state_path::escape_component;
///
/// assert_eq!(escape_component("a~b"), "a~0b");
/// assert_eq!(escape_component("c.d"), "c~1d");
/// ```
pub fn escape_component(component: &str) -> String {
    if !component.contains('.') && !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~ must be escaped before .
    component.replace('~', "~0").replace('.', "~1")
}

/// Format key components into a dotted key.
///
/// # Example
///
/// ```
/// use tree_state_path::format_dotted;
///
/// assert_eq!(format_dotted(&[]), "");
/// assert_eq!(format_dotted(&["foo".to_string(), "bar".to_string()]), "foo.bar");
/// ```
pub fn format_dotted(path: &[String]) -> String {
    path.iter()
        .map(|component| escape_component(component))
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse a dotted key into its components.
///
/// The empty string is the root path.
///
/// # Example
///
/// ```
/// use tree_state_path::parse_dotted;
///
/// assert_eq!(parse_dotted(""), Vec::<String>::new());
/// assert_eq!(parse_dotted("foo.bar"), vec!["foo", "bar"]);
/// assert_eq!(parse_dotted("a~1b.c"), vec!["a.b", "c"]);
/// ```
pub fn parse_dotted(key: &str) -> Vec<String> {
    if key.is_empty() {
        return Vec::new();
    }
    key.split('.').map(unescape_component).collect()
}

/// True when `key` is `prefix` itself or lies below it.
///
/// # Example
///
/// ```
/// use tree_state_path::is_under;
///
/// assert!(is_under("a.b", "a.b"));
/// assert!(is_under("a.b.c", "a.b"));
/// assert!(!is_under("a.bc", "a.b"));
/// ```
pub fn is_under(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}
