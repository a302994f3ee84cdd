//! Paths over tree-state values.
//!
//! A [`Path`] is an ordered list of [`PathSegment`]s: object keys and array
//! element selectors (an index, a predicate or a whole-sequence finder).
//! [`resolve`] walks a path through a state tree and distinguishes a found
//! value, a missing one and an explicit null.
//!
//! Only key paths are ever persisted; they use the dotted form produced by
//! [`format_dotted`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tree_state_path::{format_dotted, resolve, Path};
//! use tree_state_util::StateValue;
//!
//! let doc = StateValue::from(json!({"users": [{"name": "ada"}, {"name": "bob"}]}));
//! let path = Path::root()
//!     .key("users")
//!     .matching(|u| u.get("name").and_then(StateValue::as_str) == Some("bob"))
//!     .key("name");
//!
//! let found = resolve(&doc, &path).unwrap();
//! assert_eq!(found.value(), Some(&StateValue::from("bob")));
//!
//! let key = format_dotted(&["users".to_string(), "settings".to_string()]);
//! assert_eq!(key, "users.settings");
//! ```

use thiserror::Error;

pub mod dotted;
pub mod resolve;
pub mod types;

pub use dotted::{escape_component, format_dotted, is_under, parse_dotted, unescape_component};
pub use resolve::{get_mut, resolve, Resolution};
pub use types::{ElementFinder, ElementPredicate, ElementSelector, Path, PathSegment};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A segment met a node of the wrong kind: the declared path does not
    /// match the tree's actual shape.
    #[error("path `{path}` expects an {expected} at depth {depth}, found {found}")]
    ShapeMismatch {
        path: String,
        depth: usize,
        expected: &'static str,
        found: &'static str,
    },
}
