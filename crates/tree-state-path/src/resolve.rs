use tree_state_util::StateValue;

use crate::types::{Path, PathSegment};
use crate::PathError;

/// Outcome of resolving a path against a state tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// The path leads to a non-null value.
    Found(&'a StateValue),
    /// A key is absent, an index is out of range or no element matched.
    NotFound,
    /// The path leads to, or runs through, an explicit null.
    Null,
}

impl<'a> Resolution<'a> {
    pub fn value(&self) -> Option<&'a StateValue> {
        match self {
            Resolution::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    /// The found value, or `Null` for both absent outcomes.
    pub fn cloned_or_null(&self) -> StateValue {
        self.value().cloned().unwrap_or(StateValue::Null)
    }
}

/// Resolve `path` against `root`.
///
/// Walks the segments left to right. A key segment must meet an object and an
/// element segment must meet an array; anything else is a
/// [`PathError::ShapeMismatch`]. Meeting a null, at the end or while
/// segments remain, resolves to [`Resolution::Null`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tree_state_path::{resolve, Path, Resolution};
/// use tree_state_util::StateValue;
///
/// let doc = StateValue::from(json!({"foo": {"bar": [10, 20]}, "gone": null}));
///
/// let found = resolve(&doc, &Path::root().key("foo").key("bar").index(1)).unwrap();
/// assert_eq!(found, Resolution::Found(&StateValue::from(20)));
///
/// assert_eq!(resolve(&doc, &Path::from(["missing"])).unwrap(), Resolution::NotFound);
/// assert_eq!(resolve(&doc, &Path::from(["gone", "deeper"])).unwrap(), Resolution::Null);
/// ```
pub fn resolve<'a>(root: &'a StateValue, path: &Path) -> Result<Resolution<'a>, PathError> {
    let mut current = root;

    for (depth, segment) in path.iter().enumerate() {
        if current.is_null() {
            return Ok(Resolution::Null);
        }
        let next = match (segment, current) {
            (PathSegment::Key(key), StateValue::Object(obj)) => obj.get(key),
            (PathSegment::Element(selector), StateValue::Array(arr)) => {
                selector.first_index(arr).map(|idx| &arr[idx])
            }
            (segment, other) => {
                return Err(PathError::ShapeMismatch {
                    path: path.to_string(),
                    depth,
                    expected: segment.expects(),
                    found: other.kind(),
                })
            }
        };
        match next {
            Some(v) => current = v,
            None => return Ok(Resolution::NotFound),
        }
    }

    Ok(if current.is_null() {
        Resolution::Null
    } else {
        Resolution::Found(current)
    })
}

/// Mutable navigation to an existing value. Returns `None` on any miss or
/// shape mismatch.
pub fn get_mut<'a>(root: &'a mut StateValue, path: &Path) -> Option<&'a mut StateValue> {
    let mut current = root;
    for segment in path {
        current = match (segment, current) {
            (PathSegment::Key(key), StateValue::Object(obj)) => obj.get_mut(key)?,
            (PathSegment::Element(selector), StateValue::Array(arr)) => {
                let idx = selector.first_index(arr)?;
                &mut arr[idx]
            }
            _ => return None,
        };
    }
    Some(current)
}
