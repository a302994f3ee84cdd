//! Type definitions for state paths.

use std::fmt;
use std::rc::Rc;

use tree_state_util::StateValue;

/// Boolean test applied to a single array element.
#[derive(Clone)]
pub struct ElementPredicate(Rc<dyn Fn(&StateValue) -> bool>);

impl ElementPredicate {
    pub fn new(f: impl Fn(&StateValue) -> bool + 'static) -> Self {
        ElementPredicate(Rc::new(f))
    }

    pub fn test(&self, element: &StateValue) -> bool {
        (self.0)(element)
    }
}

impl fmt::Debug for ElementPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementPredicate")
    }
}

/// Lookup over the whole sequence, returning the index of the selected element.
///
/// Receives every element at once so the choice may depend on the other
/// elements (the latest entry, the largest value, ...).
#[derive(Clone)]
pub struct ElementFinder(Rc<dyn Fn(&[StateValue]) -> Option<usize>>);

impl ElementFinder {
    pub fn new(f: impl Fn(&[StateValue]) -> Option<usize> + 'static) -> Self {
        ElementFinder(Rc::new(f))
    }

    /// Index returned by the finder, discarded when out of range.
    pub fn find(&self, items: &[StateValue]) -> Option<usize> {
        (self.0)(items).filter(|&idx| idx < items.len())
    }
}

impl fmt::Debug for ElementFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElementFinder")
    }
}

/// Selects elements of an array node.
#[derive(Debug, Clone)]
pub enum ElementSelector {
    Index(usize),
    /// Elements satisfying the predicate. Resolution picks the first one,
    /// array operations act on all of them.
    Matching(ElementPredicate),
    Find(ElementFinder),
}

impl ElementSelector {
    pub fn matching(f: impl Fn(&StateValue) -> bool + 'static) -> Self {
        ElementSelector::Matching(ElementPredicate::new(f))
    }

    pub fn find(f: impl Fn(&[StateValue]) -> Option<usize> + 'static) -> Self {
        ElementSelector::Find(ElementFinder::new(f))
    }

    /// Index of the single element this selector addresses during resolution.
    pub fn first_index(&self, items: &[StateValue]) -> Option<usize> {
        match self {
            ElementSelector::Index(idx) => Some(*idx).filter(|&i| i < items.len()),
            ElementSelector::Matching(pred) => items.iter().position(|item| pred.test(item)),
            ElementSelector::Find(finder) => finder.find(items),
        }
    }

    /// Indices of every element this selector addresses, in ascending order.
    pub fn all_indices(&self, items: &[StateValue]) -> Vec<usize> {
        match self {
            ElementSelector::Matching(pred) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| pred.test(item))
                .map(|(idx, _)| idx)
                .collect(),
            other => other.first_index(items).into_iter().collect(),
        }
    }
}

impl From<usize> for ElementSelector {
    fn from(idx: usize) -> Self {
        ElementSelector::Index(idx)
    }
}

impl From<ElementPredicate> for ElementSelector {
    fn from(pred: ElementPredicate) -> Self {
        ElementSelector::Matching(pred)
    }
}

impl From<ElementFinder> for ElementSelector {
    fn from(finder: ElementFinder) -> Self {
        ElementSelector::Find(finder)
    }
}

/// A step in a state path.
#[derive(Debug, Clone)]
pub enum PathSegment {
    /// Field of an object node.
    Key(String),
    /// Element of an array node.
    Element(ElementSelector),
}

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Element(_) => None,
        }
    }

    /// Node kind this segment can step into.
    pub fn expects(&self) -> &'static str {
        match self {
            PathSegment::Key(_) => "object",
            PathSegment::Element(_) => "array",
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        PathSegment::Element(ElementSelector::Index(idx))
    }
}

impl From<ElementSelector> for PathSegment {
    fn from(selector: ElementSelector) -> Self {
        PathSegment::Element(selector)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Element(ElementSelector::Index(idx)) => write!(f, "[{idx}]"),
            PathSegment::Element(_) => f.write_str("[?]"),
        }
    }
}

/// An ordered list of segments addressing a subtree.
///
/// # Example
///
/// ```
/// use tree_state_path::Path;
///
/// let path = Path::root().key("todos").index(2).key("done");
/// assert_eq!(path.to_string(), "todos[2].done");
/// assert_eq!(path.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The empty path, addressing the whole tree.
    pub fn root() -> Self {
        Path::default()
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Path { segments }
    }

    /// A path made of object keys only.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter().map(|k| PathSegment::Key(k.into())).collect()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Element(ElementSelector::Index(idx)));
        self
    }

    /// Append a segment selecting the first element matching `f`.
    pub fn matching(mut self, f: impl Fn(&StateValue) -> bool + 'static) -> Self {
        self.segments.push(PathSegment::Element(ElementSelector::matching(f)));
        self
    }

    /// Append a segment selecting the element whose index `f` returns.
    pub fn find(mut self, f: impl Fn(&[StateValue]) -> Option<usize> + 'static) -> Self {
        self.segments.push(PathSegment::Element(ElementSelector::find(f)));
        self
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.segments.push(segment.into());
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    /// The path without its last segment, `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, init) = self.segments.split_last()?;
        Some(Path {
            segments: init.to_vec(),
        })
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathSegment> {
        self.segments.iter()
    }

    /// The keys of this path, or `None` if it contains an element segment.
    pub fn keys(&self) -> Option<Vec<String>> {
        self.segments
            .iter()
            .map(|s| s.as_key().map(str::to_string))
            .collect()
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Path {
            segments: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path { segments }
    }
}

impl From<&[&str]> for Path {
    fn from(keys: &[&str]) -> Self {
        Path::from_keys(keys.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(keys: [&str; N]) -> Self {
        Path::from_keys(keys)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathSegment;
    type IntoIter = std::slice::Iter<'a, PathSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && matches!(segment, PathSegment::Key(_)) {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(doc: serde_json::Value) -> Vec<StateValue> {
        StateValue::from(doc).as_array().unwrap().to_vec()
    }

    #[test]
    fn test_display() {
        let path = Path::root().key("a").index(0).matching(|_| true).key("b");
        assert_eq!(path.to_string(), "a[0][?].b");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_from_keys() {
        let path = Path::from(["a", "b"]);
        assert_eq!(path.keys(), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(Path::root().key("a").index(1).keys(), None);
    }

    #[test]
    fn test_first_index() {
        let list = items(json!([{"id": 1}, {"id": 2}, {"id": 2}]));
        let sel = ElementSelector::matching(|v| v.get("id").and_then(StateValue::as_i64) == Some(2));
        assert_eq!(sel.first_index(&list), Some(1));
        assert_eq!(sel.all_indices(&list), vec![1, 2]);
        assert_eq!(ElementSelector::Index(3).first_index(&list), None);
        assert_eq!(ElementSelector::Index(0).all_indices(&list), vec![0]);
    }

    #[test]
    fn test_finder_out_of_range_is_none() {
        let list = items(json!([1, 2]));
        let sel = ElementSelector::find(|items| Some(items.len()));
        assert_eq!(sel.first_index(&list), None);
        let last = ElementSelector::find(|items| items.len().checked_sub(1));
        assert_eq!(last.first_index(&list), Some(1));
    }

    #[test]
    fn test_parent() {
        let path = Path::from(["a", "b"]);
        assert_eq!(path.parent().unwrap().to_string(), "a");
        assert_eq!(path.last().and_then(PathSegment::as_key), Some("b"));
        assert!(Path::root().parent().is_none());
    }

    #[test]
    fn test_join() {
        let base = Path::from(["a"]);
        let joined = base.join(&Path::root().index(2));
        assert_eq!(joined.to_string(), "a[2]");
        assert_eq!(base.len(), 1);
    }
}
