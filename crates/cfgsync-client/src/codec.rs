//! Tree/flat codec
//!
//! Converts a [`ConfigTree`] into leaf `(path, value)` pairs addressed by
//! slash-delimited names, and rebuilds trees from such pairs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::tree::{ConfigTree, ConfigValue, Scalar};

/// Separator between path segments in a flat name.
pub const PATH_SEPARATOR: char = '/';

/// Separator used by the delimited list encoding.
pub const LIST_DELIMITER: char = ',';

/// How sequences are stored in the flat namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayEncoding {
    /// One value holding the JSON encoding of the whole sequence.
    #[default]
    Json,
    /// Legacy comma-joined list. Lossy, so only flat sequences of
    /// comma-free scalars are accepted.
    Delimited,
}

/// A stored leaf, ready to hand to a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodedValue {
    /// A JSON literal.
    Json(String),
    /// A comma-joined list.
    List(String),
}

impl EncodedValue {
    pub fn as_str(&self) -> &str {
        match self {
            EncodedValue::Json(s) | EncodedValue::List(s) => s,
        }
    }
}

/// An absolute, non-empty sequence of non-empty path segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatPath(Vec<String>);

impl FlatPath {
    /// Parses a slash-delimited name. One leading separator is stripped.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.strip_prefix(PATH_SEPARATOR).unwrap_or(name);
        let segments: Vec<String> = trimmed.split(PATH_SEPARATOR).map(str::to_string).collect();
        Self::from_segments(segments).map_err(|_| SyncError::InvalidPath(name.to_string()))
    }

    /// Parses a namespace prefix. Unlike [`FlatPath::parse`] a single
    /// trailing separator is tolerated, so `svc`, `/svc` and `/svc/` are
    /// the same prefix.
    pub fn parse_prefix(prefix: &str) -> Result<Self> {
        let trimmed = prefix.strip_suffix(PATH_SEPARATOR).unwrap_or(prefix);
        Self::parse(trimmed).map_err(|_| SyncError::InvalidPath(prefix.to_string()))
    }

    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            return Err(SyncError::InvalidPath("empty path".to_string()));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// Returns this path extended by one segment.
    pub fn child(&self, segment: &str) -> Result<Self> {
        validate_segment(segment)?;
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn into_segments(self) -> Vec<String> {
        self.0
    }

    /// The segments after `prefix`, if this path lies under it.
    pub fn strip_prefix(&self, prefix: &FlatPath) -> Option<&[String]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }
}

impl fmt::Display for FlatPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "{}{}", PATH_SEPARATOR, segment)?;
        }
        Ok(())
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(SyncError::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains(PATH_SEPARATOR) {
        return Err(SyncError::InvalidPath(format!(
            "segment {:?} contains '{}'",
            segment, PATH_SEPARATOR
        )));
    }
    Ok(())
}

/// Splits a stored name into its segments.
pub fn path_to_segments(name: &str) -> Result<Vec<String>> {
    FlatPath::parse(name).map(FlatPath::into_segments)
}

/// Depth-first flattening of `tree` below `root`.
///
/// Mappings are descended into, while scalars and whole sequences become
/// leaves. Empty mappings produce no leaves at all.
pub fn flatten(root: &FlatPath, tree: &ConfigTree) -> Result<Vec<(FlatPath, ConfigValue)>> {
    let mut out = Vec::new();
    flatten_into(root, tree, &mut out)?;
    Ok(out)
}

fn flatten_into(
    path: &FlatPath,
    tree: &ConfigTree,
    out: &mut Vec<(FlatPath, ConfigValue)>,
) -> Result<()> {
    for (key, value) in tree {
        let child = path.child(key)?;
        match value {
            ConfigValue::Mapping(m) => flatten_into(&child, m, out)?,
            leaf => out.push((child, leaf.clone())),
        }
    }
    Ok(())
}

/// Encodes a leaf produced by [`flatten`].
pub fn encode(value: &ConfigValue, arrays: ArrayEncoding) -> Result<EncodedValue> {
    match (value, arrays) {
        (ConfigValue::Sequence(items), ArrayEncoding::Delimited) => encode_delimited(items),
        (ConfigValue::Mapping(_), _) => Err(SyncError::Encoding(
            "mappings are flattened, not encoded".to_string(),
        )),
        _ => Ok(EncodedValue::Json(serde_json::to_string(value)?)),
    }
}

fn encode_delimited(items: &[ConfigValue]) -> Result<EncodedValue> {
    if items.is_empty() {
        return Err(SyncError::Encoding(
            "empty lists cannot be stored delimited".to_string(),
        ));
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let Some(scalar) = item.as_scalar() else {
            return Err(SyncError::Encoding(
                "delimited lists may only hold scalars".to_string(),
            ));
        };
        let text = scalar.to_string();
        if text.contains(LIST_DELIMITER) {
            return Err(SyncError::Encoding(format!(
                "list element {:?} contains '{}'",
                text, LIST_DELIMITER
            )));
        }
        parts.push(text);
    }
    Ok(EncodedValue::List(parts.join(",")))
}

/// Decodes a stored JSON literal. Values that are not valid JSON (or are
/// `null`) are poison records: they are logged and skipped.
pub fn decode(name: &str, raw: &str) -> Option<ConfigValue> {
    match serde_json::from_str::<ConfigValue>(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(parameter = %name, error = %e, "Skipping parameter with undecodable value");
            None
        }
    }
}

/// Decodes a comma-joined list into a sequence of strings.
pub fn decode_list(raw: &str) -> ConfigValue {
    ConfigValue::Sequence(
        raw.split(LIST_DELIMITER)
            .map(|s| ConfigValue::Scalar(Scalar::String(s.to_string())))
            .collect(),
    )
}

/// Rebuilds a tree from `(segments, value)` pairs.
///
/// Intermediate mappings are created on demand and later pairs overwrite
/// earlier ones at the same path.
pub fn unflatten<I, P>(pairs: I) -> ConfigTree
where
    I: IntoIterator<Item = (P, ConfigValue)>,
    P: AsRef<[String]>,
{
    let mut root = ConfigTree::new();
    for (path, value) in pairs {
        let path = path.as_ref();
        let Some((last, parents)) = path.split_last() else {
            continue;
        };
        let mut node = &mut root;
        for segment in parents {
            node = descend(node, segment);
        }
        node.insert(last.clone(), value);
    }
    root
}

fn descend<'a>(node: &'a mut ConfigTree, segment: &str) -> &'a mut ConfigTree {
    let entry = node
        .entry(segment.to_string())
        .or_insert_with(|| ConfigValue::Mapping(ConfigTree::new()));
    if entry.as_mapping().is_none() {
        warn!(segment = %segment, "Replacing leaf value with nested mapping");
        *entry = ConfigValue::Mapping(ConfigTree::new());
    }
    match entry {
        ConfigValue::Mapping(m) => m,
        _ => unreachable!("entry was just made a mapping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::sanitize;
    use serde_json::json;

    fn tree(v: serde_json::Value) -> ConfigTree {
        serde_json::from_value(v).unwrap()
    }

    fn segs(path: &str) -> Vec<String> {
        path_to_segments(path).unwrap()
    }

    #[test]
    fn test_path_to_segments() {
        assert_eq!(segs("/foo/bar/baz"), vec!["foo", "bar", "baz"]);
        assert_eq!(segs("foo/bar"), vec!["foo", "bar"]);
        assert!(path_to_segments("/foo//bar").is_err());
        assert!(path_to_segments("/").is_err());
        assert!(path_to_segments("").is_err());
    }

    #[test]
    fn test_parse_prefix() {
        let a = FlatPath::parse_prefix("svc").unwrap();
        let b = FlatPath::parse_prefix("/svc/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "/svc");
        assert_eq!(FlatPath::parse_prefix("team/svc").unwrap().to_string(), "/team/svc");
        assert!(FlatPath::parse_prefix("//").is_err());
    }

    #[test]
    fn test_flatten_scenario() {
        let root = FlatPath::parse("svc").unwrap();
        let pairs = flatten(&root, &tree(json!({"a": {"b": 1, "c": ["x", "y"]}}))).unwrap();
        let rendered: Vec<(String, String)> = pairs
            .iter()
            .map(|(p, v)| {
                (
                    p.to_string(),
                    encode(v, ArrayEncoding::Json).unwrap().as_str().to_string(),
                )
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("/svc/a/b".to_string(), "1".to_string()),
                ("/svc/a/c".to_string(), r#"["x","y"]"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_flatten_rejects_bad_keys() {
        let root = FlatPath::parse("svc").unwrap();
        assert!(matches!(
            flatten(&root, &tree(json!({"a/b": 1}))),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(flatten(&root, &tree(json!({"": 1}))).is_err());
    }

    #[test]
    fn test_flatten_skips_empty_mappings() {
        let root = FlatPath::parse("svc").unwrap();
        let pairs = flatten(&root, &tree(json!({"a": {}, "b": {"c": {}}}))).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_delimited_encoding() {
        let ok = ConfigValue::Sequence(vec!["x".into(), 2i64.into(), true.into()]);
        assert_eq!(
            encode(&ok, ArrayEncoding::Delimited).unwrap(),
            EncodedValue::List("x,2,true".to_string())
        );

        let comma = ConfigValue::Sequence(vec!["a,b".into()]);
        assert!(matches!(
            encode(&comma, ArrayEncoding::Delimited),
            Err(SyncError::Encoding(_))
        ));

        let nested = ConfigValue::Sequence(vec![ConfigValue::Sequence(vec![])]);
        assert!(encode(&nested, ArrayEncoding::Delimited).is_err());
        assert!(encode(&ConfigValue::Sequence(vec![]), ArrayEncoding::Delimited).is_err());

        // scalars stay JSON even in delimited mode
        assert_eq!(
            encode(&"v".into(), ArrayEncoding::Delimited).unwrap(),
            EncodedValue::Json("\"v\"".to_string())
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("/a", "1"), Some(1i64.into()));
        assert_eq!(decode("/a", "\"x\""), Some("x".into()));
        assert_eq!(decode("/a", "not json"), None);
        assert_eq!(decode("/a", "null"), None);
        assert_eq!(
            decode_list("a,b"),
            ConfigValue::Sequence(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_unflatten_last_write_wins() {
        let t = unflatten(vec![
            (segs("/foo/baz"), ConfigValue::from(1i64)),
            (segs("/foo/bar"), ConfigValue::from(2i64)),
            (segs("/foo/baz"), ConfigValue::from(3i64)),
        ]);
        assert_eq!(t, tree(json!({"foo": {"bar": 2, "baz": 3}})));
    }

    #[test]
    fn test_unflatten_replaces_leaf_with_mapping() {
        let t = unflatten(vec![
            (segs("/a"), ConfigValue::from(1i64)),
            (segs("/a/b"), ConfigValue::from(2i64)),
        ]);
        assert_eq!(t, tree(json!({"a": {"b": 2}})));
    }

    #[test]
    fn test_roundtrip_with_empty_groups() {
        let input = tree(json!({
            "db": {"host": "h", "port": 5432, "opts": {}},
            "flags": [true, false],
            "empty": {}
        }));
        let root = FlatPath::parse("svc").unwrap();
        let pairs: Vec<(Vec<String>, ConfigValue)> = flatten(&root, &input)
            .unwrap()
            .into_iter()
            .map(|(p, v)| {
                let raw = encode(&v, ArrayEncoding::Json).unwrap();
                let decoded = decode(&p.to_string(), raw.as_str()).unwrap();
                (p.strip_prefix(&root).unwrap().to_vec(), decoded)
            })
            .collect();
        assert_eq!(unflatten(pairs), sanitize(&input));
    }
}
