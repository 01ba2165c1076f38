//! Binary blobs for array-valued columns.
//!
//! A blob is a bincode archive of named `f32` arrays, each stored with its
//! shape, so decoding needs no outside knowledge of dtypes or dimensions.
//! Maps nested one level deep are flattened to `outer::inner` keys and
//! rebuilt by splitting on the first separator. `None` encodes to no blob and
//! no blob (or an empty one) decodes to `None`.

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use fdtd_core::{Label, NearFieldSnapshots};

use crate::error::CodecError;

pub const KEY_SEPARATOR: &str = "::";
const ARCHIVE_VERSION: u8 = 1;

/// A value in a nested array map.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Array(ArrayD<f32>),
    Group(BTreeMap<String, Node>),
}

pub type NestedMap = BTreeMap<String, Node>;

#[derive(Serialize, Deserialize)]
struct StoredArray {
    key: String,
    shape: Vec<u64>,
    values: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Archive {
    version: u8,
    arrays: Vec<StoredArray>,
}

impl StoredArray {
    fn new(key: String, array: &ArrayD<f32>) -> Self {
        StoredArray {
            key,
            shape: array.shape().iter().map(|&n| n as u64).collect(),
            values: array.iter().copied().collect(),
        }
    }

    fn into_array(self) -> Result<(String, ArrayD<f32>), CodecError> {
        let shape: Vec<usize> = self.shape.iter().map(|&n| n as usize).collect();
        match ArrayD::from_shape_vec(IxDyn(&shape), self.values) {
            Ok(array) => Ok((self.key, array)),
            Err(e) => Err(CodecError::Shape {
                key: self.key,
                message: e.to_string(),
            }),
        }
    }
}

fn check_key(key: &str) -> Result<(), CodecError> {
    if key.contains(KEY_SEPARATOR) {
        return Err(CodecError::SeparatorInKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn write_archive(arrays: Vec<StoredArray>) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(&Archive {
        version: ARCHIVE_VERSION,
        arrays,
    })?)
}

fn read_archive(bytes: &[u8]) -> Result<Vec<StoredArray>, CodecError> {
    let archive: Archive = bincode::deserialize(bytes)?;
    if archive.version != ARCHIVE_VERSION {
        return Err(CodecError::Archive(Box::new(bincode::ErrorKind::Custom(
            format!("unsupported archive version {}", archive.version),
        ))));
    }
    Ok(archive.arrays)
}

// --- Nested maps ---

/// An empty group has no arrays to store and does not survive the round trip.
pub fn encode_nested(map: Option<&NestedMap>) -> Result<Option<Vec<u8>>, CodecError> {
    let Some(map) = map else {
        return Ok(None);
    };

    let mut arrays = Vec::new();
    for (key, node) in map {
        check_key(key)?;
        match node {
            Node::Array(array) => arrays.push(StoredArray::new(key.clone(), array)),
            Node::Group(inner) => {
                for (inner_key, inner_node) in inner {
                    check_key(inner_key)?;
                    let flat = format!("{key}{KEY_SEPARATOR}{inner_key}");
                    match inner_node {
                        Node::Array(array) => arrays.push(StoredArray::new(flat, array)),
                        Node::Group(_) => return Err(CodecError::NotAnArray { key: flat }),
                    }
                }
            }
        }
    }
    write_archive(arrays).map(Some)
}

pub fn decode_nested(bytes: Option<&[u8]>) -> Result<Option<NestedMap>, CodecError> {
    let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        return Ok(None);
    };

    let mut map = NestedMap::new();
    for stored in read_archive(bytes)? {
        let (key, array) = stored.into_array()?;
        match key.split_once(KEY_SEPARATOR) {
            Some((outer, inner)) => {
                let group = map
                    .entry(outer.to_string())
                    .or_insert_with(|| Node::Group(BTreeMap::new()));
                match group {
                    Node::Group(entries) => {
                        entries.insert(inner.to_string(), Node::Array(array));
                    }
                    Node::Array(_) => return Err(CodecError::NotAnArray { key }),
                }
            }
            None => {
                if map.insert(key.clone(), Node::Array(array)).is_some() {
                    return Err(CodecError::NotAnArray { key });
                }
            }
        }
    }
    Ok(Some(map))
}

// --- Flat vectors ---

pub fn encode_vector(values: Option<&[f32]>) -> Result<Option<Vec<u8>>, CodecError> {
    let Some(values) = values else {
        return Ok(None);
    };
    let array = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).map_err(|e| {
        CodecError::Shape {
            key: String::new(),
            message: e.to_string(),
        }
    })?;
    write_archive(vec![StoredArray::new(String::new(), &array)]).map(Some)
}

pub fn decode_vector(bytes: Option<&[u8]>) -> Result<Option<Vec<f32>>, CodecError> {
    let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        return Ok(None);
    };
    let mut arrays = read_archive(bytes)?;
    if arrays.len() != 1 {
        return Err(CodecError::Shape {
            key: String::new(),
            message: format!("expected one array, found {}", arrays.len()),
        });
    }
    let stored = arrays.remove(0);
    Ok(Some(stored.values))
}

// --- Near-field snapshots ---

/// `{distance: {wavelength: field}}` with labels printed as nm.
pub fn snapshots_to_nested(snapshots: &NearFieldSnapshots) -> NestedMap {
    let mut map = NestedMap::new();
    for (distance, wavelength, field) in snapshots.iter() {
        let group = map
            .entry(Label(distance).to_string())
            .or_insert_with(|| Node::Group(BTreeMap::new()));
        if let Node::Group(entries) = group {
            entries.insert(Label(wavelength).to_string(), Node::Array(field.clone()));
        }
    }
    map
}

pub fn nested_to_snapshots(map: NestedMap) -> Result<NearFieldSnapshots, CodecError> {
    let parse = |key: &str| {
        key.parse::<Label>()
            .map_err(|_| CodecError::Label {
                key: key.to_string(),
            })
    };

    let mut snapshots = NearFieldSnapshots::new();
    for (outer, node) in map {
        let Node::Group(entries) = node else {
            return Err(CodecError::Label { key: outer });
        };
        let distance = parse(&outer)?;
        for (inner, node) in entries {
            let wavelength = parse(&inner)?;
            let Node::Array(field) = node else {
                return Err(CodecError::NotAnArray {
                    key: format!("{outer}{KEY_SEPARATOR}{inner}"),
                });
            };
            snapshots.insert(distance.value(), wavelength.value(), field);
        }
    }
    Ok(snapshots)
}

pub fn encode_snapshots(snapshots: Option<&NearFieldSnapshots>) -> Result<Option<Vec<u8>>, CodecError> {
    encode_nested(snapshots.map(snapshots_to_nested).as_ref())
}

pub fn decode_snapshots(bytes: Option<&[u8]>) -> Result<Option<NearFieldSnapshots>, CodecError> {
    decode_nested(bytes)?.map(nested_to_snapshots).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(shape: &[usize], start: f32) -> ArrayD<f32> {
        let n: usize = shape.iter().product();
        ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|i| start + i as f32 * 0.5).collect())
            .unwrap()
    }

    #[test]
    fn test_nested_roundtrip() {
        let mut inner = BTreeMap::new();
        inner.insert("730.5".to_string(), Node::Array(array(&[2, 3, 3], 1.0)));
        inner.insert("950".to_string(), Node::Array(array(&[2, 3, 3], -4.0)));
        let mut map = NestedMap::new();
        map.insert("10".to_string(), Node::Group(inner));
        map.insert("lambda".to_string(), Node::Array(array(&[5], 400.0)));

        let bytes = encode_nested(Some(&map)).unwrap().unwrap();
        let decoded = decode_nested(Some(bytes.as_slice())).unwrap().unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let mut map = NestedMap::new();
        map.insert("10".to_string(), Node::Group(BTreeMap::new()));
        map.insert("lambda".to_string(), Node::Array(array(&[3], 400.0)));

        let bytes = encode_nested(Some(&map)).unwrap().unwrap();
        let decoded = decode_nested(Some(bytes.as_slice())).unwrap().unwrap();
        assert!(!decoded.contains_key("10"));
        map.remove("10");
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_none_roundtrip() {
        assert!(encode_nested(None).unwrap().is_none());
        assert!(decode_nested(None).unwrap().is_none());
        assert!(decode_nested(Some(&[][..])).unwrap().is_none());
        assert!(encode_vector(None).unwrap().is_none());
        assert!(decode_vector(Some(&[][..])).unwrap().is_none());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut deepest = BTreeMap::new();
        deepest.insert("c".to_string(), Node::Array(array(&[1], 0.0)));
        let mut inner = BTreeMap::new();
        inner.insert("b".to_string(), Node::Group(deepest));
        let mut map = NestedMap::new();
        map.insert("a".to_string(), Node::Group(inner));

        match encode_nested(Some(&map)) {
            Err(CodecError::NotAnArray { key }) => assert_eq!(key, "a::b"),
            other => panic!("expected NotAnArray, got {other:?}"),
        }
    }

    #[test]
    fn test_separator_in_key_rejected() {
        let mut map = NestedMap::new();
        map.insert("a::b".to_string(), Node::Array(array(&[1], 0.0)));
        assert!(matches!(
            encode_nested(Some(&map)),
            Err(CodecError::SeparatorInKey { .. })
        ));
    }

    #[test]
    fn test_vector_roundtrip() {
        let values = vec![0.1_f32, -2.5, 3.25e-3];
        let bytes = encode_vector(Some(values.as_slice())).unwrap().unwrap();
        assert_eq!(decode_vector(Some(bytes.as_slice())).unwrap(), Some(values));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode_nested(Some(&[0xff_u8, 0x01, 0x02][..])).is_err());
    }

    #[test]
    fn test_snapshot_labels_roundtrip() {
        let mut snapshots = NearFieldSnapshots::new();
        snapshots.insert(10.0, 729.85, array(&[2, 2, 3], 0.0));
        snapshots.insert(10.0, 1204.4, array(&[2, 2, 3], 1.0));

        let bytes = encode_snapshots(Some(&snapshots)).unwrap();
        let decoded = decode_snapshots(bytes.as_deref()).unwrap().unwrap();
        assert_eq!(decoded, snapshots);
        assert_eq!(decoded.wavelengths_at(10.0), vec![729.85, 1204.4]);
    }

    #[test]
    fn test_top_level_array_is_not_a_snapshot() {
        let mut map = NestedMap::new();
        map.insert("10".to_string(), Node::Array(array(&[1], 0.0)));
        assert!(nested_to_snapshots(map).is_err());
    }
}
