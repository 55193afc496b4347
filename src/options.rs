//! A dynamically-typed key/value store for strategy and compressor settings.
//!
//! Keys are namespaced strings (`"opt:lower_bound"`, `"fraz:nthreads"`).
//! Values are drawn from a closed set of kinds; narrow typed accessors and
//! explicit numeric casts bridge the gap to strongly-typed consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A boxed numeric tensor used as the input/output buffer of a compressor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorBuf {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl TensorBuf {
    pub fn new(dims: Vec<usize>, data: Vec<f64>) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), data.len());
        Self { dims, data }
    }

    pub fn zeros(dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            data: vec![0.0; len],
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The closed set of value kinds an option may hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F64(f64),
    Str(String),
    U8Vec(Vec<u8>),
    U32Vec(Vec<u32>),
    F64Vec(Vec<f64>),
    StrVec(Vec<String>),
    /// 2-D table of doubles, one row per prior evaluation.
    Table(Vec<Vec<f64>>),
    Data(TensorBuf),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::I32(_) => "int32",
            OptionValue::I64(_) => "int64",
            OptionValue::U32(_) => "uint32",
            OptionValue::U64(_) => "uint64",
            OptionValue::F64(_) => "double",
            OptionValue::Str(_) => "string",
            OptionValue::U8Vec(_) => "uint8[]",
            OptionValue::U32Vec(_) => "uint32[]",
            OptionValue::F64Vec(_) => "double[]",
            OptionValue::StrVec(_) => "string[]",
            OptionValue::Table(_) => "double[][]",
            OptionValue::Data(_) => "data",
        }
    }

    /// Explicit widening conversion to double for scalar numeric kinds.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            OptionValue::I32(v) => Some(v as f64),
            OptionValue::I64(v) => Some(v as f64),
            OptionValue::U32(v) => Some(v as f64),
            OptionValue::U64(v) => Some(v as f64),
            OptionValue::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Replace the held scalar with `value`, keeping the kind. Fails when the
    /// conversion would change the value (fractional into an integer kind,
    /// out of range, wrong sign).
    fn assign_f64(&mut self, value: f64) -> Result<(), CastError> {
        fn integral(value: f64, lo: f64, hi: f64) -> Option<f64> {
            (value.fract() == 0.0 && value >= lo && value <= hi).then_some(value)
        }
        match self {
            OptionValue::I32(v) => {
                *v = integral(value, i32::MIN as f64, i32::MAX as f64).ok_or(CastError::Narrowing)?
                    as i32;
            }
            OptionValue::I64(v) => {
                *v = integral(value, i64::MIN as f64, i64::MAX as f64).ok_or(CastError::Narrowing)?
                    as i64;
            }
            OptionValue::U32(v) => {
                *v = integral(value, 0.0, u32::MAX as f64).ok_or(CastError::Narrowing)? as u32;
            }
            OptionValue::U64(v) => {
                *v = integral(value, 0.0, u64::MAX as f64).ok_or(CastError::Narrowing)? as u64;
            }
            OptionValue::F64(v) => *v = value,
            _ => return Err(CastError::NotNumeric),
        }
        Ok(())
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for OptionValue {
            fn from(v: $ty) -> Self {
                OptionValue::$variant(v)
            }
        })*
    };
}

impl_from! {
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f64 => F64,
    String => Str,
    Vec<u8> => U8Vec,
    Vec<u32> => U32Vec,
    Vec<f64> => F64Vec,
    Vec<String> => StrVec,
    Vec<Vec<f64>> => Table,
    TensorBuf => Data,
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CastError {
    #[error("no such option")]
    MissingKey,
    #[error("conversion would change the value")]
    Narrowing,
    #[error("option is not a numeric scalar")]
    NotNumeric,
}

/// An ordered map from namespaced keys to [`OptionValue`]s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into `self`, overwriting on collision.
    pub fn copy_from(&mut self, other: &Options) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(&OptionValue::I32(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key) {
            Some(&OptionValue::U32(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(&OptionValue::U64(v)) => Some(v),
            Some(&OptionValue::U32(v)) => Some(v as u64),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(&OptionValue::F64(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(OptionValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_u8_vec(&self, key: &str) -> Option<&[u8]> {
        match self.get(key) {
            Some(OptionValue::U8Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_u32_vec(&self, key: &str) -> Option<&[u32]> {
        match self.get(key) {
            Some(OptionValue::U32Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_f64_vec(&self, key: &str) -> Option<&[f64]> {
        match self.get(key) {
            Some(OptionValue::F64Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_str_vec(&self, key: &str) -> Option<&[String]> {
        match self.get(key) {
            Some(OptionValue::StrVec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_table(&self, key: &str) -> Option<&[Vec<f64>]> {
        match self.get(key) {
            Some(OptionValue::Table(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_data(&self, key: &str) -> Option<&TensorBuf> {
        match self.get(key) {
            Some(OptionValue::Data(v)) => Some(v),
            _ => None,
        }
    }

    /// Read a numeric scalar as double with explicit conversion.
    pub fn cast(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(OptionValue::as_f64)
    }

    /// Write `value` into an existing entry with explicit conversion into the
    /// entry's kind. The conversion fails rather than silently truncate.
    pub fn cast_set(&mut self, key: &str, value: f64) -> Result<(), CastError> {
        self.0
            .get_mut(key)
            .ok_or(CastError::MissingKey)?
            .assign_f64(value)
    }

    /// A read view that resolves `key` under a dotted instance name: the
    /// scoped spelling `"<name>:<key>"` wins over the bare `"<key>"`.
    pub fn scoped<'a>(&'a self, name: &'a str) -> ScopedOptions<'a> {
        ScopedOptions { opts: self, name }
    }
}

/// Scoped read view produced by [`Options::scoped`].
///
/// Wrappers rename their children to `<parent>/<child prefix>`; options
/// addressed to that subtree use the full name as a key prefix.
#[derive(Clone, Copy)]
pub struct ScopedOptions<'a> {
    opts: &'a Options,
    name: &'a str,
}

impl<'a> ScopedOptions<'a> {
    fn resolve(&self, key: &str) -> Option<&'a OptionValue> {
        if !self.name.is_empty() {
            if let Some(v) = self.opts.get(&format!("{}:{}", self.name, key)) {
                return Some(v);
            }
        }
        self.opts.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    pub fn i32(&self, key: &str) -> Option<i32> {
        match self.resolve(key) {
            Some(&OptionValue::I32(v)) => Some(v),
            _ => None,
        }
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        match self.resolve(key) {
            Some(&OptionValue::U32(v)) => Some(v),
            _ => None,
        }
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.resolve(key) {
            Some(&OptionValue::U64(v)) => Some(v),
            Some(&OptionValue::U32(v)) => Some(v as u64),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.resolve(key) {
            Some(&OptionValue::F64(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str_(&self, key: &str) -> Option<&'a str> {
        match self.resolve(key) {
            Some(OptionValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn u8_vec(&self, key: &str) -> Option<&'a [u8]> {
        match self.resolve(key) {
            Some(OptionValue::U8Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn u32_vec(&self, key: &str) -> Option<&'a [u32]> {
        match self.resolve(key) {
            Some(OptionValue::U32Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn f64_vec(&self, key: &str) -> Option<&'a [f64]> {
        match self.resolve(key) {
            Some(OptionValue::F64Vec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn str_vec(&self, key: &str) -> Option<&'a [String]> {
        match self.resolve(key) {
            Some(OptionValue::StrVec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn table(&self, key: &str) -> Option<&'a [Vec<f64>]> {
        match self.resolve(key) {
            Some(OptionValue::Table(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_round_trip() {
        let mut opts = Options::new();
        opts.set("opt:max_iterations", 100u32);
        opts.set("opt:target", 42.0);
        opts.set("opt:lower_bound", vec![0.0, 1.0]);
        opts.set("opt:objective_mode_name", "target");
        opts.set("opt:is_integral", vec![0u8, 1u8]);

        assert_eq!(opts.get_u32("opt:max_iterations"), Some(100));
        assert_eq!(opts.get_f64("opt:target"), Some(42.0));
        assert_eq!(opts.get_f64_vec("opt:lower_bound"), Some(&[0.0, 1.0][..]));
        assert_eq!(opts.get_str("opt:objective_mode_name"), Some("target"));
        assert_eq!(opts.get_u8_vec("opt:is_integral"), Some(&[0u8, 1u8][..]));
        // wrong-kind reads miss instead of coercing
        assert_eq!(opts.get_f64("opt:max_iterations"), None);
    }

    #[test]
    fn cast_widens_scalars() {
        let mut opts = Options::new();
        opts.set("a", 3u32);
        opts.set("b", -7i32);
        opts.set("c", 2.5);
        assert_eq!(opts.cast("a"), Some(3.0));
        assert_eq!(opts.cast("b"), Some(-7.0));
        assert_eq!(opts.cast("c"), Some(2.5));
        assert_eq!(opts.cast("missing"), None);
    }

    #[test]
    fn cast_set_preserves_kind() {
        let mut opts = Options::new();
        opts.set("level", 3u32);
        opts.cast_set("level", 7.0).unwrap();
        assert_eq!(opts.get_u32("level"), Some(7));

        assert_eq!(opts.cast_set("level", 7.5), Err(CastError::Narrowing));
        assert_eq!(opts.cast_set("level", -1.0), Err(CastError::Narrowing));
        assert_eq!(opts.cast_set("missing", 1.0), Err(CastError::MissingKey));
    }

    #[test]
    fn scoped_lookup_prefers_named_key() {
        let mut opts = Options::new();
        opts.set("opt:target", 1.0);
        opts.set("outer/binary:opt:target", 2.0);

        assert_eq!(opts.scoped("outer/binary").f64("opt:target"), Some(2.0));
        assert_eq!(opts.scoped("outer/guess").f64("opt:target"), Some(1.0));
        assert_eq!(opts.scoped("").f64("opt:target"), Some(1.0));
    }

    #[test]
    fn copy_from_overwrites() {
        let mut a = Options::new();
        a.set("k", 1u32);
        let mut b = Options::new();
        b.set("k", 2u32);
        b.set("other", "x");
        a.copy_from(&b);
        assert_eq!(a.get_u32("k"), Some(2));
        assert_eq!(a.get_str("other"), Some("x"));
    }

    #[test]
    fn tensor_buf_shape() {
        let buf = TensorBuf::zeros(vec![2, 3]);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.dims(), &[2, 3]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cast_set_round_trips_integral_doubles(v in 0u32..1_000_000) {
                let mut opts = Options::new();
                opts.set("k", 0u32);
                opts.cast_set("k", f64::from(v)).unwrap();
                prop_assert_eq!(opts.get_u32("k"), Some(v));
                prop_assert_eq!(opts.cast("k"), Some(f64::from(v)));
            }

            #[test]
            fn cast_set_rejects_fractions(v in 0u32..1_000_000) {
                let mut opts = Options::new();
                opts.set("k", 0u32);
                prop_assert!(opts.cast_set("k", f64::from(v) + 0.5).is_err());
            }
        }
    }
}
