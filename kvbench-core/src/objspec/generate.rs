//! Turns a parsed [`ObjSpec`] plus a PRNG into record data (§4.4
//! "Generation contract"), and computes the bin-naming scheme (§4.4.1).

use std::fmt;

use rand::RngCore;
use rand::distributions::{Alphanumeric, Distribution};

use super::ast::{ObjSpec, ValueSpec};
use crate::value::Value;

/// Maximum bin name length the wire protocol accepts.
pub const MAX_BIN_NAME_LEN: usize = 15;

#[derive(Debug)]
pub enum GenerateError {
    /// The worst-case name for this `(base, n_bins)` pair — which occurs
    /// at the last bin — exceeds [`MAX_BIN_NAME_LEN`].
    BinNameTooLong { base: String, n_bins: u64, worst_case_len: usize },
    WriteBinIndexOutOfRange(usize),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::BinNameTooLong { base, n_bins, worst_case_len } => write!(
                f,
                "bin name '{base}' with {n_bins} bins has a worst-case length of {worst_case_len}, exceeding {MAX_BIN_NAME_LEN}"
            ),
            GenerateError::WriteBinIndexOutOfRange(i) => {
                write!(f, "write bin index {i} is out of range")
            }
        }
    }
}

impl std::error::Error for GenerateError {}

/// The on-wire name of the `i`-th (0-based) bin out of `n_bins` total, given
/// base name `base`: `base` alone when there is exactly one bin, otherwise
/// `base_<i+1>`.
pub fn bin_name(base: &str, n_bins: u64, i: u64) -> String {
    if n_bins <= 1 {
        base.to_string()
    } else {
        format!("{base}_{}", i + 1)
    }
}

/// The length of the longest name [`bin_name`] can produce for `n_bins`
/// bins under `base` — always the last bin, since `_<k>` only grows with
/// `k`.
pub fn worst_case_bin_name_len(base: &str, n_bins: u64) -> usize {
    if n_bins <= 1 { base.len() } else { bin_name(base, n_bins, n_bins - 1).len() }
}

fn check_bin_name_length(base: &str, n_bins: u64) -> Result<(), GenerateError> {
    let worst_case_len = worst_case_bin_name_len(base, n_bins);
    if worst_case_len > MAX_BIN_NAME_LEN {
        return Err(GenerateError::BinNameTooLong {
            base: base.to_string(),
            n_bins,
            worst_case_len,
        });
    }
    Ok(())
}

/// Flattens `spec`'s top-level bins (each repeated its own `mult` times)
/// into one `ValueSpec` per output bin, in bin-index order.
fn flatten_bins(spec: &ObjSpec) -> Vec<&ValueSpec> {
    spec.bins.iter().flat_map(|bin| std::iter::repeat(&bin.value).take(bin.mult as usize)).collect()
}

/// Generates values for the bins named by `write_bin_indices` (or all of
/// them, if `None`) and returns them as `(bin_name, value)` pairs, in the
/// same order as the requested indices.
///
/// `compression_ratio` controls how much of each generated `Bytes` bin is
/// actually random versus zero-filled (see [`generate_value`]).
pub fn populate(
    spec: &ObjSpec,
    rng: &mut dyn RngCore,
    bin_base_name: &str,
    write_bin_indices: Option<&[usize]>,
    compression_ratio: f64,
) -> Result<Vec<(String, Value)>, GenerateError> {
    let n_bins = spec.n_bins();
    check_bin_name_length(bin_base_name, n_bins)?;
    let flat = flatten_bins(spec);

    let indices: Vec<usize> = match write_bin_indices {
        Some(idx) => idx.to_vec(),
        None => (0..flat.len()).collect(),
    };

    let mut out = Vec::with_capacity(indices.len());
    for i in indices {
        let value_spec = *flat.get(i).ok_or(GenerateError::WriteBinIndexOutOfRange(i))?;
        let name = bin_name(bin_base_name, n_bins, i as u64);
        out.push((name, generate_value(value_spec, rng, compression_ratio)));
    }
    Ok(out)
}

fn generate_value(spec: &ValueSpec, rng: &mut dyn RngCore, compression_ratio: f64) -> Value {
    match spec {
        ValueSpec::Bool => Value::Bool(rng.next_u32() & 1 == 1),
        ValueSpec::Int(width) => Value::Int(random_int_of_width(rng, *width)),
        ValueSpec::Double => Value::Double(random_unit_double(rng)),
        ValueSpec::Str(len) => Value::Str(random_alnum_string(rng, *len as usize)),
        ValueSpec::Bytes(len) => Value::Bytes(random_bytes(rng, *len as usize, compression_ratio)),
        ValueSpec::ConstBool(b) => Value::Bool(*b),
        ValueSpec::ConstInt(v) => Value::Int(*v),
        ValueSpec::ConstStr(s) => Value::Str(s.clone()),
        ValueSpec::ConstDouble(d) => Value::Double(*d),
        ValueSpec::List(items) => {
            Value::List(items.iter().map(|v| generate_value(v, rng, compression_ratio)).collect())
        }
        ValueSpec::Map(entries) => {
            let mut pairs = Vec::new();
            for entry in entries {
                for _ in 0..entry.key_mult {
                    let key = generate_value(&entry.key, rng, compression_ratio);
                    let value = generate_value(&entry.value, rng, compression_ratio);
                    pairs.push((key, value));
                }
            }
            Value::Map(pairs)
        }
    }
}

/// A uniformly random integer using all `width` bytes, cast through `u64`
/// so `I8` can still produce negative `i64`s via two's-complement bit
/// reinterpretation.
fn random_int_of_width(rng: &mut dyn RngCore, width: u8) -> i64 {
    let bits = u32::from(width) * 8;
    let raw = rng.next_u64();
    if bits >= 64 { raw as i64 } else { (raw & ((1u64 << bits) - 1)) as i64 }
}

fn random_unit_double(rng: &mut dyn RngCore) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

fn random_alnum_string(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len).map(|_| Alphanumeric.sample(rng) as char).collect()
}

/// `len` bytes total, of which the leading `floor(len * compression_ratio)`
/// are random and the remainder are zero (§4.4 "Generation contract").
fn random_bytes(rng: &mut dyn RngCore, len: usize, compression_ratio: f64) -> Vec<u8> {
    let random_len = ((len as f64) * compression_ratio).floor() as usize;
    let random_len = random_len.min(len);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf[..random_len]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objspec::parser::parse;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn bin_naming_single_bin_is_bare_base() {
        assert_eq!(bin_name("testbin", 1, 0), "testbin");
    }

    #[test]
    fn bin_naming_multi_bin_uses_one_based_suffix() {
        assert_eq!(bin_name("testbin", 3, 0), "testbin");
        assert_eq!(bin_name("testbin", 3, 1), "testbin_2");
        assert_eq!(bin_name("testbin", 3, 2), "testbin_3");
    }

    #[test]
    fn rejects_base_name_that_overflows_worst_case_length() {
        // base "binbinbinbinbin" (15 bytes) + "_2" (2 bytes) = 17 > 15.
        let spec = parse("I,I").unwrap();
        let err = populate(&spec, &mut StdRng::seed_from_u64(1), "binbinbinbinbin", None, 1.0)
            .unwrap_err();
        assert!(matches!(err, GenerateError::BinNameTooLong { .. }));
    }

    #[test]
    fn end_to_end_scenario_1_populate() {
        let spec = parse("I,D,{3*S10:[B20,D,I8]}").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let record = populate(&spec, &mut rng, "testbin", None, 1.0).unwrap();
        let names: Vec<&str> = record.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["testbin", "testbin_2", "testbin_3"]);
    }

    #[test]
    fn bytes_bin_respects_compression_ratio() {
        let spec = parse("B100").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let record = populate(&spec, &mut rng, "b", None, 0.5).unwrap();
        let Value::Bytes(b) = &record[0].1 else { panic!("expected bytes") };
        assert_eq!(b.len(), 100);
        assert!(b[50..].iter().all(|&x| x == 0));
    }

    #[test]
    fn str_bin_has_exact_length() {
        let spec = parse("S16").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let record = populate(&spec, &mut rng, "b", None, 1.0).unwrap();
        let Value::Str(s) = &record[0].1 else { panic!("expected string") };
        assert_eq!(s.len(), 16);
    }

    #[test]
    fn const_values_are_emitted_exactly() {
        let spec = parse("42,\"hi\",true,2.5").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let record = populate(&spec, &mut rng, "b", None, 1.0).unwrap();
        assert_eq!(record[0].1, Value::Int(42));
        assert_eq!(record[1].1, Value::Str("hi".to_string()));
        assert_eq!(record[2].1, Value::Bool(true));
        assert_eq!(record[3].1, Value::Double(2.5));
    }

    #[test]
    fn map_element_count_is_sum_of_key_mults() {
        let spec = parse("{2*I1:D}").unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let record = populate(&spec, &mut rng, "b", None, 1.0).unwrap();
        let Value::Map(pairs) = &record[0].1 else { panic!("expected map") };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn write_bin_indices_selects_a_subset() {
        let spec = parse("I,D,S4").unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let record = populate(&spec, &mut rng, "b", Some(&[2]), 1.0).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record[0].0, "b_3");
    }
}
