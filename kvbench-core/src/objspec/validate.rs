//! Checks that previously-populated record data still matches its
//! [`ObjSpec`] (§4.4 "Validation contract") — used by workers running in
//! read-verify stages and by the crate's own tests.

use std::fmt;

use super::ast::{ObjSpec, ValueSpec};
use super::generate::bin_name;
use crate::value::Value;

#[derive(Debug)]
pub enum ValidateError {
    MissingBin(String),
    TypeMismatch { bin: String, expected: &'static str, actual: &'static str },
    LengthMismatch { bin: String, expected: usize, actual: usize },
    ConstMismatch { bin: String, expected: String, actual: String },
    ElementCountMismatch { bin: String, expected: usize, actual: usize },
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidateError::MissingBin(bin) => write!(f, "bin '{bin}' is missing from the record"),
            ValidateError::TypeMismatch { bin, expected, actual } => {
                write!(f, "bin '{bin}': expected {expected}, got {actual}")
            }
            ValidateError::LengthMismatch { bin, expected, actual } => {
                write!(f, "bin '{bin}': expected length {expected}, got {actual}")
            }
            ValidateError::ConstMismatch { bin, expected, actual } => {
                write!(f, "bin '{bin}': expected constant {expected}, got {actual}")
            }
            ValidateError::ElementCountMismatch { bin, expected, actual } => {
                write!(f, "bin '{bin}': expected {expected} elements, got {actual}")
            }
        }
    }
}

impl std::error::Error for ValidateError {}

/// Checks that every bin named by `write_bin_indices` (or all bins, if
/// `None`) is present in `record` and matches its declared spec.
pub fn assert_valid(
    record: &[(String, Value)],
    spec: &ObjSpec,
    write_bin_indices: Option<&[usize]>,
    bin_base_name: &str,
) -> Result<(), ValidateError> {
    let n_bins = spec.n_bins();
    let flat: Vec<&ValueSpec> =
        spec.bins.iter().flat_map(|b| std::iter::repeat(&b.value).take(b.mult as usize)).collect();

    let indices: Vec<usize> = match write_bin_indices {
        Some(idx) => idx.to_vec(),
        None => (0..flat.len()).collect(),
    };

    for i in indices {
        let name = bin_name(bin_base_name, n_bins, i as u64);
        let value = record
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ValidateError::MissingBin(name.clone()))?;
        check_value(&name, flat[i], value)?;
    }
    Ok(())
}

fn check_value(bin: &str, spec: &ValueSpec, value: &Value) -> Result<(), ValidateError> {
    match (spec, value) {
        (ValueSpec::Bool, Value::Bool(_)) => Ok(()),
        (ValueSpec::Int(_), Value::Int(_)) => Ok(()),
        (ValueSpec::Double, Value::Double(_)) => Ok(()),
        (ValueSpec::Str(len), Value::Str(s)) => length_matches(bin, *len as usize, s.len()),
        (ValueSpec::Bytes(len), Value::Bytes(b)) => length_matches(bin, *len as usize, b.len()),
        (ValueSpec::ConstBool(expected), Value::Bool(actual)) => {
            const_matches(bin, expected == actual, expected, actual)
        }
        (ValueSpec::ConstInt(expected), Value::Int(actual)) => {
            const_matches(bin, expected == actual, expected, actual)
        }
        (ValueSpec::ConstStr(expected), Value::Str(actual)) => {
            const_matches(bin, expected == actual, expected, actual)
        }
        (ValueSpec::ConstDouble(expected), Value::Double(actual)) => {
            const_matches(bin, expected == actual, expected, actual)
        }
        (ValueSpec::List(items), Value::List(values)) => {
            if items.len() != values.len() {
                return Err(ValidateError::ElementCountMismatch {
                    bin: bin.to_string(),
                    expected: items.len(),
                    actual: values.len(),
                });
            }
            for (item_spec, v) in items.iter().zip(values) {
                check_value(bin, item_spec, v)?;
            }
            Ok(())
        }
        (ValueSpec::Map(entries), Value::Map(pairs)) => {
            let expected_count: usize = entries.iter().map(|e| e.key_mult as usize).sum();
            if expected_count != pairs.len() {
                return Err(ValidateError::ElementCountMismatch {
                    bin: bin.to_string(),
                    expected: expected_count,
                    actual: pairs.len(),
                });
            }
            let mut idx = 0;
            for entry in entries {
                for _ in 0..entry.key_mult {
                    let (k, v) = &pairs[idx];
                    check_value(bin, &entry.key, k)?;
                    check_value(bin, &entry.value, v)?;
                    idx += 1;
                }
            }
            Ok(())
        }
        _ => Err(ValidateError::TypeMismatch {
            bin: bin.to_string(),
            expected: spec_type_name(spec),
            actual: value_type_name(value),
        }),
    }
}

fn length_matches(bin: &str, expected: usize, actual: usize) -> Result<(), ValidateError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ValidateError::LengthMismatch { bin: bin.to_string(), expected, actual })
    }
}

fn const_matches(
    bin: &str,
    equal: bool,
    expected: impl fmt::Display,
    actual: impl fmt::Display,
) -> Result<(), ValidateError> {
    if equal {
        Ok(())
    } else {
        Err(ValidateError::ConstMismatch {
            bin: bin.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

fn spec_type_name(spec: &ValueSpec) -> &'static str {
    match spec {
        ValueSpec::Bool | ValueSpec::ConstBool(_) => "bool",
        ValueSpec::Int(_) | ValueSpec::ConstInt(_) => "int",
        ValueSpec::Double | ValueSpec::ConstDouble(_) => "double",
        ValueSpec::Str(_) | ValueSpec::ConstStr(_) => "string",
        ValueSpec::Bytes(_) => "bytes",
        ValueSpec::List(_) => "list",
        ValueSpec::Map(_) => "map",
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Double(_) => "double",
        Value::Str(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objspec::generate::populate;
    use crate::objspec::parser::parse;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn accepts_freshly_populated_record() {
        let spec = parse("I,D,{3*S10:[B20,D,I8]}").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let record = populate(&spec, &mut rng, "testbin", None, 1.0).unwrap();
        assert_valid(&record, &spec, None, "testbin").unwrap();
    }

    #[test]
    fn rejects_missing_bin() {
        let spec = parse("I,D").unwrap();
        assert!(matches!(
            assert_valid(&[], &spec, None, "b"),
            Err(ValidateError::MissingBin(_))
        ));
    }

    #[test]
    fn rejects_wrong_length_string() {
        let spec = parse("S10").unwrap();
        let record = vec![("b".to_string(), Value::Str("short".to_string()))];
        assert!(matches!(
            assert_valid(&record, &spec, None, "b"),
            Err(ValidateError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_wrong_const_value() {
        let spec = parse("42").unwrap();
        let record = vec![("b".to_string(), Value::Int(7))];
        assert!(matches!(
            assert_valid(&record, &spec, None, "b"),
            Err(ValidateError::ConstMismatch { .. })
        ));
    }

    #[test]
    fn rejects_type_mismatch() {
        let spec = parse("I").unwrap();
        let record = vec![("b".to_string(), Value::Double(1.0))];
        assert!(matches!(
            assert_valid(&record, &spec, None, "b"),
            Err(ValidateError::TypeMismatch { .. })
        ));
    }
}
