//! YAML workload-stage file parsing (§6 "Stage input").
//!
//! The wire format is a YAML sequence of stage objects; this module owns
//! turning that sequence into the core's own [`Stage`]/[`Stages`] types,
//! including the small `workload` and `object-spec` sub-grammars that
//! live inside individual YAML scalar fields.

use serde::Deserialize;

use crate::error::UsageError;
use crate::objspec::{self, ObjSpec};
use crate::stage::{Stage, Stages, UdfSpec, Workload};

#[derive(Debug, Deserialize)]
struct RawUdf {
    module: String,
    function: String,
    args: String,
}

#[derive(Debug, Deserialize)]
struct RawStage {
    #[serde(default)]
    stage: Option<u32>,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    tps: u64,
    #[serde(rename = "expiration-time", default)]
    expiration_time: u32,
    #[serde(rename = "key-start")]
    key_start: u64,
    #[serde(rename = "key-end")]
    key_end: u64,
    #[serde(default)]
    pause: u64,
    #[serde(rename = "batch-size", default = "default_batch_size")]
    batch_size: u32,
    #[serde(rename = "async", default)]
    is_async: bool,
    #[serde(default)]
    random: bool,
    workload: String,
    #[serde(rename = "object-spec")]
    object_spec: String,
    #[serde(rename = "read-bins", default)]
    read_bins: Option<Vec<String>>,
    #[serde(rename = "write-bins", default)]
    write_bins: Option<Vec<usize>>,
    #[serde(default)]
    udf: Option<RawUdf>,
}

fn default_batch_size() -> u32 {
    1
}

/// Parses a YAML document holding a sequence of stage objects into
/// [`Stages`]. Fails closed: any stage that doesn't parse aborts the
/// whole file rather than silently dropping stages.
pub fn parse_stage_file(yaml: &str) -> Result<Stages, UsageError> {
    let raw: Vec<RawStage> = serde_yaml::from_str(yaml)
        .map_err(|e| UsageError::BadStage(format!("invalid stage file: {e}")))?;
    if raw.is_empty() {
        return Err(UsageError::NoStages);
    }
    let stages = raw.into_iter().enumerate().map(|(i, r)| to_stage(i, r)).collect::<Result<_, _>>()?;
    Ok(Stages::new(stages))
}

fn to_stage(index: usize, raw: RawStage) -> Result<Stage, UsageError> {
    if raw.key_end < raw.key_start {
        return Err(UsageError::BadStage(format!(
            "stage {}: key-end ({}) is before key-start ({})",
            raw.stage.unwrap_or(index as u32 + 1),
            raw.key_end,
            raw.key_start
        )));
    }

    let obj_spec: ObjSpec = objspec::parse(&raw.object_spec)?;
    let workload = parse_workload(&raw.workload, raw.udf, &raw.stage, index)?;

    Ok(Stage {
        duration_s: raw.duration,
        desc: raw.desc,
        tps: raw.tps,
        ttl_s: raw.expiration_time,
        key_start: raw.key_start,
        key_end: raw.key_end,
        pause_s: raw.pause,
        batch_size: raw.batch_size,
        is_async: raw.is_async,
        random: raw.random,
        workload,
        obj_spec,
        read_bins: raw.read_bins,
        write_bins: raw.write_bins,
    })
}

/// Parses the `workload` field's dice-string grammar: `I`, `RU[,pct]`,
/// `RR[,pct]`, `RUF[,read_pct,write_pct]`, `RUD[,read_pct,write_pct]`,
/// `DB`. Missing percentages fall back to the stage-file defaults from
/// §6 (RU 50, RR 100, RUF/RUD 65/25).
fn parse_workload(
    spec: &str,
    udf: Option<RawUdf>,
    stage_num: &Option<u32>,
    index: usize,
) -> Result<Workload, UsageError> {
    let stage_label = || stage_num.unwrap_or(index as u32 + 1);
    let mut parts = spec.split(',').map(str::trim);
    let tag = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest: Vec<&str> = parts.collect();

    let parse_pct = |s: &str, label: &str| -> Result<u32, UsageError> {
        s.parse().map_err(|_| {
            UsageError::BadStage(format!("stage {}: bad {label} percentage {s:?}", stage_label()))
        })
    };

    match tag.as_str() {
        "I" => Ok(Workload::InsertLinear { pct: 100 }),
        "DB" => Ok(Workload::DeleteBin),
        "RU" => {
            let read_pct = match rest.as_slice() {
                [] => 50,
                [p] => parse_pct(p, "read")?,
                _ => return Err(too_many_args(stage_label(), "RU")),
            };
            Ok(Workload::ReadUpdate { read_pct })
        }
        "RR" => {
            let read_pct = match rest.as_slice() {
                [] => 100,
                [p] => parse_pct(p, "read")?,
                _ => return Err(too_many_args(stage_label(), "RR")),
            };
            Ok(Workload::ReadReplace { read_pct })
        }
        "RUF" => {
            let (read_pct, write_pct) = match rest.as_slice() {
                [] => (65, 25),
                [r, w] => (parse_pct(r, "read")?, parse_pct(w, "write")?),
                _ => return Err(too_many_args(stage_label(), "RUF")),
            };
            let udf = udf.ok_or_else(|| {
                UsageError::BadStage(format!("stage {}: RUF workload requires a udf block", stage_label()))
            })?;
            let args_spec = objspec::parse(&udf.args)?;
            Ok(Workload::ReadUpdateFn {
                read_pct,
                write_pct,
                udf: UdfSpec { module: udf.module, function: udf.function, args_spec },
            })
        }
        "RUD" => {
            let (read_pct, write_pct) = match rest.as_slice() {
                [] => (65, 25),
                [r, w] => (parse_pct(r, "read")?, parse_pct(w, "write")?),
                _ => return Err(too_many_args(stage_label(), "RUD")),
            };
            Ok(Workload::ReadUpdateDelete { read_pct, write_pct })
        }
        other => Err(UsageError::BadStage(format!(
            "stage {}: unknown workload tag {other:?}",
            stage_label()
        ))),
    }
}

fn too_many_args(stage: u32, tag: &str) -> UsageError {
    UsageError::BadStage(format!("stage {stage}: too many arguments to workload {tag:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_insert_stage() {
        let yaml = "
- desc: load
  key-start: 0
  key-end: 1000
  workload: I
  object-spec: I,S10
";
        let stages = parse_stage_file(yaml).unwrap();
        assert_eq!(stages.len(), 1);
        assert!(matches!(stages.get(0).unwrap().workload, Workload::InsertLinear { .. }));
        assert_eq!(stages.get(0).unwrap().batch_size, 1);
    }

    #[test]
    fn ru_workload_defaults_read_pct_to_fifty() {
        let yaml = "
- key-start: 0
  key-end: 1
  workload: RU
  object-spec: I
";
        let stages = parse_stage_file(yaml).unwrap();
        match stages.get(0).unwrap().workload {
            Workload::ReadUpdate { read_pct } => assert_eq!(read_pct, 50),
            _ => panic!("expected ReadUpdate"),
        }
    }

    #[test]
    fn ruf_workload_requires_a_udf_block() {
        let yaml = "
- key-start: 0
  key-end: 1
  workload: RUF
  object-spec: I
";
        let err = parse_stage_file(yaml).unwrap_err();
        assert!(matches!(err, UsageError::BadStage(_)));
    }

    #[test]
    fn ruf_workload_parses_udf_and_custom_percentages() {
        let yaml = "
- key-start: 0
  key-end: 1
  workload: RUF,70,20
  object-spec: I
  udf:
    module: mod1
    function: fn1
    args: I,S5
";
        let stages = parse_stage_file(yaml).unwrap();
        match &stages.get(0).unwrap().workload {
            Workload::ReadUpdateFn { read_pct, write_pct, udf } => {
                assert_eq!(*read_pct, 70);
                assert_eq!(*write_pct, 20);
                assert_eq!(udf.module, "mod1");
                assert_eq!(udf.function, "fn1");
            }
            _ => panic!("expected ReadUpdateFn"),
        }
    }

    #[test]
    fn rejects_key_end_before_key_start() {
        let yaml = "
- key-start: 100
  key-end: 10
  workload: I
  object-spec: I
";
        let err = parse_stage_file(yaml).unwrap_err();
        assert!(matches!(err, UsageError::BadStage(_)));
    }

    #[test]
    fn rejects_empty_stage_list() {
        let err = parse_stage_file("[]").unwrap_err();
        assert!(matches!(err, UsageError::NoStages));
    }

    #[test]
    fn async_and_random_flags_round_trip() {
        let yaml = "
- key-start: 0
  key-end: 1
  workload: RU,50
  object-spec: I
  async: true
  random: true
  batch-size: 4
";
        let stages = parse_stage_file(yaml).unwrap();
        let stage = stages.get(0).unwrap();
        assert!(stage.is_async);
        assert!(stage.random);
        assert_eq!(stage.batch_size, 4);
    }
}
