mod state;

pub mod nalu_header;
pub mod pps;
pub mod slice_header;
pub mod sps;

pub use state::{FieldValue, GlobalState, LocalState};

use std::collections::HashMap;
use thiserror::Error;

use crate::bitstream::{BitReader, BitstreamError};

#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("bitstream error while reading field {field}: {source}")]
    MalformedField {
        field: &'static str,
        #[source]
        source: BitstreamError,
    },

    #[error("slice header references sps id {seq_parameter_set_id} which has not been parsed yet")]
    SpsUnavailable { seq_parameter_set_id: u8 },

    #[error("slice header references pps id {pic_parameter_set_id} which has not been parsed yet")]
    PpsUnavailable { pic_parameter_set_id: u8 },
}

/// Which cross-NALU map a `save_as_global`/`load_global` directive targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Sps,
    Pps,
}

/// One bit-width/code-type a `field` directive can read.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    U(u32),
    S(u32),
    Ue,
    Se,
    Bool,
}

/// A single, statically defined evaluation step. A [`Scheme`] is an ordered
/// sequence of these, run against `(bit reader, local_state, global_state)`.
pub enum Directive {
    Field {
        name: &'static str,
        kind: FieldKind,
    },
    If {
        cond: fn(&LocalState) -> bool,
        body: Scheme,
    },
    IfElse {
        cond: fn(&LocalState) -> bool,
        then_body: Scheme,
        else_body: Scheme,
    },
    For {
        count: fn(&LocalState) -> u64,
        body: Scheme,
    },
    Calculate {
        name: &'static str,
        derive: fn(&LocalState) -> FieldValue,
    },
    Execute {
        run: fn(&mut BitReader, &mut LocalState, &GlobalState) -> Result<(), SchemeError>,
    },
    SaveAsGlobal {
        namespace: Namespace,
        key: fn(&LocalState) -> u8,
    },
    LoadGlobal {
        namespace: Namespace,
        key: fn(&LocalState) -> u8,
    },
}

pub type Scheme = &'static [Directive];

/// Helpers for `execute()` directives, which read directly off the bit reader
/// instead of going through the declarative `field()` directive.
pub(crate) fn read_u_field(reader: &mut BitReader, field: &'static str, n: u32) -> Result<u64, SchemeError> {
    reader
        .read_u(n)
        .map(|v| v as u64)
        .map_err(|source| SchemeError::MalformedField { field, source })
}

pub(crate) fn read_s_field(reader: &mut BitReader, field: &'static str, n: u32) -> Result<i64, SchemeError> {
    reader
        .read_s(n)
        .map(|v| v as i64)
        .map_err(|source| SchemeError::MalformedField { field, source })
}

pub(crate) fn read_ue_field(reader: &mut BitReader, field: &'static str) -> Result<u64, SchemeError> {
    reader
        .read_ue()
        .map(|v| v as u64)
        .map_err(|source| SchemeError::MalformedField { field, source })
}

pub(crate) fn read_se_field(reader: &mut BitReader, field: &'static str) -> Result<i64, SchemeError> {
    reader
        .read_se()
        .map(|v| v as i64)
        .map_err(|source| SchemeError::MalformedField { field, source })
}

pub(crate) fn read_bool_field(reader: &mut BitReader, field: &'static str) -> Result<bool, SchemeError> {
    reader
        .read_bool()
        .map_err(|source| SchemeError::MalformedField { field, source })
}

fn read_field(
    reader: &mut BitReader,
    name: &'static str,
    kind: FieldKind,
) -> Result<FieldValue, SchemeError> {
    let wrap = |source| SchemeError::MalformedField { field: name, source };
    match kind {
        FieldKind::U(n) => reader.read_u(n).map(|v| FieldValue::U(v as u64)).map_err(wrap),
        FieldKind::S(n) => reader.read_s(n).map(|v| FieldValue::S(v as i64)).map_err(wrap),
        FieldKind::Ue => reader.read_ue().map(|v| FieldValue::U(v as u64)).map_err(wrap),
        FieldKind::Se => reader.read_se().map(|v| FieldValue::S(v as i64)).map_err(wrap),
        FieldKind::Bool => reader.read_bool().map(FieldValue::Bool).map_err(wrap),
    }
}

/// Runs `scheme` against `reader`, accumulating reads and derivations into `local`
/// and reading/writing `global` as directed. `local` is expected to already be
/// cleared by the caller (schemes don't clear it themselves, since slice headers
/// rely on a preceding `load_global` to pre-populate it).
pub fn run(
    scheme: Scheme,
    reader: &mut BitReader,
    local: &mut LocalState,
    global: &mut GlobalState,
) -> Result<(), SchemeError> {
    for directive in scheme {
        match directive {
            Directive::Field { name, kind } => {
                let value = read_field(reader, name, *kind)?;
                local.set(name, value);
            }
            Directive::If { cond, body } => {
                if cond(local) {
                    run(body, reader, local, global)?;
                }
            }
            Directive::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                if cond(local) {
                    run(then_body, reader, local, global)?;
                } else {
                    run(else_body, reader, local, global)?;
                }
            }
            Directive::For { count, body } => {
                let n = count(local);
                let mut per_field: HashMap<&'static str, Vec<FieldValue>> = HashMap::new();
                for _ in 0..n {
                    let mut iteration = LocalState::new();
                    iteration.merge(local.as_map());
                    run(body, reader, &mut iteration, global)?;
                    for (name, value) in iteration.into_map() {
                        if local.get(name).is_some() {
                            // Carried in from the outer scope, not produced this iteration.
                            continue;
                        }
                        per_field.entry(name).or_default().push(value);
                    }
                }
                for (name, values) in per_field {
                    local.set(name, FieldValue::List(values));
                }
            }
            Directive::Calculate { name, derive } => {
                let value = derive(local);
                local.set(name, value);
            }
            Directive::Execute { run: execute } => {
                execute(reader, local, global)?;
            }
            Directive::SaveAsGlobal { namespace, key } => {
                let id = key(local);
                let snapshot = local.as_map().clone();
                match namespace {
                    Namespace::Sps => global.sps.insert(id, snapshot),
                    Namespace::Pps => global.pps.insert(id, snapshot),
                };
            }
            Directive::LoadGlobal { namespace, key } => {
                let id = key(local);
                let entry = match namespace {
                    Namespace::Sps => global
                        .sps
                        .get(&id)
                        .ok_or(SchemeError::SpsUnavailable { seq_parameter_set_id: id })?,
                    Namespace::Pps => global
                        .pps
                        .get(&id)
                        .ok_or(SchemeError::PpsUnavailable { pic_parameter_set_id: id })?,
                };
                let entry = entry.clone();
                local.merge(&entry);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP_SCHEME: Scheme = &[
        Directive::Field {
            name: "count",
            kind: FieldKind::U(3),
        },
        Directive::For {
            count: |s| s.get_u64("count").unwrap(),
            body: &[Directive::Field {
                name: "item",
                kind: FieldKind::U(4),
            }],
        },
    ];

    #[test]
    fn for_directive_collects_per_iteration_values_into_a_list() {
        // count = 3 (0b011), then three 4-bit items: 1, 2, 3
        let data = [0b011_0001_0, 0b010_0011_0];
        let mut reader = BitReader::new(&data);
        let mut local = LocalState::new();
        let mut global = GlobalState::new();
        run(LOOP_SCHEME, &mut reader, &mut local, &mut global).unwrap();

        let items = local.get("item").unwrap().as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_u64(), Some(1));
        assert_eq!(items[1].as_u64(), Some(2));
        assert_eq!(items[2].as_u64(), Some(3));
    }

    const SAVE_SCHEME: Scheme = &[
        Directive::Field {
            name: "id",
            kind: FieldKind::U(8),
        },
        Directive::SaveAsGlobal {
            namespace: Namespace::Sps,
            key: |s| s.get_u64("id").unwrap() as u8,
        },
    ];

    #[test]
    fn save_and_load_global_round_trips_through_the_namespace() {
        let data = [7u8];
        let mut reader = BitReader::new(&data);
        let mut local = LocalState::new();
        let mut global = GlobalState::new();
        run(SAVE_SCHEME, &mut reader, &mut local, &mut global).unwrap();
        assert!(global.sps.contains_key(&7));

        const LOAD_SCHEME: Scheme = &[
            Directive::Field {
                name: "seq_parameter_set_id",
                kind: FieldKind::U(8),
            },
            Directive::LoadGlobal {
                namespace: Namespace::Sps,
                key: |s| s.get_u64("seq_parameter_set_id").unwrap() as u8,
            },
        ];
        let data2 = [7u8];
        let mut reader2 = BitReader::new(&data2);
        let mut local2 = LocalState::new();
        run(LOAD_SCHEME, &mut reader2, &mut local2, &mut global).unwrap();
        assert_eq!(local2.get_u64("id"), Some(7));
    }

    #[test]
    fn load_global_errors_when_sps_id_unknown() {
        const LOAD_SCHEME: Scheme = &[
            Directive::Field {
                name: "seq_parameter_set_id",
                kind: FieldKind::U(8),
            },
            Directive::LoadGlobal {
                namespace: Namespace::Sps,
                key: |s| s.get_u64("seq_parameter_set_id").unwrap() as u8,
            },
        ];
        let data = [9u8];
        let mut reader = BitReader::new(&data);
        let mut local = LocalState::new();
        let mut global = GlobalState::new();
        let err = run(LOAD_SCHEME, &mut reader, &mut local, &mut global).unwrap_err();
        assert!(matches!(
            err,
            SchemeError::SpsUnavailable {
                seq_parameter_set_id: 9
            }
        ));
    }
}
