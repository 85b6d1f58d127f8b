//! Argument marshalling.
//!
//! The first call of a proxied function fixes how each input crosses the
//! wire. [`unpack`] turns a fragment's requirements into the script preamble
//! that reads `ARGV` back into Lua locals, `self` fields and helper closures.
//! [`wire_values`] and [`encode_args`] produce the `ARGV` of every call.

use crate::analysis::{LineRange, Required};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::host::{Environment, Instance};
use crate::syntax::parse_function;
use crate::translate::expr::self_field;
use crate::translate::prelude::lua_name;
use crate::translate::Fragment;
use crate::value::{ArgShape, Value};
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};

/// Where the value of a wire slot comes from on each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    /// The n-th positional argument of the call.
    Argument(usize),
    /// An attribute of the receiving instance.
    Attribute(String),
}

/// One `ARGV` entry of the compiled script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Name the script binds the value to.
    pub name: String,
    /// Where each call takes the value from.
    pub source: SlotSource,
    /// Shape seen on the first call, which fixes the decoding.
    pub shape: ArgShape,
}

/// Script text that binds the inputs, and the wire layout it expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preamble {
    /// Lua statements declaring every input.
    pub text: String,
    /// Wire layout, one entry per `ARGV` index.
    pub slots: Vec<Slot>,
    /// A helper closure drains pipelined results.
    pub uses_pipeline: bool,
}

/// Builds the preamble of `fragment` for a call with `args`.
///
/// Helper methods called through `self` are compiled once each. Their own
/// attribute and helper requirements are added until nothing new turns up.
pub fn unpack(
    fragment: &Fragment,
    args: &[Value],
    instance: Option<&Instance>,
    environment: &Environment,
    options: &Options,
) -> Result<Preamble> {
    let mut lines = vec!["local self = {}".to_string()];
    let mut closures = String::new();
    let mut slots: Vec<Slot> = Vec::new();
    let mut uses_pipeline = false;
    let mut next_arg = 0;

    let mut queue: VecDeque<Required> = fragment.inputs.iter().cloned().collect();
    let mut seen = HashSet::new();

    while let Some(required) = queue.pop_front() {
        if !seen.insert(required.clone()) {
            continue;
        }
        match required {
            Required::Local(name) => {
                let value = args.get(next_arg).ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "`{}` expects at least {} arguments, got {}",
                        fragment.name,
                        next_arg + 1,
                        args.len()
                    ))
                })?;
                let target = lua_name(&name);
                let shape = value.shape();
                slots.push(Slot {
                    name,
                    source: SlotSource::Argument(next_arg),
                    shape,
                });
                next_arg += 1;
                bind(&mut lines, format!("local {}", target), &target, shape, slots.len());
            }
            Required::Attribute(name) => {
                let value = instance
                    .and_then(|i| i.attribute(&name))
                    .ok_or_else(|| Error::invalid_argument(format!("instance has no attribute `{}`", name)))?;
                let target = self_field(&name);
                let shape = value.shape();
                slots.push(Slot {
                    name: name.clone(),
                    source: SlotSource::Attribute(name),
                    shape,
                });
                bind(&mut lines, target.clone(), &target, shape, slots.len());
            }
            Required::Helper(name) => {
                let helper = compile_helper(fragment, &name, instance, environment, options)?;
                for needed in &helper.inputs {
                    match needed {
                        Required::Local(local) if !helper.params.contains(local) => {
                            return Err(Error::untranslatable(
                                format!("free name `{}` in helper `{}`", local, name),
                                0,
                            ));
                        }
                        Required::Local(_) => {}
                        other => queue.push_back(other.clone()),
                    }
                }
                uses_pipeline |= helper.uses_pipeline;
                closures.push_str(&helper.helper_closure());
            }
        }
    }

    if next_arg != args.len() {
        return Err(Error::invalid_argument(format!(
            "`{}` takes {} arguments, got {}",
            fragment.name,
            next_arg,
            args.len()
        )));
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text.push_str(&closures);
    Ok(Preamble {
        text,
        slots,
        uses_pipeline,
    })
}

/// Emits `target = conv(ARGV[k])`, flagging maps.
fn bind(lines: &mut Vec<String>, declaration: String, target: &str, shape: ArgShape, k: usize) {
    let source = match shape.conversion() {
        "" => format!("ARGV[{}]", k),
        conversion => format!("{}(ARGV[{}])", conversion, k),
    };
    lines.push(format!("{} = {}", declaration, source));
    if shape == ArgShape::Mapping {
        lines.push(format!("{}.__DICT = true", target));
    }
}

fn compile_helper(
    fragment: &Fragment,
    name: &str,
    instance: Option<&Instance>,
    environment: &Environment,
    options: &Options,
) -> Result<Fragment> {
    let source = instance
        .and_then(|i| i.method_source(name))
        .ok_or_else(|| Error::invalid_argument(format!("instance has no method `{}`", name)))?;
    let def = parse_function(source)?;
    // Remote objects reachable through `self` stay remote inside helpers.
    let remotes = fragment
        .remote_objects
        .iter()
        .filter(|r| r.dotted_path().is_some_and(|p| p.len() > 1 && p[0] == "self"))
        .cloned()
        .collect();
    let mut helper = Fragment::compile(&def, remotes, LineRange::whole(&def), environment, options, true)?;
    helper.name = name.to_string();
    log::debug!("compiled helper `{}` for `{}`", name, fragment.name);
    Ok(helper)
}

/// Values for every slot of a call, in wire order.
///
/// With `check_shapes` set, a value whose shape differs from the one the
/// script was compiled for is rejected.
pub fn wire_values(
    slots: &[Slot],
    args: &[Value],
    instance: Option<&Instance>,
    check_shapes: bool,
) -> Result<Vec<Value>> {
    let expected = slots
        .iter()
        .filter(|s| matches!(s.source, SlotSource::Argument(_)))
        .count();
    if args.len() != expected {
        return Err(Error::invalid_argument(format!(
            "expected {} arguments, got {}",
            expected,
            args.len()
        )));
    }

    slots
        .iter()
        .map(|slot| {
            let value = match &slot.source {
                SlotSource::Argument(i) => args[*i].clone(),
                SlotSource::Attribute(name) => instance
                    .and_then(|i| i.attribute(name))
                    .cloned()
                    .ok_or_else(|| Error::invalid_argument(format!("instance has no attribute `{}`", name)))?,
            };
            if check_shapes && value.shape() != slot.shape {
                return Err(Error::ArgumentShapeMismatch {
                    name: slot.name.clone(),
                    expected: slot.shape.to_string(),
                    found: value.shape().to_string(),
                });
            }
            Ok(value)
        })
        .collect()
}

/// Serializes values for `ARGV`: strings raw, numbers as decimal text,
/// everything else as JSON.
pub fn encode_args(values: &[Value]) -> Result<Vec<Bytes>> {
    values
        .iter()
        .map(|value| {
            Ok(match value {
                Value::Str(s) => Bytes::from(s.clone()),
                Value::Int(i) => Bytes::from(i.to_string()),
                Value::Float(x) => Bytes::from(x.to_string()),
                other => Bytes::from(serde_json::to_vec(other)?),
            })
        })
        .collect()
}
