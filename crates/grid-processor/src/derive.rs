//! Derivation of display variables from a decoded run.
//!
//! Stateless transforms run per step in parallel. Accumulation differences
//! depend on the previous step, so that transform walks the steps in order.

use msm_common::{
    DerivedSeries, DerivedValues, DerivedVariable, FieldKind, ForecastRun, ForecastStep,
    TransformKind, VariableSpec,
};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::transform;

/// Derive one variable over every step of the run.
///
/// The result has exactly one entry per run step. A step whose sources are
/// missing is marked invalid; that never affects other steps beyond the
/// accumulation reference described in [`transform::accumulation_rate`].
pub fn derive(run: &ForecastRun, spec: &VariableSpec) -> DerivedSeries {
    let steps = if let Err(e) = spec.validate() {
        run.steps
            .iter()
            .map(|step| invalid(step, spec, e.to_string()))
            .collect()
    } else if spec.transform.is_stateful() {
        derive_accumulation(run, spec)
    } else {
        run.steps
            .par_iter()
            .map(|step| derive_step(step, spec))
            .collect()
    };

    let invalid_steps = steps.iter().filter(|s| !s.is_valid()).count();
    if invalid_steps > 0 {
        warn!(
            run_id = %run.run_id,
            variable = %spec.name,
            invalid_steps,
            "Variable unavailable at some steps"
        );
    }

    DerivedSeries {
        spec: spec.clone(),
        geometry: run.geometry,
        steps,
    }
}

/// Derive every variable; variables are independent and run in parallel.
pub fn derive_all(run: &ForecastRun, specs: &[VariableSpec]) -> Vec<DerivedSeries> {
    specs.par_iter().map(|spec| derive(run, spec)).collect()
}

fn derive_step(step: &ForecastStep, spec: &VariableSpec) -> DerivedVariable {
    let computed = match &spec.transform {
        TransformKind::TotalOrLayerMaximum => total_or_layer_maximum(step, spec),
        kind => source_values(step, &spec.sources)
            .map(|sources| apply(kind, &sources))
            .map_err(str::to_string),
    };

    match computed {
        Ok(mut values) => {
            apply_valid_range(&mut values, step, spec);
            valid(step, spec, values)
        }
        Err(missing) => invalid(step, spec, format!("missing source field {}", missing)),
    }
}

/// Values of the named fields in order, or the name of the first missing one.
fn source_values<'a>(step: &'a ForecastStep, names: &'a [String]) -> Result<Vec<&'a [f32]>, &'a str> {
    names
        .iter()
        .map(|name| step.field(name).map(|f| f.values.as_slice()).ok_or(name.as_str()))
        .collect()
}

fn apply(kind: &TransformKind, sources: &[&[f32]]) -> Vec<f32> {
    match kind {
        TransformKind::Identity => sources[0].to_vec(),
        TransformKind::UnitConvert { factor, offset } => {
            transform::unit_convert(sources[0], *factor, *offset)
        }
        TransformKind::VectorMagnitude => transform::vector_magnitude(sources[0], sources[1]),
        TransformKind::LayerMaximum => transform::layer_maximum(sources),
        TransformKind::AccumulationDiff => unreachable!("accumulation is derived sequentially"),
        TransformKind::TotalOrLayerMaximum => unreachable!("fallback is resolved per step"),
    }
}

fn total_or_layer_maximum(step: &ForecastStep, spec: &VariableSpec) -> Result<Vec<f32>, String> {
    let (total, layers) = match spec.sources.split_first() {
        Some(split) => split,
        None => return Err("(none configured)".to_string()),
    };
    if let Some(field) = step.field(total) {
        return Ok(field.values.clone());
    }

    debug!(
        variable = %spec.name,
        step = step.index,
        total = %total,
        "Total missing, using layer maximum"
    );
    source_values(step, layers)
        .map(|sources| transform::layer_maximum(&sources))
        .map_err(|layer| format!("{} and {}", total, layer))
}

fn derive_accumulation(run: &ForecastRun, spec: &VariableSpec) -> Vec<DerivedVariable> {
    let source = &spec.sources[0];
    // most recent step at which the cumulative total was present
    let mut previous: Option<&[f32]> = None;
    let mut out = Vec::with_capacity(run.steps.len());

    for step in &run.steps {
        match step.field(source) {
            Some(field) => {
                if !accumulates_from_issue(&field.kind) {
                    warn!(
                        variable = %spec.name,
                        step = step.index,
                        kind = ?field.kind,
                        "Accumulation does not start at lead 0; rates may be wrong"
                    );
                }
                let mut values = transform::accumulation_rate(previous, &field.values);
                previous = Some(field.values.as_slice());
                apply_valid_range(&mut values, step, spec);
                out.push(valid(step, spec, values));
            }
            None => out.push(invalid(step, spec, format!("missing source field {}", source))),
        }
    }
    out
}

/// Differencing successive steps only yields per-step amounts when every
/// total is counted from the issue time. Fields without an interval are
/// taken as such.
pub(crate) fn accumulates_from_issue(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Accumulated { start_hour, .. } => *start_hour == 0,
        FieldKind::Instant => true,
    }
}

fn apply_valid_range(values: &mut [f32], step: &ForecastStep, spec: &VariableSpec) {
    if let Some(range) = spec.valid_range {
        let masked = transform::mask_outside(values, range);
        if masked > 0 {
            debug!(
                variable = %spec.name,
                step = step.index,
                masked,
                "Masked implausible values"
            );
        }
    }
}

fn valid(step: &ForecastStep, spec: &VariableSpec, values: Vec<f32>) -> DerivedVariable {
    DerivedVariable {
        name: spec.name.clone(),
        step_index: step.index,
        valid_time: step.valid_time,
        values: DerivedValues::Valid(values),
    }
}

fn invalid(step: &ForecastStep, spec: &VariableSpec, reason: String) -> DerivedVariable {
    DerivedVariable {
        name: spec.name.clone(),
        step_index: step.index,
        valid_time: step.valid_time,
        values: DerivedValues::Invalid { reason },
    }
}
