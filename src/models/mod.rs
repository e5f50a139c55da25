//! Signal models and the name → constructor registry.
//!
//! A model is resolved once per run from a [`ModelKind`], the raw sequence
//! JSON and the run constants; the engine only ever sees `dyn Model`.

pub mod model;
pub mod mt;
pub mod ssfp;

pub use model::*;
pub use mt::*;
pub use ssfp::*;

use serde_json::Value;

use crate::domain::ModelKind;
use crate::error::AppError;
use crate::sequence::{SsfpFiniteSequence, SsfpMtSequence, SsfpSequence};

/// Construct the model for `kind`, validating the sequence and constants.
pub fn build_model(
    kind: ModelKind,
    sequence: &Value,
    constants: &ModelConstants,
    settings: FitSettings,
) -> Result<Box<dyn Model>, AppError> {
    let model: Box<dyn Model> = match kind {
        ModelKind::Ssfp => Box::new(SsfpModel::new(
            SsfpSequence::from_json(sequence)?,
            constants,
            settings,
        )?),
        ModelKind::SsfpFinite => Box::new(SsfpFiniteModel::new(
            SsfpFiniteSequence::from_json(sequence)?,
            constants,
            settings,
        )?),
        ModelKind::SsfpMt => Box::new(SsfpMtModel::new(
            SsfpMtSequence::from_json(sequence)?,
            constants,
            settings,
        )?),
    };
    Ok(model)
}

/// Run constants accepted by each model, with defaults.
pub fn constant_table(kind: ModelKind) -> &'static [(&'static str, f64)] {
    match kind {
        ModelKind::Ssfp => &ssfp::SSFP_CONSTANTS,
        ModelKind::SsfpFinite => &ssfp::SSFP_FINITE_CONSTANTS,
        ModelKind::SsfpMt => &mt::MT_CONSTANTS,
    }
}

/// Varying and fixed parameter layout of each model.
pub fn parameter_layout(kind: ModelKind) -> (&'static [ParameterSpec], &'static [FixedSpec]) {
    match kind {
        ModelKind::Ssfp | ModelKind::SsfpFinite => (&ssfp::SSFP_VARYING, &ssfp::SSFP_FIXED),
        ModelKind::SsfpMt => (&mt::MT_VARYING, &mt::MT_FIXED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn registry_builds_every_kind() {
        let ssfp = serde_json::json!({ "TR": 0.005, "FA": [5, 10], "PhaseInc": [0, 180] });
        let finite = serde_json::json!({ "TR": 0.005, "Trf": 0.001, "FA": [5, 10], "PhaseInc": [0, 180] });
        let mt = serde_json::json!({
            "TR": [0.004, 0.006], "Trf": [0.0003, 0.002], "FA": [20, 20],
            "pulse": { "p1": 0.4, "p2": 0.3 },
        });
        for (kind, json) in [(ModelKind::Ssfp, ssfp), (ModelKind::SsfpFinite, finite), (ModelKind::SsfpMt, mt)] {
            let model = build_model(kind, &json, &ModelConstants::new(), FitSettings::default()).unwrap();
            assert_eq!(model.input_size(), 2);
            assert_eq!(model.name(), kind.model_name());
            let (varying, fixed) = parameter_layout(kind);
            assert_eq!(model.schema().varying(), varying);
            assert_eq!(model.schema().fixed(), fixed);
        }
    }

    #[test]
    fn registry_surfaces_sequence_errors() {
        let json = serde_json::json!({ "TR": 0.005, "FA": [5, 10, 15, 20, 25], "PhaseInc": [0, 90, 180, 270] });
        let err = build_model(ModelKind::Ssfp, &json, &ModelConstants::new(), FitSettings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn constant_tables_list_overridable_names() {
        let names: Vec<&str> = constant_table(ModelKind::SsfpMt).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["T2_f", "k_f", "R1_b", "T2_r"]);
        assert_eq!(constant_table(ModelKind::SsfpFinite)[1], ("zeta", 0.68));
    }
}
