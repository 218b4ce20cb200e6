//! sporefit: surrogate infection-model calibration and cross-validation
//!
//! Fits closed-form surrogate models of hABM (hybrid agent-based model)
//! infection scores for virtual *A. fumigatus* infection scenarios in human
//! and murine alveoli, and cross-validates the calibrated surrogate against
//! learned regressors on identical data folds.
//!
//! ## Modules
//!   - `data`: processed infection-score tables, covariate filtering,
//!     host-system presets, fitted-parameter table I/O
//!   - `models`: CEF, WSM, blend-function and SIM closed forms + losses
//!   - `codec`: natural/optimizer parameter-space transforms
//!   - `optimize`: Nelder-Mead local minimizer
//!   - `calibrate`: noisy-restart calibration loop and training drivers
//!   - `regress`: feed-forward network and random forest behind the
//!     shared `GenericRegressor` surface
//!   - `crossval`: stratified k-fold protocol and report writers
//!   - `symmetry`: ln(sAEC/Dc) symmetry-error analysis
//!
//! ## Binaries
//!   - `train_cef` / `train_wsm` / `train_sim`: fit and persist each model
//!   - `run_cross_validation`: the 5-repeat 6-fold three-model comparison
//!   - `symmetry_error`: mean symmetric error over identical-ratio cells
//!   - `validate_models`: pass/fail checks against documented tolerances

pub mod calibrate;
pub mod codec;
pub mod crossval;
pub mod data;
pub mod error;
pub mod models;
pub mod optimize;
pub mod provenance;
pub mod regress;
pub mod symmetry;
pub mod tolerances;
pub mod validation;
