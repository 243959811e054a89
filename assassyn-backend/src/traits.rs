//! The `Backend` trait every code generator implements.

use crate::config::Config;
use assassyn_ir::System;
use assassyn_opt::{ExternalRegistry, InteractionMatrix};
use assassyn_utils::AsnResult;

pub struct LoweringContext<'a> {
    pub system: &'a System,
    pub matrix: &'a InteractionMatrix,
    pub externs: &'a ExternalRegistry,
    pub config: &'a Config,
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Checks preconditions the backend needs on a frozen system before
    /// it attempts to emit anything (e.g. "every array has at least one
    /// write port assigned").
    fn validate(&self, ctx: &LoweringContext) -> AsnResult<()>;

    /// Emits the backend's output under `ctx.config.output_dir`, returning
    /// the paths of the files it wrote.
    fn emit(&self, ctx: &LoweringContext) -> AsnResult<Vec<std::path::PathBuf>>;
}
