pub use fnk_eval::{
    CompiledExpr, EvalError, Namespace, Pipeline, PipelineConfig, PipelineOutcome, RawStage,
    Record, RenderConfig, Renderer, ResolvedRun, SortKey, Splitter, Stage, Status, Value, resolve,
};
pub use fnk_syntax::{ast, error::Span, parse_closure, parse_expression};

pub mod prelude {
    pub use crate::{PipelineConfig, RawStage, Record, Status, Value, resolve};
}
