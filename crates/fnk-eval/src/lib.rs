pub mod builtins;
pub mod cast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod namespace;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod split;
pub mod value;

pub use config::{PipelineConfig, RawStage, ResolvedRun, resolve};
pub use error::EvalError;
pub use evaluator::{CompiledExpr, Evaluator};
pub use namespace::Namespace;
pub use pipeline::{Pipeline, PipelineOutcome, SortKey, Stage};
pub use record::{Record, Status};
pub use render::{RenderConfig, Renderer};
pub use split::{RecordTyper, SplitMode, Splitter};
pub use value::Value;
