pub mod batch;
pub mod classification;
pub mod encoding;
pub mod extraction;
pub mod import;
pub mod model;
pub mod organization;
pub mod processor;

pub use batch::CancelFlag;
pub use processor::{
    BatchReport, FailedDocument, FailureKind, FiledDocument, Pipeline, PipelineOutcome, Stage,
};
