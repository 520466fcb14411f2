pub mod config;
pub mod errors;
pub mod model;
pub mod notify;
pub mod uploader;

pub use errors::{AppError, AppResult};
pub use model::{ApiDefinition, HttpMethod};
pub use uploader::upload_batch::{
    process_upload_batch, BatchReport, UploadTarget, UploadedInterface,
};
